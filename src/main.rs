use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use worklog_tracker::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    repository::{self, PostgresRepository, RepositoryState},
    storage::{PostgresSessionStore, SessionState},
};

/// main
///
/// Entry point: configuration, logging, persistence, first-boot bootstrap, then the HTTP server.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Configuration (fail-fast on missing production secrets)
    dotenv::dotenv().ok();
    let config = AppConfig::load()?;

    // 2. Logging, format chosen by environment
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "worklog_tracker=debug,tower_http=info,axum=trace".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Persistence: PostgreSQL when configured, in-memory otherwise (local only)
    let app_state = match config.db_url.as_deref() {
        Some(db_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.db_max_connections)
                .connect(db_url)
                .await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            tracing::info!("database migrations applied");

            AppState {
                repo: Arc::new(PostgresRepository::new(pool.clone())) as RepositoryState,
                sessions: Arc::new(PostgresSessionStore::new(pool)) as SessionState,
                config: config.clone(),
            }
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store, data is lost on exit");
            AppState::in_memory(config.clone())
        }
    };

    // 4. Housekeeping and bootstrap
    let pruned = app_state.sessions.prune_expired().await?;
    if pruned > 0 {
        tracing::info!(pruned, "expired sessions removed");
    }
    repository::init_default_admin(
        app_state.repo.as_ref(),
        &config.admin_username,
        &config.admin_password,
    )
    .await?;

    // 5. Router and server
    let app = create_router(app_state);
    let listener = TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("Listening on {}", config.bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    axum::serve(listener, app).await?;
    Ok(())
}
