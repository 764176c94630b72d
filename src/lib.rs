use axum::{Router, extract::FromRef, http::HeaderName, middleware};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod password;
pub mod repository;
pub mod storage;
pub mod validation;

// Module for routing segregation (Public, Authenticated, Admin).
pub mod routes;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{AppError, StoreError};
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};
pub use storage::{MemorySessionStore, PostgresSessionStore, SessionState};

/// ApiDoc
///
/// Auto-generated OpenAPI document for every `/api` route, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::register_user, handlers::login, handlers::logout, handlers::get_current_user,
        handlers::create_log, handlers::get_user_logs, handlers::list_users, handlers::create_user,
        handlers::update_user, handlers::delete_user, handlers::list_all_logs, handlers::update_log,
        handlers::delete_log
    ),
    components(
        schemas(
            models::User, models::Log, models::RegisterUserRequest, models::LoginRequest,
            models::UpdateUserRequest, models::InsertLogRequest,
        )
    ),
    tags(
        (name = "worklog", description = "Employee work-log tracking API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Single shared container for the services every request needs. Cloning is cheap: the stores
/// sit behind `Arc`s.
#[derive(Clone)]
pub struct AppState {
    /// Users and logs.
    pub repo: RepositoryState,
    /// Login sessions, keyed by the cookie value.
    pub sessions: SessionState,
    pub config: AppConfig,
}

impl AppState {
    /// State backed by the in-memory stores.
    pub fn in_memory(config: AppConfig) -> Self {
        Self {
            repo: Arc::new(MemoryRepository::new()),
            sessions: Arc::new(MemorySessionStore::new()),
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for SessionState {
    fn from_ref(app_state: &AppState) -> SessionState {
        app_state.sessions.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles the routing tree under `/api`, applies the access gates per router and the
/// observability layers globally, and registers the application state.
pub fn create_router(state: AppState) -> Router {
    let x_request_id = HeaderName::from_static("x-request-id");

    // Admin gate answers 403 to anonymous callers as well, so it must not sit behind the
    // authenticated gate (which answers 401).
    let api = Router::new()
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth::require_authenticated,
            )),
        )
        .merge(
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth::require_admin,
            )),
        );

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api", api)
        .with_state(state);

    base_router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(trace_span_logger)
                    .on_response(
                        DefaultOnResponse::new()
                            .level(Level::INFO)
                            .latency_unit(tower_http::LatencyUnit::Millis),
                    ),
            )
            .layer(PropagateRequestIdLayer::new(x_request_id)),
    )
}

/// trace_span_logger
///
/// Span factory for `TraceLayer`: every log line of a request carries its `x-request-id`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
