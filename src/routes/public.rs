use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for monitoring and load balancers.
        .route("/health", get(|| async { "ok" }))
        // POST /register
        // Self-service account creation; logs the new user in.
        .route("/register", post(handlers::register_user))
        // POST /login
        // Exchanges username/password for a session cookie.
        .route("/login", post(handlers::login))
        // POST /logout
        .route("/logout", post(handlers::logout))
}
