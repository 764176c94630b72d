use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Everything an employee does for themselves. Ownership (self-or-admin) is checked in the
/// handlers against the `AuthUser` resolved by the route-layer gate.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /user
        // The account behind the current session.
        .route("/user", get(handlers::get_current_user))
        // POST /logs
        // Records a work-log entry for the caller (or, for admins, for anyone).
        .route("/logs", post(handlers::create_log))
        // GET /logs/{id}
        // Logs owned by user `{id}`. The path parameter name must match the admin router's
        // `/logs/{id}` since both routers contribute methods to the same path.
        .route("/logs/{id}", get(handlers::get_user_logs))
}
