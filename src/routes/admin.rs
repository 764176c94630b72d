use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, put},
};

/// Admin Router Module
///
/// User management and oversight of every log. The whole router sits behind
/// `auth::require_admin`.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET/POST /admin/users
        // List every account; create one with an explicit role.
        .route(
            "/admin/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        // PUT/DELETE /admin/users/{id}
        // Partial update (optionally resetting the password); delete cascades to the user's logs.
        .route(
            "/admin/users/{id}",
            put(handlers::update_user).delete(handlers::delete_user),
        )
        // GET /admin/logs
        .route("/admin/logs", get(handlers::list_all_logs))
        // PUT/DELETE /logs/{id}
        // `{id}` is a log id here.
        .route(
            "/logs/{id}",
            put(handlers::update_log).delete(handlers::delete_log),
        )
}
