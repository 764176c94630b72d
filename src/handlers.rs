use crate::{
    AppState,
    auth::{self, AdminUser, AuthUser},
    error::AppError,
    models::{
        InsertLogRequest, Log, LoginRequest, NewUser, RegisterUserRequest, UpdateUserRequest, User,
    },
    password::PasswordHash,
    validation::{PathParam, ValidatedJson},
};
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, HeaderName, StatusCode, header},
};

/// A JSON response that also sets (or clears) the session cookie.
pub type WithCookie<T> = (StatusCode, [(HeaderName, String); 1], Json<T>);

// --- Helpers ---

/// Pulls a field out of a payload that already passed `validate()`.
fn required<T>(value: Option<T>, field: &str) -> Result<T, AppError> {
    value.ok_or_else(|| AppError::field(field, "is required"))
}

fn new_user(payload: RegisterUserRequest, is_admin: bool) -> Result<NewUser, AppError> {
    let password = required(payload.password, "password")?;
    Ok(NewUser {
        username: required(payload.username, "username")?,
        password: PasswordHash::new(&password)?,
        full_name: required(payload.full_name, "fullName")?,
        is_admin,
    })
}

/// Creates a session for `user` and packages the response with its cookie.
async fn respond_with_session(
    state: &AppState,
    status: StatusCode,
    user: User,
) -> Result<WithCookie<User>, AppError> {
    let session =
        auth::start_session(state.sessions.as_ref(), user.id, state.config.session_ttl).await?;
    let cookie = auth::session_cookie(&session, state.config.secure_cookies());
    Ok((status, [(header::SET_COOKIE, cookie.to_string())], Json(user)))
}

// --- Public Handlers ---

/// register_user
///
/// [Public Route] Self-service registration. The new account is never an admin, whatever the
/// payload says. On success the caller is logged in immediately.
#[utoipa::path(
    post,
    path = "/api/register",
    request_body = RegisterUserRequest,
    responses(
        (status = 201, description = "Registered and logged in", body = User),
        (status = 400, description = "Validation failed or username taken")
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RegisterUserRequest>,
) -> Result<WithCookie<User>, AppError> {
    let user = state.repo.create_user(new_user(payload, false)?).await?;
    tracing::info!(user_id = user.id, username = %user.username, "user registered");
    respond_with_session(&state, StatusCode::CREATED, user).await
}

/// login
///
/// [Public Route] Verifies the credentials and establishes a server-side session. Any session
/// cookie the client already carried is destroyed first.
#[utoipa::path(
    post,
    path = "/api/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = User),
        (status = 401, description = "Invalid username or password")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> Result<WithCookie<User>, AppError> {
    let username = required(payload.username, "username")?;
    let password = required(payload.password, "password")?;

    let user = match auth::authenticate(state.repo.as_ref(), &username, &password).await {
        Ok(user) => user,
        Err(e) => {
            tracing::info!(username = %username, "login rejected");
            return Err(e);
        }
    };

    if let Some(previous) = auth::session_id_from_headers(&headers) {
        state.sessions.destroy(&previous).await?;
    }

    tracing::info!(user_id = user.id, "login succeeded");
    respond_with_session(&state, StatusCode::OK, user).await
}

/// logout
///
/// [Public Route] Destroys the server-side session (if any) and clears the cookie.
/// Calling it without a session is not an error.
#[utoipa::path(
    post,
    path = "/api/logout",
    responses((status = 200, description = "Logged out"))
)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(StatusCode, [(HeaderName, String); 1]), AppError> {
    if let Some(sid) = auth::session_id_from_headers(&headers) {
        state.sessions.destroy(&sid).await?;
        tracing::info!("session destroyed");
    }
    let cookie = auth::removal_cookie(state.config.secure_cookies());
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie.to_string())]))
}

// --- Authenticated Handlers ---

/// get_current_user
///
/// [Authenticated Route] Returns the account behind the current session.
#[utoipa::path(
    get,
    path = "/api/user",
    responses(
        (status = 200, description = "Current user", body = User),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn get_current_user(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<User>, AppError> {
    let user = state
        .repo
        .get_user(user.id)
        .await?
        .ok_or(AppError::Unauthenticated)?;
    Ok(Json(user))
}

/// create_log
///
/// [Authenticated Route] Records a work-log entry. Employees may only log work for themselves;
/// admins may log for anyone. `userId` must reference an existing user.
#[utoipa::path(
    post,
    path = "/api/logs",
    request_body = InsertLogRequest,
    responses(
        (status = 201, description = "Created", body = Log),
        (status = 400, description = "Validation failed"),
        (status = 401, description = "Not logged in"),
        (status = 403, description = "Logging for another user")
    )
)]
pub async fn create_log(
    user: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<InsertLogRequest>,
) -> Result<(StatusCode, Json<Log>), AppError> {
    let new_log = payload
        .to_new_log()
        .ok_or_else(|| AppError::field("body", "incomplete log entry"))?;
    user.ensure_can_access(new_log.user_id)?;

    let log = state.repo.create_log(new_log).await?;
    tracing::debug!(log_id = log.id, user_id = log.user_id, "log created");
    Ok((StatusCode::CREATED, Json(log)))
}

/// get_user_logs
///
/// [Authenticated Route] Lists the logs owned by `{id}`. Only that user or an admin may look.
#[utoipa::path(
    get,
    path = "/api/logs/{id}",
    params(("id" = i32, Path, description = "Owner user ID")),
    responses(
        (status = 200, description = "Logs of the user", body = [Log]),
        (status = 401, description = "Not logged in"),
        (status = 403, description = "Not the owner")
    )
)]
pub async fn get_user_logs(
    user: AuthUser,
    State(state): State<AppState>,
    PathParam(user_id): PathParam<i32>,
) -> Result<Json<Vec<Log>>, AppError> {
    user.ensure_can_access(user_id)?;
    Ok(Json(state.repo.get_logs_by_user_id(user_id).await?))
}

// --- Admin Handlers ---

/// list_users
///
/// [Admin Route] Every account, in id order.
#[utoipa::path(
    get,
    path = "/api/admin/users",
    responses(
        (status = 200, description = "All users", body = [User]),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn list_users(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(state.repo.get_all_users().await?))
}

/// create_user
///
/// [Admin Route] Admin-issued account. Unlike self-registration, `isAdmin` is honoured and
/// no session is created for the new user.
#[utoipa::path(
    post,
    path = "/api/admin/users",
    request_body = RegisterUserRequest,
    responses(
        (status = 201, description = "Created", body = User),
        (status = 400, description = "Validation failed or username taken"),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn create_user(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RegisterUserRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let is_admin = payload.is_admin.unwrap_or(false);
    let user = state.repo.create_user(new_user(payload, is_admin)?).await?;
    tracing::info!(admin_id = admin.id, user_id = user.id, is_admin, "user created by admin");
    Ok((StatusCode::CREATED, Json(user)))
}

/// update_user
///
/// [Admin Route] Partial profile/role update. A `password` in the payload is hashed up front and
/// written in the same store call as the profile changes; without one the stored hash is untouched.
#[utoipa::path(
    put,
    path = "/api/admin/users/{id}",
    params(("id" = i32, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated", body = User),
        (status = 400, description = "Validation failed or username taken"),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "No such user")
    )
)]
pub async fn update_user(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    PathParam(id): PathParam<i32>,
    ValidatedJson(payload): ValidatedJson<UpdateUserRequest>,
) -> Result<Json<User>, AppError> {
    // Hash before any write so a hashing failure leaves the account untouched.
    let password = payload
        .password
        .as_deref()
        .map(PasswordHash::new)
        .transpose()?;
    let changes = payload.changes();
    let password_changed = password.is_some();

    let user = match password {
        Some(hash) if changes.is_empty() => state.repo.update_password(id, hash).await?,
        Some(hash) => state.repo.update_account(id, changes, hash).await?,
        None if changes.is_empty() => state.repo.get_user(id).await?,
        None => state.repo.update_user(id, changes).await?,
    };
    let user = user.ok_or(AppError::NotFound("user"))?;

    if password_changed {
        tracing::info!(admin_id = admin.id, user_id = id, "password changed by admin");
    }

    Ok(Json(user))
}

/// delete_user
///
/// [Admin Route] Deletes the account together with all of its logs. Deleting a missing user
/// is a no-op success.
#[utoipa::path(
    delete,
    path = "/api/admin/users/{id}",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn delete_user(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    PathParam(id): PathParam<i32>,
) -> Result<StatusCode, AppError> {
    state.repo.delete_user(id).await?;
    tracing::info!(admin_id = admin.id, user_id = id, "user and logs deleted");
    Ok(StatusCode::OK)
}

/// list_all_logs
///
/// [Admin Route] Every log in the system, in id order.
#[utoipa::path(
    get,
    path = "/api/admin/logs",
    responses(
        (status = 200, description = "All logs", body = [Log]),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn list_all_logs(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Log>>, AppError> {
    Ok(Json(state.repo.get_all_logs().await?))
}

/// update_log
///
/// [Admin Route] Overwrites owner, date, task and word count of a log. `id` and `createdAt`
/// are preserved.
#[utoipa::path(
    put,
    path = "/api/logs/{id}",
    params(("id" = i32, Path, description = "Log ID")),
    request_body = InsertLogRequest,
    responses(
        (status = 200, description = "Updated", body = Log),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "No such log")
    )
)]
pub async fn update_log(
    _admin: AdminUser,
    State(state): State<AppState>,
    PathParam(id): PathParam<i32>,
    ValidatedJson(payload): ValidatedJson<InsertLogRequest>,
) -> Result<Json<Log>, AppError> {
    let changes = payload
        .to_new_log()
        .ok_or_else(|| AppError::field("body", "incomplete log entry"))?;
    let log = state
        .repo
        .update_log(id, changes)
        .await?
        .ok_or(AppError::NotFound("log"))?;
    Ok(Json(log))
}

/// delete_log
///
/// [Admin Route] Idempotent delete.
#[utoipa::path(
    delete,
    path = "/api/logs/{id}",
    params(("id" = i32, Path, description = "Log ID")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn delete_log(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    PathParam(id): PathParam<i32>,
) -> Result<StatusCode, AppError> {
    state.repo.delete_log(id).await?;
    tracing::info!(admin_id = admin.id, log_id = id, "log deleted");
    Ok(StatusCode::OK)
}
