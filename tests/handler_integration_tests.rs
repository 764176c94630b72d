use async_trait::async_trait;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use std::sync::Arc;
use tokio::test;
use worklog_tracker::{
    AppConfig, AppError, AppState, MemoryRepository, MemorySessionStore, StoreError,
    auth::{AdminUser, AuthUser},
    handlers,
    models::{
        InsertLogRequest, Log, LoginRequest, NewLog, NewUser, RegisterUserRequest,
        UpdateUserRequest, User, UserChanges,
    },
    password::{PasswordHash, verify_password},
    repository::{Repository, StoreResult},
    validation::{PathParam, ValidatedJson},
};

// --- Helpers ---

fn state() -> AppState {
    AppState::in_memory(AppConfig::default())
}

fn caller(id: i32, is_admin: bool) -> AuthUser {
    AuthUser {
        id,
        is_admin,
        session_id: format!("session-{id}"),
    }
}

fn register_request(username: &str) -> RegisterUserRequest {
    RegisterUserRequest {
        username: Some(username.into()),
        password: Some("secret1".into()),
        full_name: Some(format!("{username} Example")),
        is_admin: None,
    }
}

fn log_request(user_id: i32, task: &str) -> InsertLogRequest {
    InsertLogRequest {
        user_id: Some(user_id),
        date: Some("2024-01-01".into()),
        task: Some(task.into()),
        word_count: Some(120),
    }
}

async fn seed_user(state: &AppState, username: &str, is_admin: bool) -> User {
    state
        .repo
        .create_user(NewUser {
            username: username.into(),
            password: PasswordHash::new("secret1").unwrap(),
            full_name: format!("{username} Example"),
            is_admin,
        })
        .await
        .unwrap()
}

// --- MOCK REPOSITORY IMPLEMENTATION ---

/// Every call fails as if the database were unreachable.
struct UnavailableRepo;

fn unavailable<T>() -> StoreResult<T> {
    Err(StoreError::Database(sqlx::Error::PoolTimedOut))
}

#[async_trait]
impl Repository for UnavailableRepo {
    async fn get_user(&self, _id: i32) -> StoreResult<Option<User>> {
        unavailable()
    }
    async fn get_user_by_username(&self, _username: &str) -> StoreResult<Option<User>> {
        unavailable()
    }
    async fn create_user(&self, _user: NewUser) -> StoreResult<User> {
        unavailable()
    }
    async fn get_all_users(&self) -> StoreResult<Vec<User>> {
        unavailable()
    }
    async fn delete_user(&self, _id: i32) -> StoreResult<()> {
        unavailable()
    }
    async fn update_user(&self, _id: i32, _changes: UserChanges) -> StoreResult<Option<User>> {
        unavailable()
    }
    async fn update_password(&self, _id: i32, _password: PasswordHash) -> StoreResult<Option<User>> {
        unavailable()
    }
    async fn update_account(
        &self,
        _id: i32,
        _changes: UserChanges,
        _password: PasswordHash,
    ) -> StoreResult<Option<User>> {
        unavailable()
    }
    async fn create_log(&self, _log: NewLog) -> StoreResult<Log> {
        unavailable()
    }
    async fn get_logs_by_user_id(&self, _user_id: i32) -> StoreResult<Vec<Log>> {
        unavailable()
    }
    async fn get_all_logs(&self) -> StoreResult<Vec<Log>> {
        unavailable()
    }
    async fn update_log(&self, _id: i32, _log: NewLog) -> StoreResult<Option<Log>> {
        unavailable()
    }
    async fn delete_log(&self, _id: i32) -> StoreResult<()> {
        unavailable()
    }
}

/// Serves everything from memory but fails any credential write.
struct CredentialWriteFails {
    inner: MemoryRepository,
}

#[async_trait]
impl Repository for CredentialWriteFails {
    async fn get_user(&self, id: i32) -> StoreResult<Option<User>> {
        self.inner.get_user(id).await
    }
    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        self.inner.get_user_by_username(username).await
    }
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        self.inner.create_user(user).await
    }
    async fn get_all_users(&self) -> StoreResult<Vec<User>> {
        self.inner.get_all_users().await
    }
    async fn delete_user(&self, id: i32) -> StoreResult<()> {
        self.inner.delete_user(id).await
    }
    async fn update_user(&self, id: i32, changes: UserChanges) -> StoreResult<Option<User>> {
        self.inner.update_user(id, changes).await
    }
    async fn update_password(&self, _id: i32, _password: PasswordHash) -> StoreResult<Option<User>> {
        unavailable()
    }
    async fn update_account(
        &self,
        _id: i32,
        _changes: UserChanges,
        _password: PasswordHash,
    ) -> StoreResult<Option<User>> {
        unavailable()
    }
    async fn create_log(&self, log: NewLog) -> StoreResult<Log> {
        self.inner.create_log(log).await
    }
    async fn get_logs_by_user_id(&self, user_id: i32) -> StoreResult<Vec<Log>> {
        self.inner.get_logs_by_user_id(user_id).await
    }
    async fn get_all_logs(&self) -> StoreResult<Vec<Log>> {
        self.inner.get_all_logs().await
    }
    async fn update_log(&self, id: i32, log: NewLog) -> StoreResult<Option<Log>> {
        self.inner.update_log(id, log).await
    }
    async fn delete_log(&self, id: i32) -> StoreResult<()> {
        self.inner.delete_log(id).await
    }
}

// --- Registration & Login ---

#[test]
async fn test_register_ignores_admin_flag_and_sets_cookie() {
    let state = state();
    let mut request = register_request("alice");
    request.is_admin = Some(true);

    let (status, headers, axum::Json(user)) =
        handlers::register_user(State(state.clone()), ValidatedJson(request))
            .await
            .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert!(!user.is_admin);
    assert_eq!(headers[0].0, header::SET_COOKIE);
    assert!(headers[0].1.starts_with("worklog.sid="));

    let stored = state.repo.get_user(user.id).await.unwrap().unwrap();
    assert!(verify_password("secret1", &stored.password));
}

#[test]
async fn test_register_duplicate_is_field_error() {
    let state = state();
    seed_user(&state, "alice", false).await;

    let err = handlers::register_user(State(state), ValidatedJson(register_request("alice")))
        .await
        .unwrap_err();

    match err {
        AppError::Validation(fields) => assert!(fields.contains_key("username")),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
async fn test_login_wrong_password_and_unknown_user_look_the_same() {
    let state = state();
    seed_user(&state, "alice", false).await;

    let wrong_password = handlers::login(
        State(state.clone()),
        HeaderMap::new(),
        ValidatedJson(LoginRequest {
            username: Some("alice".into()),
            password: Some("nope".into()),
        }),
    )
    .await
    .unwrap_err();
    let unknown_user = handlers::login(
        State(state),
        HeaderMap::new(),
        ValidatedJson(LoginRequest {
            username: Some("mallory".into()),
            password: Some("secret1".into()),
        }),
    )
    .await
    .unwrap_err();

    assert!(matches!(wrong_password, AppError::InvalidCredentials));
    assert!(matches!(unknown_user, AppError::InvalidCredentials));
    assert_eq!(wrong_password.to_string(), unknown_user.to_string());
}

#[test]
async fn test_login_replaces_previous_session() {
    let state = state();
    seed_user(&state, "alice", false).await;
    let credentials = || LoginRequest {
        username: Some("alice".into()),
        password: Some("secret1".into()),
    };

    let (_, first, _) = handlers::login(State(state.clone()), HeaderMap::new(), ValidatedJson(credentials()))
        .await
        .unwrap();
    let first_sid = first[0].1.split(';').next().unwrap().trim_start_matches("worklog.sid=").to_string();
    assert!(state.sessions.get(&first_sid).await.unwrap().is_some());

    let mut headers = HeaderMap::new();
    headers.insert(header::COOKIE, format!("worklog.sid={first_sid}").parse().unwrap());
    let _second = handlers::login(State(state.clone()), headers, ValidatedJson(credentials()))
        .await
        .unwrap();

    assert!(state.sessions.get(&first_sid).await.unwrap().is_none());
}

// --- Logs ---

#[test]
async fn test_employee_cannot_log_for_someone_else() {
    let state = state();
    let alice = seed_user(&state, "alice", false).await;
    let bob = seed_user(&state, "bob", false).await;

    let err = handlers::create_log(
        caller(alice.id, false),
        State(state.clone()),
        ValidatedJson(log_request(bob.id, "not mine")),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AppError::Forbidden(_)));
    assert!(state.repo.get_all_logs().await.unwrap().is_empty());
}

#[test]
async fn test_admin_logs_for_missing_user_is_field_error() {
    let state = state();
    let admin = seed_user(&state, "admin", true).await;

    let err = handlers::create_log(
        caller(admin.id, true),
        State(state),
        ValidatedJson(log_request(404, "nobody")),
    )
    .await
    .unwrap_err();

    match err {
        AppError::Validation(fields) => assert!(fields.contains_key("userId")),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
async fn test_get_user_logs_self_or_admin() {
    let state = state();
    let alice = seed_user(&state, "alice", false).await;
    let bob = seed_user(&state, "bob", false).await;
    let _created = handlers::create_log(
        caller(alice.id, false),
        State(state.clone()),
        ValidatedJson(log_request(alice.id, "chapter one")),
    )
    .await
    .unwrap();

    let axum::Json(own) = handlers::get_user_logs(caller(alice.id, false), State(state.clone()), PathParam(alice.id))
        .await
        .unwrap();
    assert_eq!(own.len(), 1);

    let err = handlers::get_user_logs(caller(bob.id, false), State(state.clone()), PathParam(alice.id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let axum::Json(as_admin) = handlers::get_user_logs(caller(999, true), State(state), PathParam(alice.id))
        .await
        .unwrap();
    assert_eq!(as_admin, own);
}

#[test]
async fn test_update_missing_log_is_not_found() {
    let state = state();
    let alice = seed_user(&state, "alice", false).await;

    let err = handlers::update_log(
        AdminUser(caller(1, true)),
        State(state),
        PathParam(77),
        ValidatedJson(log_request(alice.id, "edited")),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AppError::NotFound("log")));
}

// --- Admin user management ---

#[test]
async fn test_admin_update_user_with_password() {
    let state = state();
    let alice = seed_user(&state, "alice", false).await;

    let axum::Json(updated) = handlers::update_user(
        AdminUser(caller(1, true)),
        State(state.clone()),
        PathParam(alice.id),
        ValidatedJson(UpdateUserRequest {
            password: Some("rotated-secret".into()),
            full_name: Some("Alice Smith".into()),
            ..Default::default()
        }),
    )
    .await
    .unwrap();

    assert_eq!(updated.full_name, "Alice Smith");
    let stored = state.repo.get_user(alice.id).await.unwrap().unwrap();
    assert!(verify_password("rotated-secret", &stored.password));
}

#[test]
async fn test_admin_update_failed_password_write_leaves_profile_unchanged() {
    let state = AppState {
        repo: Arc::new(CredentialWriteFails {
            inner: MemoryRepository::new(),
        }),
        sessions: Arc::new(MemorySessionStore::new()),
        config: AppConfig::default(),
    };
    let alice = seed_user(&state, "alice", false).await;

    let err = handlers::update_user(
        AdminUser(caller(1, true)),
        State(state.clone()),
        PathParam(alice.id),
        ValidatedJson(UpdateUserRequest {
            username: Some("alice2".into()),
            full_name: Some("Alice Smith".into()),
            is_admin: Some(true),
            password: Some("rotated-secret".into()),
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Store(_)));

    let stored = state.repo.get_user(alice.id).await.unwrap().unwrap();
    assert_eq!(stored.username, "alice");
    assert_eq!(stored.full_name, "alice Example");
    assert!(!stored.is_admin);
    assert!(verify_password("secret1", &stored.password));
}

#[test]
async fn test_admin_update_missing_user_is_not_found() {
    let err = handlers::update_user(
        AdminUser(caller(1, true)),
        State(state()),
        PathParam(5),
        ValidatedJson(UpdateUserRequest::default()),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AppError::NotFound("user")));
}

#[test]
async fn test_admin_create_user_honours_role() {
    let state = state();
    let mut request = register_request("carol");
    request.is_admin = Some(true);

    let (status, axum::Json(user)) =
        handlers::create_user(AdminUser(caller(1, true)), State(state), ValidatedJson(request))
            .await
            .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert!(user.is_admin);
}

// --- Store failures ---

#[test]
async fn test_store_failure_is_opaque_500() {
    let state = AppState {
        repo: Arc::new(UnavailableRepo),
        sessions: Arc::new(MemorySessionStore::new()),
        config: AppConfig::default(),
    };

    let err = handlers::list_users(AdminUser(caller(1, true)), State(state))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Store(_)));

    let response = err.into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
