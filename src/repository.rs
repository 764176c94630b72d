use crate::error::StoreError;
use crate::models::{Log, NewLog, NewUser, User, UserChanges};
use crate::password::PasswordHash;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub type StoreResult<T> = Result<T, StoreError>;

/// Repository Trait
///
/// The data-access contract for users and logs. Handlers only ever talk to storage through
/// this trait, which lets the router run against PostgreSQL in production and against
/// `MemoryRepository` in tests and database-less local runs.
///
/// Lookups return `Ok(None)` on a miss; `Err` always means the store itself failed or a
/// constraint was violated.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: i32) -> StoreResult<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    // Primary-key order.
    async fn get_all_users(&self) -> StoreResult<Vec<User>>;
    /// Removes the user and every log they own as one unit. Idempotent.
    async fn delete_user(&self, id: i32) -> StoreResult<()>;
    /// Profile/role update. Never touches the credential.
    async fn update_user(&self, id: i32, changes: UserChanges) -> StoreResult<Option<User>>;
    /// The only path that rewrites a stored credential.
    async fn update_password(&self, id: i32, password: PasswordHash) -> StoreResult<Option<User>>;
    /// Profile/role changes and a new credential, applied together or not at all.
    async fn update_account(
        &self,
        id: i32,
        changes: UserChanges,
        password: PasswordHash,
    ) -> StoreResult<Option<User>>;

    // --- Logs ---
    async fn create_log(&self, log: NewLog) -> StoreResult<Log>;
    async fn get_logs_by_user_id(&self, user_id: i32) -> StoreResult<Vec<Log>>;
    async fn get_all_logs(&self) -> StoreResult<Vec<Log>>;
    /// Overwrites the writable columns; `id` and `created_at` are preserved.
    async fn update_log(&self, id: i32, log: NewLog) -> StoreResult<Option<Log>>;
    /// Idempotent: deleting a missing log is not an error.
    async fn delete_log(&self, id: i32) -> StoreResult<()>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer access across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// init_default_admin
///
/// First-boot bootstrap: creates the administrator account if no user with `username` exists.
/// Safe to run on every start. An existing account (admin or not) is left exactly as it is,
/// and losing a unique-username race against a concurrent boot counts as "already present".
///
/// Returns `true` when the account was created by this call.
pub async fn init_default_admin(
    repo: &dyn Repository,
    username: &str,
    password: &str,
) -> StoreResult<bool> {
    if repo.get_user_by_username(username).await?.is_some() {
        tracing::debug!(username, "default admin already present");
        return Ok(false);
    }

    let admin = NewUser {
        username: username.to_string(),
        password: PasswordHash::new(password)?,
        full_name: "Administrator".to_string(),
        is_admin: true,
    };

    match repo.create_user(admin).await {
        Ok(user) => {
            tracing::info!(user_id = user.id, username, "default admin created");
            Ok(true)
        }
        Err(StoreError::Duplicate(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

const USER_COLUMNS: &str = "id, username, password, full_name, is_admin";
const LOG_COLUMNS: &str = "id, user_id, date, task, word_count, created_at";

/// PostgresRepository
///
/// The production implementation of the `Repository` trait, backed by PostgreSQL.
/// Queries are checked at runtime (`query_as::<_, T>`) so the crate builds without a live database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Maps a unique-username violation to `StoreError::Duplicate`; everything else stays a database error.
fn user_write_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StoreError::Duplicate("username");
        }
    }
    StoreError::Database(err)
}

/// Maps a `logs.user_id` foreign-key violation to `StoreError::MissingUser`.
fn log_write_error(err: sqlx::Error, user_id: i32) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_foreign_key_violation() {
            return StoreError::MissingUser(user_id);
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: i32) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, password, full_name, is_admin) \
             VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.username)
        .bind(user.password.as_str())
        .bind(&user.full_name)
        .bind(user.is_admin)
        .fetch_one(&self.pool)
        .await
        .map_err(user_write_error)
    }

    async fn get_all_users(&self) -> StoreResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    /// delete_user
    ///
    /// Both deletes run in one transaction: either the user and all their logs disappear,
    /// or nothing changes. Sessions go with the user through `ON DELETE CASCADE`.
    async fn delete_user(&self, id: i32) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM logs WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// update_user
    ///
    /// Uses `COALESCE` so that only the columns present in `changes` are rewritten.
    async fn update_user(&self, id: i32, changes: UserChanges) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users \
             SET username = COALESCE($2, username), \
                 full_name = COALESCE($3, full_name), \
                 is_admin = COALESCE($4, is_admin) \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(changes.username)
        .bind(changes.full_name)
        .bind(changes.is_admin)
        .fetch_optional(&self.pool)
        .await
        .map_err(user_write_error)
    }

    async fn update_password(&self, id: i32, password: PasswordHash) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET password = $2 WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(password.into_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// update_account
    ///
    /// Runs the profile update and the credential update in one transaction. A missing user or
    /// a username clash rolls back before the password is touched.
    async fn update_account(
        &self,
        id: i32,
        changes: UserChanges,
        password: PasswordHash,
    ) -> StoreResult<Option<User>> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query_as::<_, User>(&format!(
            "UPDATE users \
             SET username = COALESCE($2, username), \
                 full_name = COALESCE($3, full_name), \
                 is_admin = COALESCE($4, is_admin) \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(changes.username)
        .bind(changes.full_name)
        .bind(changes.is_admin)
        .fetch_optional(&mut *tx)
        .await
        .map_err(user_write_error)?;
        if updated.is_none() {
            return Ok(None);
        }

        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET password = $2 WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(password.into_string())
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(user)
    }

    async fn create_log(&self, log: NewLog) -> StoreResult<Log> {
        sqlx::query_as::<_, Log>(&format!(
            "INSERT INTO logs (user_id, date, task, word_count) \
             VALUES ($1, $2, $3, $4) RETURNING {LOG_COLUMNS}"
        ))
        .bind(log.user_id)
        .bind(log.date)
        .bind(&log.task)
        .bind(log.word_count)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| log_write_error(e, log.user_id))
    }

    async fn get_logs_by_user_id(&self, user_id: i32) -> StoreResult<Vec<Log>> {
        let logs = sqlx::query_as::<_, Log>(&format!(
            "SELECT {LOG_COLUMNS} FROM logs WHERE user_id = $1 ORDER BY id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(logs)
    }

    async fn get_all_logs(&self) -> StoreResult<Vec<Log>> {
        let logs = sqlx::query_as::<_, Log>(&format!("SELECT {LOG_COLUMNS} FROM logs ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        Ok(logs)
    }

    async fn update_log(&self, id: i32, log: NewLog) -> StoreResult<Option<Log>> {
        sqlx::query_as::<_, Log>(&format!(
            "UPDATE logs SET user_id = $2, date = $3, task = $4, word_count = $5 \
             WHERE id = $1 RETURNING {LOG_COLUMNS}"
        ))
        .bind(id)
        .bind(log.user_id)
        .bind(log.date)
        .bind(&log.task)
        .bind(log.word_count)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| log_write_error(e, log.user_id))
    }

    async fn delete_log(&self, id: i32) -> StoreResult<()> {
        sqlx::query("DELETE FROM logs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// --- In-memory implementation ---

struct MemoryData {
    users: BTreeMap<i32, User>,
    logs: BTreeMap<i32, Log>,
    next_user_id: i32,
    next_log_id: i32,
}

/// MemoryRepository
///
/// `Repository` backed by ordered maps behind a single `RwLock`. Used by the test suite and
/// when the server starts locally without `DATABASE_URL`. Every multi-row operation holds the
/// write lock for its whole duration, which gives the same all-or-nothing behaviour as the
/// PostgreSQL transaction.
pub struct MemoryRepository {
    data: RwLock<MemoryData>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(MemoryData {
                users: BTreeMap::new(),
                logs: BTreeMap::new(),
                next_user_id: 1,
                next_log_id: 1,
            }),
        }
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryData {
    fn username_taken(&self, username: &str, except: Option<i32>) -> bool {
        self.users
            .values()
            .any(|u| u.username == username && Some(u.id) != except)
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn get_user(&self, id: i32) -> StoreResult<Option<User>> {
        Ok(self.data.read().await.users.get(&id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let data = self.data.read().await;
        Ok(data.users.values().find(|u| u.username == username).cloned())
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut data = self.data.write().await;
        if data.username_taken(&user.username, None) {
            return Err(StoreError::Duplicate("username"));
        }
        let id = data.next_user_id;
        data.next_user_id += 1;
        let stored = User {
            id,
            username: user.username,
            password: user.password.into_string(),
            full_name: user.full_name,
            is_admin: user.is_admin,
        };
        data.users.insert(id, stored.clone());
        Ok(stored)
    }

    async fn get_all_users(&self) -> StoreResult<Vec<User>> {
        Ok(self.data.read().await.users.values().cloned().collect())
    }

    async fn delete_user(&self, id: i32) -> StoreResult<()> {
        let mut data = self.data.write().await;
        data.logs.retain(|_, log| log.user_id != id);
        data.users.remove(&id);
        Ok(())
    }

    async fn update_user(&self, id: i32, changes: UserChanges) -> StoreResult<Option<User>> {
        let mut data = self.data.write().await;
        if let Some(username) = &changes.username {
            if data.username_taken(username, Some(id)) {
                return Err(StoreError::Duplicate("username"));
            }
        }
        let Some(user) = data.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(username) = changes.username {
            user.username = username;
        }
        if let Some(full_name) = changes.full_name {
            user.full_name = full_name;
        }
        if let Some(is_admin) = changes.is_admin {
            user.is_admin = is_admin;
        }
        Ok(Some(user.clone()))
    }

    async fn update_password(&self, id: i32, password: PasswordHash) -> StoreResult<Option<User>> {
        let mut data = self.data.write().await;
        Ok(data.users.get_mut(&id).map(|user| {
            user.password = password.into_string();
            user.clone()
        }))
    }

    async fn update_account(
        &self,
        id: i32,
        changes: UserChanges,
        password: PasswordHash,
    ) -> StoreResult<Option<User>> {
        let mut data = self.data.write().await;
        if let Some(username) = &changes.username {
            if data.username_taken(username, Some(id)) {
                return Err(StoreError::Duplicate("username"));
            }
        }
        let Some(user) = data.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(username) = changes.username {
            user.username = username;
        }
        if let Some(full_name) = changes.full_name {
            user.full_name = full_name;
        }
        if let Some(is_admin) = changes.is_admin {
            user.is_admin = is_admin;
        }
        user.password = password.into_string();
        Ok(Some(user.clone()))
    }

    async fn create_log(&self, log: NewLog) -> StoreResult<Log> {
        let mut data = self.data.write().await;
        if !data.users.contains_key(&log.user_id) {
            return Err(StoreError::MissingUser(log.user_id));
        }
        let id = data.next_log_id;
        data.next_log_id += 1;
        let stored = Log {
            id,
            user_id: log.user_id,
            date: log.date,
            task: log.task,
            word_count: log.word_count,
            created_at: Utc::now(),
        };
        data.logs.insert(id, stored.clone());
        Ok(stored)
    }

    async fn get_logs_by_user_id(&self, user_id: i32) -> StoreResult<Vec<Log>> {
        let data = self.data.read().await;
        Ok(data
            .logs
            .values()
            .filter(|log| log.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_all_logs(&self) -> StoreResult<Vec<Log>> {
        Ok(self.data.read().await.logs.values().cloned().collect())
    }

    async fn update_log(&self, id: i32, log: NewLog) -> StoreResult<Option<Log>> {
        let mut data = self.data.write().await;
        if !data.logs.contains_key(&id) {
            return Ok(None);
        }
        if !data.users.contains_key(&log.user_id) {
            return Err(StoreError::MissingUser(log.user_id));
        }
        Ok(data.logs.get_mut(&id).map(|stored| {
            stored.user_id = log.user_id;
            stored.date = log.date;
            stored.task = log.task;
            stored.word_count = log.word_count;
            stored.clone()
        }))
    }

    async fn delete_log(&self, id: i32) -> StoreResult<()> {
        self.data.write().await.logs.remove(&id);
        Ok(())
    }
}
