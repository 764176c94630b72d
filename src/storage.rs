use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;

/// Session
///
/// Server-side record binding an opaque token (the cookie value) to a user id.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Session {
    pub sid: String,
    pub user_id: i32,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Mints a new session for `user_id` with a random 128-bit identifier.
    pub fn new(user_id: i32, ttl: Duration) -> Self {
        Self {
            sid: Uuid::new_v4().simple().to_string(),
            user_id,
            expires_at: Utc::now() + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

// 1. SessionStore Contract
/// SessionStore
///
/// Storage contract for the session layer: get/set/destroy by session id, with expiry.
/// An expired session is indistinguishable from a missing one: `get` never returns it.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, sid: &str) -> Result<Option<Session>, StoreError>;

    /// Inserts or replaces the session with the same `sid`.
    async fn set(&self, session: &Session) -> Result<(), StoreError>;

    /// Idempotent.
    async fn destroy(&self, sid: &str) -> Result<(), StoreError>;

    /// Deletes every expired record and returns how many were removed. Run at startup.
    async fn prune_expired(&self) -> Result<u64, StoreError>;
}

// 2. The Real Implementation (PostgreSQL `sessions` table)
/// PostgresSessionStore
///
/// Sessions live in the same database as users and logs; the `sessions.user_id` foreign key
/// cascades, so deleting a user also ends all of their sessions.
#[derive(Clone)]
pub struct PostgresSessionStore {
    pool: PgPool,
}

impl PostgresSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PostgresSessionStore {
    async fn get(&self, sid: &str) -> Result<Option<Session>, StoreError> {
        let session = sqlx::query_as::<_, Session>(
            "SELECT sid, user_id, expires_at FROM sessions WHERE sid = $1 AND expires_at > NOW()",
        )
        .bind(sid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn set(&self, session: &Session) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sessions (sid, user_id, expires_at) VALUES ($1, $2, $3) \
             ON CONFLICT (sid) DO UPDATE SET user_id = EXCLUDED.user_id, expires_at = EXCLUDED.expires_at",
        )
        .bind(&session.sid)
        .bind(session.user_id)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn destroy(&self, sid: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sessions WHERE sid = $1")
            .bind(sid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn prune_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// 3. The In-Memory Implementation (tests, local runs without a database)
/// MemorySessionStore
///
/// Expired entries are evicted lazily when they are looked up, and in bulk by `prune_expired`.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, sid: &str) -> Result<Option<Session>, StoreError> {
        let session = self.sessions.read().await.get(sid).cloned();
        match session {
            Some(session) if session.is_expired() => {
                self.sessions.write().await.remove(sid);
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn set(&self, session: &Session) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .insert(session.sid.clone(), session.clone());
        Ok(())
    }

    async fn destroy(&self, sid: &str) -> Result<(), StoreError> {
        self.sessions.write().await.remove(sid);
        Ok(())
    }

    async fn prune_expired(&self) -> Result<u64, StoreError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired());
        Ok((before - sessions.len()) as u64)
    }
}

/// SessionState
///
/// The concrete type used to share the session store across the application state.
pub type SessionState = Arc<dyn SessionStore>;
