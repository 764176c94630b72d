use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::password::PasswordHash;

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// An employee or administrator account from the `users` table.
/// The `password` column holds an Argon2 PHC string; it is never serialized into a response.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct User {
    pub id: i32,
    // Login identifier, unique across the table.
    pub username: String,
    #[serde(skip)]
    pub password: String,
    pub full_name: String,
    pub is_admin: bool,
}

/// Log
///
/// One work-log entry from the `logs` table. `date` is the day the work was done,
/// `created_at` is when the row was inserted.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Log {
    pub id: i32,
    // FK to users.id (Owner).
    pub user_id: i32,
    #[ts(type = "string")]
    pub date: DateTime<Utc>,
    pub task: String,
    pub word_count: i32,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

// --- Data-access inputs (already validated) ---

/// NewUser
///
/// Fully validated insert for `Repository::create_user`. The credential is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password: PasswordHash,
    pub full_name: String,
    pub is_admin: bool,
}

/// UserChanges
///
/// Partial profile/role update. `None` leaves the column untouched. Credentials are
/// changed through `Repository::update_password` only.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub is_admin: Option<bool>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.full_name.is_none() && self.is_admin.is_none()
    }
}

/// NewLog
///
/// The writable columns of a log. Used both for inserts and for full overwrites.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLog {
    pub user_id: i32,
    pub date: DateTime<Utc>,
    pub task: String,
    pub word_count: i32,
}

// --- Request Payloads (Input Schemas) ---
//
// Every field is optional at the serde level so that a missing field surfaces as a
// field-level validation error instead of an opaque deserialization failure.

/// RegisterUserRequest
///
/// Input for self-service registration (POST /api/register) and admin-issued accounts
/// (POST /api/admin/users). `isAdmin` is ignored on the self-service path.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RegisterUserRequest {
    #[validate(
        required(message = "is required"),
        length(min = 3, message = "must be at least 3 characters")
    )]
    pub username: Option<String>,
    #[validate(
        required(message = "is required"),
        length(min = 6, message = "must be at least 6 characters")
    )]
    pub password: Option<String>,
    #[validate(
        required(message = "is required"),
        length(min = 2, message = "must be at least 2 characters")
    )]
    pub full_name: Option<String>,
    #[serde(default)]
    pub is_admin: Option<bool>,
}

/// LoginRequest
///
/// Input for POST /api/login.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct LoginRequest {
    #[validate(required(message = "is required"))]
    pub username: Option<String>,
    #[validate(required(message = "is required"))]
    pub password: Option<String>,
}

/// UpdateUserRequest
///
/// Partial update for PUT /api/admin/users/{id}. Absent fields are left unchanged; a present
/// `password` is re-hashed and replaces the stored credential.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateUserRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 3, message = "must be at least 3 characters"))]
    pub username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 6, message = "must be at least 6 characters"))]
    pub password: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 2, message = "must be at least 2 characters"))]
    pub full_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
}

impl UpdateUserRequest {
    /// Splits off the profile/role part of the update.
    pub fn changes(&self) -> UserChanges {
        UserChanges {
            username: self.username.clone(),
            full_name: self.full_name.clone(),
            is_admin: self.is_admin,
        }
    }
}

/// InsertLogRequest
///
/// Body of POST /api/logs and PUT /api/logs/{id}.
/// `date` accepts an RFC 3339 timestamp or a plain `YYYY-MM-DD` day.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct InsertLogRequest {
    #[validate(required(message = "is required"))]
    pub user_id: Option<i32>,

    #[schema(example = "2024-01-01")]
    #[validate(
        required(message = "is required"),
        custom(function = "validate_log_date", message = "must be a date (YYYY-MM-DD) or RFC 3339 timestamp")
    )]
    pub date: Option<String>,

    #[validate(
        required(message = "is required"),
        custom(function = "validate_not_blank", message = "must not be empty")
    )]
    pub task: Option<String>,

    #[validate(
        required(message = "is required"),
        range(min = 0, message = "must not be negative")
    )]
    pub word_count: Option<i32>,
}

impl InsertLogRequest {
    /// Converts a request that already passed `validate()` into the data-access input.
    /// Returns `None` if called on an unvalidated payload.
    pub fn to_new_log(&self) -> Option<NewLog> {
        Some(NewLog {
            user_id: self.user_id?,
            date: parse_log_date(self.date.as_deref()?)?,
            task: self.task.clone()?,
            word_count: self.word_count?,
        })
    }
}

// --- Field helpers ---

/// Parses a work date. Plain days are pinned to midnight UTC.
pub fn parse_log_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn validate_log_date(raw: &str) -> Result<(), ValidationError> {
    match parse_log_date(raw) {
        Some(_) => Ok(()),
        None => Err(ValidationError::new("date")),
    }
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}
