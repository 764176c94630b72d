use std::collections::BTreeMap;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use heck::ToLowerCamelCase;
use serde::Serialize;
use thiserror::Error;

/// StoreError
///
/// Failures raised by the data-access layer (`Repository` and `SessionStore` implementations).
/// Business logic never inspects these beyond the two constraint variants; everything else is
/// surfaced to the caller as a generic 500 by the `From<StoreError> for AppError` conversion.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint rejected the write. Carries the offending column.
    #[error("duplicate value for {0}")]
    Duplicate(&'static str),

    /// A log referenced a user id that does not exist.
    #[error("user {0} does not exist")]
    MissingUser(i32),

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// FieldErrors
///
/// Field name (as it appears in the JSON payload) to the list of human-readable problems found.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// AppError
///
/// The HTTP-facing error taxonomy. Every handler returns `Result<_, AppError>` and this single
/// `IntoResponse` implementation is the only place where failures become responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed, missing or out-of-range input. HTTP 400 with per-field detail.
    #[error("validation failed")]
    Validation(FieldErrors),

    /// No session, or the session expired. HTTP 401.
    #[error("authentication required")]
    Unauthenticated,

    /// Bad username/password pair. HTTP 401. Deliberately does not say which one was wrong.
    #[error("invalid username or password")]
    InvalidCredentials,

    /// Valid session but insufficient role or ownership. HTTP 403.
    #[error("{0}")]
    Forbidden(&'static str),

    /// HTTP 404.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Persistence failure. HTTP 500; the detail only reaches the logs.
    #[error("internal server error")]
    Store(#[source] StoreError),
}

impl AppError {
    /// Convenience constructor for a single-field validation failure.
    pub fn field(name: &str, message: impl Into<String>) -> Self {
        let mut fields = FieldErrors::new();
        fields.insert(name.to_string(), vec![message.into()]);
        AppError::Validation(fields)
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable, machine-readable code. Clients match on this, never on `message`.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_FAILED",
            AppError::Unauthenticated => "UNAUTHENTICATED",
            AppError::InvalidCredentials => "INVALID_CREDENTIALS",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Store(_) => "INTERNAL",
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(column) => {
                AppError::field(&column.to_lower_camel_case(), "already exists")
            }
            StoreError::MissingUser(_) => AppError::field("userId", "user does not exist"),
            other => AppError::Store(other),
        }
    }
}

/// ErrorBody
///
/// Wire shape of every error response:
/// `{"code": "VALIDATION_FAILED", "message": "...", "fields": {"task": ["must not be empty"]}}`
#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a FieldErrors>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Store(source) = &self {
            tracing::error!(error = %source, "store failure");
        }

        let status = self.status_code();
        let fields = match &self {
            AppError::Validation(fields) => Some(fields),
            _ => None,
        };
        let body = ErrorBody {
            code: self.error_code(),
            message: self.to_string(),
            fields,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_mapping() {
        assert_eq!(AppError::field("task", "x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Unauthenticated.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::InvalidCredentials.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden("no").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NotFound("log").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::Store(StoreError::Hash("boom".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn store_failures_hide_detail() {
        let err = AppError::from(StoreError::Hash("salt exploded".into()));
        assert_eq!(err.to_string(), "internal server error");
    }

    #[test]
    fn constraint_errors_become_field_errors() {
        match AppError::from(StoreError::Duplicate("username")) {
            AppError::Validation(fields) => assert!(fields.contains_key("username")),
            other => panic!("unexpected {other:?}"),
        }
        match AppError::from(StoreError::MissingUser(7)) {
            AppError::Validation(fields) => assert!(fields.contains_key("userId")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
