use axum::{
    Json,
    extract::{
        FromRequest, FromRequestParts, Path, Request,
        path::ErrorKind,
        rejection::{JsonRejection, PathRejection},
    },
    http::request::Parts,
};
use heck::ToLowerCamelCase;
use serde::de::DeserializeOwned;
use serde_json::Value;
use validator::{Validate, ValidationErrors};

use crate::error::{AppError, FieldErrors};

/// ValidatedJson
///
/// Drop-in replacement for `axum::Json` on write paths. The body is deserialized and then run
/// through the payload's `validator::Validate` rules; any failure is rejected as
/// `AppError::Validation` before the handler (and therefore the repository) is reached.
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<Value>::from_request(req, state)
            .await
            .map_err(reject_body)?;
        let payload: T = serde_path_to_error::deserialize(value).map_err(reject_field)?;
        payload.validate().map_err(into_field_errors)?;
        Ok(Self(payload))
    }
}

/// Wrong content type or a body that is not JSON at all.
fn reject_body(rejection: JsonRejection) -> AppError {
    AppError::field("body", rejection.body_text())
}

/// Well-formed JSON whose shape does not match the payload, keyed by the offending field
/// (e.g. `wordCount: ["invalid type: string ..., expected i32"]`).
fn reject_field(err: serde_path_to_error::Error<serde_json::Error>) -> AppError {
    let path = err.path().to_string();
    let field = if path == "." { "body".to_string() } else { path };
    AppError::field(&field, err.inner().to_string())
}

/// PathParam
///
/// `axum::extract::Path` with the rejection folded into `AppError`, so a malformed id answers
/// with the same JSON error body as every other 400.
pub struct PathParam<T>(pub T);

impl<T, S> FromRequestParts<S> for PathParam<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(reject_path)?;
        Ok(Self(value))
    }
}

fn reject_path(rejection: PathRejection) -> AppError {
    let field = match &rejection {
        PathRejection::FailedToDeserializePathParams(inner) => match inner.kind() {
            ErrorKind::ParseErrorAtKey { key, .. } => key.to_lower_camel_case(),
            _ => "path".to_string(),
        },
        _ => "path".to_string(),
    };
    AppError::field(&field, rejection.body_text())
}

/// Flattens `validator` output into `{ "camelCaseField": ["message", ...] }`.
pub fn into_field_errors(errors: ValidationErrors) -> AppError {
    let mut fields = FieldErrors::new();
    for (name, errs) in errors.field_errors() {
        let messages = errs
            .iter()
            .map(|e| match &e.message {
                Some(message) => message.to_string(),
                None => e.code.to_string(),
            })
            .collect();
        fields.insert(name.to_lower_camel_case(), messages);
    }
    AppError::Validation(fields)
}
