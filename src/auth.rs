use axum::{
    extract::{FromRef, FromRequestParts, Request},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::Response,
};
use chrono::Duration;
use cookie::{Cookie, SameSite};

use crate::{
    error::AppError,
    models::User,
    password::{verify_dummy, verify_password},
    repository::{Repository, RepositoryState},
    storage::{Session, SessionState, SessionStore},
};

/// Name of the cookie carrying the opaque session id.
pub const SESSION_COOKIE: &str = "worklog.sid";

/// AuthUser Extractor Result
///
/// The resolved identity of an authenticated request: a live session whose user still exists.
/// Handlers use it to read the caller's id and to run the ownership/role predicates.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i32,
    pub is_admin: bool,
    /// The session this request was authenticated with (needed for logout).
    pub session_id: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    /// Self-or-admin: may the caller read or write data owned by `user_id`?
    pub fn can_access(&self, user_id: i32) -> bool {
        self.id == user_id || self.is_admin
    }

    pub fn ensure_can_access(&self, user_id: i32) -> Result<(), AppError> {
        if self.can_access(user_id) {
            Ok(())
        } else {
            Err(AppError::Forbidden("access denied"))
        }
    }
}

/// AdminUser
///
/// An `AuthUser` that passed the `is_admin` predicate. Anyone else, including anonymous
/// callers, is rejected with 403.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

/// AuthUser Extractor Implementation
///
/// 1. Reuse an identity already resolved earlier in this request (by the route-layer gate).
/// 2. Read the session id from the `worklog.sid` cookie.
/// 3. Resolve it through the session store (expired sessions resolve to nothing).
/// 4. Re-load the user so deleted accounts and changed roles take effect immediately.
///
/// Rejection: `AppError::Unauthenticated` (401) on any failure to identify the caller.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    SessionState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let sid = session_id_from_headers(&parts.headers).ok_or(AppError::Unauthenticated)?;

        let repo = RepositoryState::from_ref(state);
        let sessions = SessionState::from_ref(state);
        let user = resolve_session(repo.as_ref(), sessions.as_ref(), &sid)
            .await?
            .ok_or(AppError::Unauthenticated)?;

        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    SessionState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match AuthUser::from_request_parts(parts, state).await {
            Ok(user) if user.is_admin() => Ok(AdminUser(user)),
            Ok(_) | Err(AppError::Unauthenticated) => {
                Err(AppError::Forbidden("admin access required"))
            }
            Err(e) => Err(e),
        }
    }
}

/// require_authenticated
///
/// Route-layer gate for the authenticated router. Rejection happens in the `AuthUser`
/// extractor; the resolved identity stays in the request extensions for the handler.
pub async fn require_authenticated(_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// require_admin
///
/// Route-layer gate for the admin router.
pub async fn require_admin(_admin: AdminUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// Extracts the session id from the `Cookie` header(s), if present.
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| Cookie::split_parse(value))
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
}

/// Maps a session id to the caller's identity. Sessions that outlived their user are destroyed.
pub async fn resolve_session(
    repo: &dyn Repository,
    sessions: &dyn SessionStore,
    sid: &str,
) -> Result<Option<AuthUser>, AppError> {
    let Some(session) = sessions.get(sid).await? else {
        return Ok(None);
    };
    let Some(user) = repo.get_user(session.user_id).await? else {
        sessions.destroy(sid).await?;
        return Ok(None);
    };
    Ok(Some(AuthUser {
        id: user.id,
        is_admin: user.is_admin,
        session_id: session.sid,
    }))
}

/// authenticate
///
/// Credential check for login. An unknown username and a wrong password produce the same
/// error, and the unknown-username path still performs a full hash verification.
pub async fn authenticate(
    repo: &dyn Repository,
    username: &str,
    password: &str,
) -> Result<User, AppError> {
    match repo.get_user_by_username(username).await? {
        Some(user) if verify_password(password, &user.password) => Ok(user),
        Some(_) => Err(AppError::InvalidCredentials),
        None => {
            verify_dummy(password);
            Err(AppError::InvalidCredentials)
        }
    }
}

/// Creates and persists a fresh session for `user_id`.
pub async fn start_session(
    sessions: &dyn SessionStore,
    user_id: i32,
    ttl: Duration,
) -> Result<Session, AppError> {
    let session = Session::new(user_id, ttl);
    sessions.set(&session).await?;
    Ok(session)
}

/// The `Set-Cookie` value for a newly established session. Only the opaque id leaves the server.
pub fn session_cookie(session: &Session, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session.sid.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

/// A `Set-Cookie` value that makes the browser drop the session cookie.
pub fn removal_cookie(secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build();
    cookie.make_removal();
    cookie
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn finds_session_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; worklog.sid=abc123; lang=en"),
        );
        assert_eq!(session_id_from_headers(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn missing_cookie_yields_none() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark"));
        assert!(session_id_from_headers(&headers).is_none());
        assert!(session_id_from_headers(&HeaderMap::new()).is_none());
    }

    #[test]
    fn session_cookie_is_http_only() {
        let session = Session::new(1, Duration::hours(1));
        let rendered = session_cookie(&session, true).to_string();
        assert!(rendered.starts_with(&format!("{SESSION_COOKIE}={}", session.sid)));
        assert!(rendered.contains("HttpOnly"));
        assert!(rendered.contains("Secure"));
        assert!(rendered.contains("SameSite=Lax"));
    }

    #[test]
    fn ownership_predicate() {
        let employee = AuthUser {
            id: 2,
            is_admin: false,
            session_id: "s".into(),
        };
        let admin = AuthUser {
            id: 1,
            is_admin: true,
            session_id: "t".into(),
        };
        assert!(employee.can_access(2));
        assert!(!employee.can_access(3));
        assert!(admin.can_access(3));
        assert!(matches!(
            employee.ensure_can_access(3),
            Err(AppError::Forbidden(_))
        ));
    }
}
