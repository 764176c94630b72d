/// Router Module Index
///
/// Routes are split by access level. Each router gets its gate as a route layer in
/// `create_router`, and the handlers repeat the check through their extractors.

/// Anonymous access: health, registration, login, logout.
pub mod public;

/// Requires a live session (401 otherwise).
pub mod authenticated;

/// Requires an admin session (403 otherwise, anonymous callers included).
pub mod admin;
