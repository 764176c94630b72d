use std::env;

use chrono::Duration;
use thiserror::Error;

/// AppConfig
///
/// Holds the application's entire configuration state. Loaded once in `main`, then shared
/// (cloned) through the `AppState` and pulled into extractors via `FromRef`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls cookie hardening and which secrets are mandatory.
    pub env: Env,
    // PostgreSQL connection string. `None` (local only) selects the in-memory store.
    pub db_url: Option<String>,
    pub db_max_connections: u32,
    pub bind_addr: String,
    // Lifetime of a login session, counted from login.
    pub session_ttl: Duration,
    // Account created by the first-boot bootstrap.
    pub admin_username: String,
    pub admin_password: String,
}

/// Env
///
/// Defines the runtime context: local development or a hardened production deployment.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Env {
    Local,
    Production,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set in production")]
    Missing(&'static str),
    #[error("{var} has an invalid value: {value:?}")]
    Invalid { var: &'static str, value: String },
}

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";
const DEFAULT_SESSION_TTL_HOURS: i64 = 24;
const DEFAULT_ADMIN_USERNAME: &str = "admin";
const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

impl Default for AppConfig {
    /// Local configuration with the in-memory store. Used by tests to build an `AppState`
    /// without touching the environment.
    fn default() -> Self {
        Self {
            env: Env::Local,
            db_url: None,
            db_max_connections: 5,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            session_ttl: Duration::hours(DEFAULT_SESSION_TTL_HOURS),
            admin_username: DEFAULT_ADMIN_USERNAME.to_string(),
            admin_password: DEFAULT_ADMIN_PASSWORD.to_string(),
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from the process environment. Fails fast when production is
    /// missing `DATABASE_URL` or `ADMIN_PASSWORD`, or when a numeric variable does not parse.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `load`, reading variables through `lookup` instead of the real environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = match lookup("APP_ENV").as_deref() {
            Some("production") => Env::Production,
            _ => Env::Local,
        };

        let db_url = lookup("DATABASE_URL").filter(|url| !url.is_empty());
        if env == Env::Production && db_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let admin_password = match (env, lookup("ADMIN_PASSWORD")) {
            (_, Some(password)) if !password.is_empty() => password,
            (Env::Production, _) => return Err(ConfigError::Missing("ADMIN_PASSWORD")),
            (Env::Local, _) => DEFAULT_ADMIN_PASSWORD.to_string(),
        };

        let ttl_hours = parse_var(&lookup, "SESSION_TTL_HOURS", DEFAULT_SESSION_TTL_HOURS)?;
        if ttl_hours <= 0 {
            return Err(ConfigError::Invalid {
                var: "SESSION_TTL_HOURS",
                value: ttl_hours.to_string(),
            });
        }

        Ok(Self {
            env,
            db_url,
            db_max_connections: parse_var(&lookup, "DB_MAX_CONNECTIONS", 5)?,
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            session_ttl: Duration::hours(ttl_hours),
            admin_username: lookup("ADMIN_USERNAME")
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| DEFAULT_ADMIN_USERNAME.to_string()),
            admin_password,
        })
    }

    /// Session cookies carry the `Secure` attribute outside local development.
    pub fn secure_cookies(&self) -> bool {
        self.env == Env::Production
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}
