//! Process configuration read from the environment.
//!
//! Each integration (SMTP, Google OAuth) owns its own `from_env`; this
//! module holds the server-wide knobs and the small parsing helpers they share.

use crate::services::google::DEFAULT_ROUTE_PREFIX;
use crate::services::session::DEFAULT_CAPACITY;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_RETURN_ENDPOINT: &str = "/";

/// Parse a boolean-ish environment variable. Unset or unrecognized values yield `None`.
pub(crate) fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid PORT: {0}")]
    InvalidPort(String),
    #[error("unknown AUTH_STORE {0:?} (expected \"postgres\" or \"memory\")")]
    UnknownStore(String),
    #[error("DATABASE_URL required when AUTH_STORE=postgres")]
    MissingDatabaseUrl,
    #[error("GOOGLE_ROUTE_PREFIX must start with '/' and not end with it: {0:?}")]
    InvalidPrefix(String),
}

/// Where user credentials live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

impl StoreKind {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "memory" | "mem" => Ok(Self::Memory),
            _ => Err(ConfigError::UnknownStore(raw.to_owned())),
        }
    }
}

/// Server-wide settings.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub store: StoreKind,
    pub database_url: Option<String>,
    /// Where a successful login lands when no redirect was captured.
    pub return_endpoint: String,
    /// Mount point of the Google provider routes.
    pub google_prefix: String,
    /// Only Google accounts under this domain may log in.
    pub google_allowed_domain: Option<String>,
    pub cookie_secure: bool,
    /// Upper bound on stored sessions.
    pub session_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            store: StoreKind::Memory,
            database_url: None,
            return_endpoint: DEFAULT_RETURN_ENDPOINT.to_owned(),
            google_prefix: DEFAULT_ROUTE_PREFIX.to_owned(),
            google_allowed_domain: None,
            cookie_secure: false,
            session_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl AppConfig {
    /// Read `PORT`, `AUTH_STORE`, `DATABASE_URL`, `RETURN_ENDPOINT`,
    /// `GOOGLE_ROUTE_PREFIX`, `GOOGLE_ALLOWED_DOMAIN`, `COOKIE_SECURE` and
    /// `SESSION_CAPACITY`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for malformed values or a Postgres store
    /// without a database URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match std::env::var("PORT") {
            Ok(raw) => raw.trim().parse::<u16>().map_err(|_| ConfigError::InvalidPort(raw))?,
            Err(_) => DEFAULT_PORT,
        };

        let database_url = env_non_empty("DATABASE_URL");
        let store = match env_non_empty("AUTH_STORE") {
            Some(raw) => StoreKind::parse(&raw)?,
            None if database_url.is_some() => StoreKind::Postgres,
            None => StoreKind::Memory,
        };
        if store == StoreKind::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingDatabaseUrl);
        }

        let google_prefix = env_non_empty("GOOGLE_ROUTE_PREFIX").unwrap_or_else(|| DEFAULT_ROUTE_PREFIX.to_owned());
        validate_prefix(&google_prefix)?;

        let cookie_secure = env_bool("COOKIE_SECURE").unwrap_or_else(|| {
            std::env::var("GOOGLE_OAUTH_REDIRECT_URI")
                .map(|uri| uri.starts_with("https://"))
                .unwrap_or(false)
        });

        Ok(Self {
            port,
            store,
            database_url,
            return_endpoint: env_non_empty("RETURN_ENDPOINT").unwrap_or_else(|| DEFAULT_RETURN_ENDPOINT.to_owned()),
            google_prefix,
            google_allowed_domain: env_non_empty("GOOGLE_ALLOWED_DOMAIN")
                .map(|d| d.trim_start_matches('@').to_owned())
                .filter(|d| !d.is_empty()),
            cookie_secure,
            session_capacity: env_parse("SESSION_CAPACITY", DEFAULT_CAPACITY).max(1),
        })
    }
}

fn validate_prefix(prefix: &str) -> Result<(), ConfigError> {
    if prefix.len() < 2 || !prefix.starts_with('/') || prefix.ends_with('/') {
        return Err(ConfigError::InvalidPrefix(prefix.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
