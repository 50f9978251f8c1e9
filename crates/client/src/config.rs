//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URL` - `PostgreSQL` connection string
//!
//! ## Optional
//! - `DATABASE_MAX_CONNECTIONS` - Pool size upper bound (default: 10)
//! - `DATABASE_MIN_CONNECTIONS` - Idle connections kept open (default: 2)
//! - `DATABASE_ACQUIRE_TIMEOUT_SECS` - Wait for a pooled connection (default: 10)
//! - `DATABASE_LOG_QUERIES` - Log every statement at `info` instead of `debug` (default: false)

use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Data client configuration.
///
/// Implements `Debug` manually to redact the connection string.
#[derive(Clone)]
pub struct ClientConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// Maximum pooled connections
    pub max_connections: u32,
    /// Minimum idle connections
    pub min_connections: u32,
    /// How long to wait for a pooled connection
    pub acquire_timeout: Duration,
    /// Log statements at `info` level
    pub log_queries: bool,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("database_url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("acquire_timeout", &self.acquire_timeout)
            .field("log_queries", &self.log_queries)
            .finish()
    }
}

impl ClientConfig {
    /// Configuration with default pool settings for `database_url`.
    #[must_use]
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: SecretString::from(database_url.into()),
            max_connections: 10,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(10),
            log_queries: false,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `DATABASE_URL` is missing or a numeric/boolean
    /// variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`ClientConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;

        let max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10_u32)?;
        let min_connections = parse_or(&lookup, "DATABASE_MIN_CONNECTIONS", 2_u32)?;
        if min_connections > max_connections {
            return Err(ConfigError::InvalidEnvVar(
                "DATABASE_MIN_CONNECTIONS".to_string(),
                format!("must not exceed DATABASE_MAX_CONNECTIONS ({max_connections})"),
            ));
        }
        let acquire_secs = parse_or(&lookup, "DATABASE_ACQUIRE_TIMEOUT_SECS", 10_u64)?;
        let log_queries = parse_bool(&lookup, "DATABASE_LOG_QUERIES")?;

        Ok(Self {
            database_url: SecretString::from(database_url),
            max_connections,
            min_connections,
            acquire_timeout: Duration::from_secs(acquire_secs),
            log_queries,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse an optional variable, falling back to `default` when unset.
fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

/// Parse a boolean flag accepting `1/0`, `true/false`, `yes/no`.
fn parse_bool<F>(lookup: &F, key: &str) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(false);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("expected a boolean, got '{other}'"),
        )),
    }
}
