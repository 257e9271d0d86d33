use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required variable {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

/// Process configuration, built once at startup and handed to every component
/// that needs it.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub max_connection_pooling: u32,
    pub port: u16,
    pub log_file: String,
    /// Deadline for a single engine operation, begin to commit.
    pub service_timeout: Duration,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // mandatory fields
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let jwt_secret = lookup("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        // optional fields
        let max_connection_pooling = parse_or(&lookup, "MAX_CONNECTION_POOLING", 5)?;
        let port = parse_or(&lookup, "PORT", 3000)?;
        let log_file = lookup("LOG_FILE").unwrap_or_else(|| "app.log".to_string());
        let service_timeout = Duration::from_secs(parse_or(&lookup, "SERVICE_TIMEOUT", 30)?);
        let access_token_ttl =
            Duration::from_secs(parse_or(&lookup, "JWT_ACCESS_TOKEN_EXPIRE_IN", 15 * 60)?);
        let refresh_token_ttl =
            Duration::from_secs(parse_or(&lookup, "JWT_REFRESH_TOKEN_EXPIRE_IN", 60 * 60)?);

        Ok(Self {
            database_url,
            jwt_secret,
            max_connection_pooling,
            port,
            log_file,
            service_timeout,
            access_token_ttl,
            refresh_token_ttl,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}
