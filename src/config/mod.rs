//! Configuration management
//!
//! Loads and validates configuration from environment variables, with
//! support for different environments (development, staging, production).

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::loan::WorkflowSettings;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid environment value: {0}")]
    InvalidValue(String),

    #[error("Invalid port number: {0}")]
    InvalidPort(String),
}

/// Application environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue(format!(
                "Invalid environment: '{}'. Expected: dev, staging, or prod",
                s
            ))),
        }
    }
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

/// Where agreement notices go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailProvider {
    /// Written to the log only
    Log,
    /// POSTed to an email gateway
    Webhook { url: String },
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Current environment
    pub environment: Environment,

    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections
    pub db_max_connections: u32,

    /// Coordination store (idempotency markers, locks, cache)
    pub redis_url: String,

    /// Prefix applied to every coordination key
    pub redis_namespace: String,

    pub host: String,

    pub port: u16,

    /// Directory uploaded documents are written to
    pub file_storage_path: String,

    /// Public URL the storage directory is served from
    pub file_storage_url: String,

    pub email_provider: EmailProvider,

    pub idempotency_ttl_seconds: u64,

    pub lock_ttl_seconds: u64,

    pub cache_ttl_seconds: u64,

    /// Bound on agreement notice delivery, must stay below the lock TTL
    pub notify_timeout_seconds: u64,

    /// CORS allowed origins
    pub cors_allowed_origins: Option<String>,

    /// Log level (RUST_LOG)
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        dotenvy::dotenv().ok();

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = lookup("ENVIRONMENT")
            .map(|s| s.parse::<Environment>())
            .transpose()?
            .unwrap_or_default();

        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;

        let db_max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", 5u32)?;

        let redis_url =
            lookup("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".to_string());

        let redis_namespace = lookup("REDIS_NAMESPACE").unwrap_or_else(|| "loanflow".to_string());

        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let port = lookup("PORT")
            .unwrap_or_else(|| "8080".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort("PORT must be a valid number".to_string()))?;

        let file_storage_path =
            lookup("FILE_STORAGE_PATH").unwrap_or_else(|| "./storage".to_string());

        let file_storage_url = lookup("FILE_STORAGE_URL")
            .unwrap_or_else(|| "http://localhost:8080/files".to_string());

        let email_provider = match lookup("EMAIL_PROVIDER")
            .unwrap_or_else(|| "log".to_string())
            .to_lowercase()
            .as_str()
        {
            "log" => EmailProvider::Log,
            "webhook" => EmailProvider::Webhook {
                url: lookup("EMAIL_WEBHOOK_URL").ok_or_else(|| {
                    ConfigError::MissingEnvVar("EMAIL_WEBHOOK_URL".to_string())
                })?,
            },
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "Invalid EMAIL_PROVIDER: '{}'. Expected: log or webhook",
                    other
                )))
            }
        };

        let idempotency_ttl_seconds = parse_seconds(&lookup, "IDEMPOTENCY_TTL_SECONDS", 86_400)?;
        let lock_ttl_seconds = parse_seconds(&lookup, "LOCK_TTL_SECONDS", 30)?;
        let cache_ttl_seconds = parse_seconds(&lookup, "CACHE_TTL_SECONDS", 300)?;
        let notify_timeout_seconds = parse_seconds(&lookup, "NOTIFY_TIMEOUT_SECONDS", 10)?;

        if notify_timeout_seconds >= lock_ttl_seconds {
            return Err(ConfigError::InvalidValue(format!(
                "NOTIFY_TIMEOUT_SECONDS ({}) must be below LOCK_TTL_SECONDS ({})",
                notify_timeout_seconds, lock_ttl_seconds
            )));
        }

        let cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS");

        let log_level = lookup("RUST_LOG").unwrap_or_else(|| "info".to_string());

        Ok(Config {
            environment,
            database_url,
            db_max_connections,
            redis_url,
            redis_namespace,
            host,
            port,
            file_storage_path,
            file_storage_url,
            email_provider,
            idempotency_ttl_seconds,
            lock_ttl_seconds,
            cache_ttl_seconds,
            notify_timeout_seconds,
            cors_allowed_origins,
            log_level,
        })
    }

    /// Get database URL with the password masked, for logging
    pub fn database_url_masked(&self) -> String {
        if let Some(at_pos) = self.database_url.find('@') {
            if let Some(colon_pos) = self.database_url[..at_pos].rfind(':') {
                let prefix = &self.database_url[..colon_pos + 1];
                let suffix = &self.database_url[at_pos..];
                return format!("{}****{}", prefix, suffix);
            }
        }
        self.database_url.clone()
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_seconds)
    }

    pub fn workflow_settings(&self) -> WorkflowSettings {
        WorkflowSettings {
            idempotency_ttl: Duration::from_secs(self.idempotency_ttl_seconds),
            lock_ttl: Duration::from_secs(self.lock_ttl_seconds),
            cache_ttl: Duration::from_secs(self.cache_ttl_seconds),
            notify_timeout: self.notify_timeout(),
        }
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse::<T>().map_err(|_| {
            ConfigError::InvalidValue(format!("{} must be a valid number, got '{}'", name, raw))
        }),
        None => Ok(default),
    }
}

/// Durations in whole seconds; zero would disable the entry it configures
fn parse_seconds<F>(lookup: &F, name: &str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let seconds = parse_or(lookup, name, default)?;
    if seconds == 0 {
        return Err(ConfigError::InvalidValue(format!(
            "{} must be greater than zero",
            name
        )));
    }
    Ok(seconds)
}
