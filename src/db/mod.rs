//! PostgreSQL pool for the entity store
//!
//! The pool is built once at startup. Connection attempts are retried with a
//! doubling delay so the server can come up alongside its database.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::Config;

const CONNECT_ATTEMPTS: u32 = 5;
const FIRST_RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Failed to connect to entity store after {attempts} attempts: {message}")]
    ConnectionError { attempts: u32, message: String },

    #[error("Failed to apply loan schema: {0}")]
    MigrationError(String),

    #[error("Entity store health check failed: {0}")]
    HealthCheckError(String),
}

/// Pool sizing and timeouts, derived from [`Config`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub url: String,
    pub masked_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl From<&Config> for PoolSettings {
    fn from(config: &Config) -> Self {
        Self {
            url: config.database_url.clone(),
            masked_url: config.database_url_masked(),
            max_connections: config.db_max_connections,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// Connect to PostgreSQL, retrying transient failures
pub async fn create_pool(settings: &PoolSettings) -> Result<PgPool, DbError> {
    let mut delay = FIRST_RETRY_DELAY;
    let mut attempt = 1;

    loop {
        tracing::info!(url = %settings.masked_url, attempt, "Connecting to entity store");

        let result = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .idle_timeout(settings.idle_timeout)
            .connect(&settings.url)
            .await;

        match result {
            Ok(pool) => {
                tracing::info!(max_connections = settings.max_connections, "Entity store pool ready");
                return Ok(pool);
            }
            Err(e) if attempt < CONNECT_ATTEMPTS => {
                tracing::warn!(attempt, error = %e, retry_in_ms = delay.as_millis() as u64, "Entity store not reachable yet");
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => {
                return Err(DbError::ConnectionError {
                    attempts: attempt,
                    message: e.to_string(),
                })
            }
        }
    }
}

/// Apply the embedded loan schema migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| DbError::MigrationError(e.to_string()))?;

    tracing::info!("Loan schema up to date");
    Ok(())
}

/// Round-trip a trivial query, returning how long it took
pub async fn check_health(pool: &PgPool) -> Result<Duration, DbError> {
    let start = Instant::now();
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(|e| DbError::HealthCheckError(e.to_string()))?;

    Ok(start.elapsed())
}
