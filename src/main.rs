//! Loanflow API Server
//!
//! Runs the loan origination workflow against PostgreSQL, Redis and local
//! document storage.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};

use loanflow_server::config::{Config, EmailProvider};
use loanflow_server::coordination::{CoordinationStore, RedisCoordinationStore};
use loanflow_server::db;
use loanflow_server::documents::LocalDocumentStore;
use loanflow_server::loan::{LoanService, PgLoanRepository};
use loanflow_server::notification::{LogNotifier, Notifier, WebhookNotifier};
use loanflow_server::routes::create_router;
use loanflow_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!(environment = config.environment.as_str(), "Starting loanflow server");

    let db_pool = db::create_pool(&db::PoolSettings::from(&config)).await?;
    db::run_migrations(&db_pool).await?;

    let coordination: Arc<dyn CoordinationStore> = Arc::new(
        RedisCoordinationStore::connect(&config.redis_url, &config.redis_namespace)
            .await
            .context("Failed to connect to coordination store")?,
    );

    let documents = Arc::new(
        LocalDocumentStore::new(&config.file_storage_path, &config.file_storage_url)
            .await
            .context("Failed to prepare document storage")?,
    );

    let notifier: Arc<dyn Notifier> = match &config.email_provider {
        EmailProvider::Log => Arc::new(LogNotifier),
        EmailProvider::Webhook { url } => {
            Arc::new(WebhookNotifier::new(url.clone(), config.notify_timeout()))
        },
    };

    let loan_service = Arc::new(LoanService::new(
        Arc::new(PgLoanRepository::new(db_pool.clone())),
        coordination.clone(),
        documents,
        notifier,
        config.workflow_settings(),
    ));

    let app_state = AppState::new(loan_service, coordination, Some(db_pool));
    let app = create_router(app_state).layer(configure_cors(&config));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid HOST/PORT")?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check at http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn configure_cors(config: &Config) -> CorsLayer {
    let allowed_origins_str = config.cors_allowed_origins.clone().unwrap_or_default();

    if allowed_origins_str.is_empty() {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = allowed_origins_str
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
