use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::db;
use crate::state::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub coordination: String,
    pub version: String,
}

/// Reports database and coordination store connectivity
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = match &state.database {
        Some(pool) => match db::check_health(pool).await {
            Ok(latency) => format!("connected ({}ms)", latency.as_millis()),
            Err(e) => format!("error: {}", e),
        },
        None => "in-memory".to_string(),
    };

    let coordination = match state.coordination.ping().await {
        Ok(()) => "connected".to_string(),
        Err(e) => format!("error: {}", e),
    };

    let healthy = !database.starts_with("error") && !coordination.starts_with("error");
    let (status, label) = if healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (
        status,
        Json(HealthResponse {
            status: label.to_string(),
            database,
            coordination,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}
