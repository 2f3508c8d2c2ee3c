//! Route definitions for the loan API

mod loan;

use axum::{routing::get, Router};

use crate::handlers::health_check;
use crate::middleware::request_tracing;
use crate::state::AppState;

pub use loan::loan_routes;

/// Full application router, without CORS (configured by the binary)
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", loan_routes())
        .with_state(state)
        .layer(axum::middleware::from_fn(request_tracing))
}
