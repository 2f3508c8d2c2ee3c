//! Loan route definitions

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

/// Largest accepted proof picture or signed agreement upload
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn loan_routes() -> Router<AppState> {
    Router::new()
        .route("/loans", get(list_loans).post(create_loan))
        .route("/loans/:id", get(get_loan))
        .route("/loans/:id/investments", get(get_loan_investments))
        .route("/loans/:id/invest", post(invest))
        .route(
            "/loans/:id/approve",
            post(approve_loan).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route(
            "/loans/:id/disburse",
            post(disburse_loan).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
}
