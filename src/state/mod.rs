//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::coordination::CoordinationStore;
use crate::loan::LoanService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub loan_service: Arc<LoanService>,
    pub coordination: Arc<dyn CoordinationStore>,
    /// Absent when running on in-memory collaborators
    pub database: Option<PgPool>,
}

impl AppState {
    pub fn new(
        loan_service: Arc<LoanService>,
        coordination: Arc<dyn CoordinationStore>,
        database: Option<PgPool>,
    ) -> Self {
        Self {
            loan_service,
            coordination,
            database,
        }
    }
}

impl FromRef<AppState> for Arc<LoanService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.loan_service.clone()
    }
}
