//! Durable entity store used by the loan workflow

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use super::model::{Disbursement, Investment, Loan, LoanApproval, LoanState};

/// Entity store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    /// Unique key violation or a conditional update that matched no row
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::Conflict(db_err.message().to_string())
            }
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}

/// Point lookups, conditional updates and append-only inserts for loans and
/// their approval, investment and disbursement records.
#[async_trait]
pub trait LoanRepository: Send + Sync {
    async fn create_loan(&self, loan: &Loan) -> Result<(), StoreError>;

    async fn get_loan(&self, id: Uuid) -> Result<Loan, StoreError>;

    async fn get_loans_by_state(&self, state: LoanState) -> Result<Vec<Loan>, StoreError>;

    /// Persist `loan` only if the stored row is still in `expected_state`.
    ///
    /// Returns [`StoreError::Conflict`] when the row moved on in the meantime.
    async fn update_loan(&self, loan: &Loan, expected_state: LoanState) -> Result<(), StoreError>;

    async fn create_approval(&self, approval: &LoanApproval) -> Result<(), StoreError>;

    async fn get_approval(&self, loan_id: Uuid) -> Result<LoanApproval, StoreError>;

    async fn create_investment(&self, investment: &Investment) -> Result<(), StoreError>;

    /// Investments for a loan, oldest first
    async fn get_investments(&self, loan_id: Uuid) -> Result<Vec<Investment>, StoreError>;

    async fn total_invested(&self, loan_id: Uuid) -> Result<f64, StoreError>;

    async fn create_disbursement(&self, disbursement: &Disbursement) -> Result<(), StoreError>;

    async fn get_disbursement(&self, loan_id: Uuid) -> Result<Disbursement, StoreError>;

    /// Contact address used for agreement notices
    async fn investor_email(&self, investor_id: Uuid) -> Result<String, StoreError>;
}
