//! Loan models and data structures for the origination pipeline

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

/// Lifecycle state of a loan
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "loan_state", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoanState {
    Proposed,  // Submitted by the borrower
    Approved,  // Field visit validated, open for investment
    Invested,  // Fully funded, agreement letter issued
    Disbursed, // Money handed to the borrower
}

impl LoanState {
    pub const ALL: [LoanState; 4] = [
        LoanState::Proposed,
        LoanState::Approved,
        LoanState::Invested,
        LoanState::Disbursed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LoanState::Proposed => "proposed",
            LoanState::Approved => "approved",
            LoanState::Invested => "invested",
            LoanState::Disbursed => "disbursed",
        }
    }
}

impl fmt::Display for LoanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoanState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LoanState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("unknown loan state '{}'", s))
    }
}

/// Loan model
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Loan {
    pub id: Uuid,
    pub borrower_id: Uuid,
    pub principal_amount: f64,
    pub rate: f64,
    pub roi: f64,
    pub agreement_letter_url: Option<String>,
    pub state: LoanState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    /// New loan in the `proposed` state
    pub fn new(borrower_id: Uuid, principal_amount: f64, rate: f64, roi: f64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            borrower_id,
            principal_amount,
            rate,
            roi,
            agreement_letter_url: None,
            state: LoanState::Proposed,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Field validation performed by an employee before a loan can be funded
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct LoanApproval {
    pub loan_id: Uuid,
    pub employee_id: Uuid,
    pub picture_proof_url: String,
    pub approval_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A single investor's contribution towards a loan's principal
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Investment {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub investor_id: Uuid,
    pub amount: f64,
    pub created_at: DateTime<Utc>,
}

impl Investment {
    pub fn new(loan_id: Uuid, investor_id: Uuid, amount: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            loan_id,
            investor_id,
            amount,
            created_at: Utc::now(),
        }
    }
}

/// Hand-over of the funds to the borrower
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Disbursement {
    pub loan_id: Uuid,
    pub employee_id: Uuid,
    pub signed_agreement_url: String,
    pub disbursement_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Uploaded file handed to the document store
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub filename: String,
    pub content: Vec<u8>,
}

/// Request to propose a new loan
#[derive(Debug, Clone, Deserialize)]
pub struct CreateLoanRequest {
    pub borrower_id: Uuid,
    pub principal_amount: f64,
    pub rate: f64,
    pub roi: f64,
}

/// Request to approve a proposed loan
#[derive(Debug, Clone)]
pub struct ApproveLoanRequest {
    pub loan_id: Uuid,
    pub employee_id: Uuid,
    pub picture_proof: DocumentUpload,
    pub approval_date: DateTime<Utc>,
    pub idempotency_key: String,
}

/// Request to add an investment to an approved loan
#[derive(Debug, Clone)]
pub struct InvestRequest {
    pub loan_id: Uuid,
    pub investor_id: Uuid,
    pub amount: f64,
    pub idempotency_key: String,
}

/// Request to disburse a fully invested loan
#[derive(Debug, Clone)]
pub struct DisburseLoanRequest {
    pub loan_id: Uuid,
    pub employee_id: Uuid,
    pub signed_agreement: DocumentUpload,
    pub disbursement_date: DateTime<Utc>,
    pub idempotency_key: String,
}

/// Result of an accepted investment
#[derive(Debug, Clone, Serialize)]
pub struct InvestmentOutcome {
    pub investment: Investment,
    pub total_invested: f64,
    pub fully_funded: bool,
    pub loan: Loan,
}

/// Funding view of a loan: its investments and how much is still open
#[derive(Debug, Clone, Serialize)]
pub struct LoanFunding {
    pub loan_id: Uuid,
    pub principal_amount: f64,
    pub total_invested: f64,
    pub remaining_amount: f64,
    pub fully_funded: bool,
    pub investments: Vec<Investment>,
}
