//! HTTP request and response bodies

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::loan::CreateLoanRequest;

/// Standard API response
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// `POST /loans` body
#[derive(Debug, Deserialize, Validate)]
pub struct CreateLoanBody {
    pub borrower_id: Uuid,
    #[validate(range(min = 0.0))]
    pub principal_amount: f64,
    #[validate(range(min = 0.0))]
    pub rate: f64,
    #[validate(range(min = 0.0))]
    pub roi: f64,
}

impl From<CreateLoanBody> for CreateLoanRequest {
    fn from(body: CreateLoanBody) -> Self {
        CreateLoanRequest {
            borrower_id: body.borrower_id,
            principal_amount: body.principal_amount,
            rate: body.rate,
            roi: body.roi,
        }
    }
}

/// `POST /loans/:id/invest` body
#[derive(Debug, Deserialize, Validate)]
pub struct InvestBody {
    pub amount: f64,
    /// Falls back to the `Idempotency-Key` header when absent
    #[validate(length(min = 1, max = 255))]
    pub idempotency_key: Option<String>,
}

/// `GET /loans` query
#[derive(Debug, Deserialize)]
pub struct LoanStateQuery {
    pub state: Option<String>,
}
