//! Investment aggregation: how much of a principal is still open and when a
//! loan counts as fully funded.
//!
//! Totals handed to these functions must come straight from persisted
//! investment rows, never from an in-process running counter.

use super::error::LoanError;
use super::model::Loan;

/// Tolerance, in currency units, for float accumulation in stored sums
pub const FUNDING_EPSILON: f64 = 0.01;

/// Reject non-positive amounts and anything that would push the total past the principal.
pub fn validate_amount(loan: &Loan, amount: f64, current_total: f64) -> Result<(), LoanError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(LoanError::validation("investment amount must be positive"));
    }

    let would_be_total = current_total + amount;
    if would_be_total > loan.principal_amount {
        return Err(LoanError::validation(format!(
            "total investment ({:.2}) would exceed principal ({:.2})",
            would_be_total, loan.principal_amount
        )));
    }

    Ok(())
}

pub fn is_fully_funded(loan: &Loan, total_invested: f64) -> bool {
    total_invested >= loan.principal_amount - FUNDING_EPSILON
}

/// Unfunded part of the principal, never negative
pub fn remaining(loan: &Loan, total_invested: f64) -> f64 {
    (loan.principal_amount - total_invested).max(0.0)
}
