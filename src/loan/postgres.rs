//! PostgreSQL-backed [`LoanRepository`]

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::model::{Disbursement, Investment, Loan, LoanApproval, LoanState};
use super::repository::{LoanRepository, StoreError};

#[derive(Clone)]
pub struct PgLoanRepository {
    db_pool: PgPool,
}

impl PgLoanRepository {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

fn not_found(what: &str, id: Uuid) -> impl FnOnce(StoreError) -> StoreError + '_ {
    move |err| match err {
        StoreError::NotFound(_) => StoreError::NotFound(format!("{} {}", what, id)),
        other => other,
    }
}

#[async_trait]
impl LoanRepository for PgLoanRepository {
    async fn create_loan(&self, loan: &Loan) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO loans (
                id, borrower_id, principal_amount, rate, roi,
                agreement_letter_url, state, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(loan.id)
        .bind(loan.borrower_id)
        .bind(loan.principal_amount)
        .bind(loan.rate)
        .bind(loan.roi)
        .bind(&loan.agreement_letter_url)
        .bind(loan.state)
        .bind(loan.created_at)
        .bind(loan.updated_at)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn get_loan(&self, id: Uuid) -> Result<Loan, StoreError> {
        sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_one(&self.db_pool)
            .await
            .map_err(StoreError::from)
            .map_err(not_found("loan", id))
    }

    async fn get_loans_by_state(&self, state: LoanState) -> Result<Vec<Loan>, StoreError> {
        let loans = sqlx::query_as::<_, Loan>(
            "SELECT * FROM loans WHERE state = $1 ORDER BY created_at DESC",
        )
        .bind(state)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(loans)
    }

    async fn update_loan(&self, loan: &Loan, expected_state: LoanState) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE loans
            SET agreement_letter_url = $2, state = $3, updated_at = $4
            WHERE id = $1 AND state = $5
            "#,
        )
        .bind(loan.id)
        .bind(&loan.agreement_letter_url)
        .bind(loan.state)
        .bind(loan.updated_at)
        .bind(expected_state)
        .execute(&self.db_pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM loans WHERE id = $1)")
            .bind(loan.id)
            .fetch_one(&self.db_pool)
            .await?;

        if exists {
            Err(StoreError::Conflict(format!(
                "loan {} is no longer {}",
                loan.id, expected_state
            )))
        } else {
            Err(StoreError::NotFound(format!("loan {}", loan.id)))
        }
    }

    async fn create_approval(&self, approval: &LoanApproval) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO loan_approvals (
                loan_id, employee_id, picture_proof_url, approval_date, created_at
            )
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(approval.loan_id)
        .bind(approval.employee_id)
        .bind(&approval.picture_proof_url)
        .bind(approval.approval_date)
        .bind(approval.created_at)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn get_approval(&self, loan_id: Uuid) -> Result<LoanApproval, StoreError> {
        sqlx::query_as::<_, LoanApproval>("SELECT * FROM loan_approvals WHERE loan_id = $1")
            .bind(loan_id)
            .fetch_one(&self.db_pool)
            .await
            .map_err(StoreError::from)
            .map_err(not_found("approval for loan", loan_id))
    }

    async fn create_investment(&self, investment: &Investment) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO investments (id, loan_id, investor_id, amount, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(investment.id)
        .bind(investment.loan_id)
        .bind(investment.investor_id)
        .bind(investment.amount)
        .bind(investment.created_at)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn get_investments(&self, loan_id: Uuid) -> Result<Vec<Investment>, StoreError> {
        let investments = sqlx::query_as::<_, Investment>(
            "SELECT * FROM investments WHERE loan_id = $1 ORDER BY created_at ASC",
        )
        .bind(loan_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(investments)
    }

    async fn total_invested(&self, loan_id: Uuid) -> Result<f64, StoreError> {
        let total: f64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0)::DOUBLE PRECISION FROM investments WHERE loan_id = $1",
        )
        .bind(loan_id)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(total)
    }

    async fn create_disbursement(&self, disbursement: &Disbursement) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO loan_disbursements (
                loan_id, employee_id, signed_agreement_url, disbursement_date, created_at
            )
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(disbursement.loan_id)
        .bind(disbursement.employee_id)
        .bind(&disbursement.signed_agreement_url)
        .bind(disbursement.disbursement_date)
        .bind(disbursement.created_at)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn get_disbursement(&self, loan_id: Uuid) -> Result<Disbursement, StoreError> {
        sqlx::query_as::<_, Disbursement>(
            "SELECT * FROM loan_disbursements WHERE loan_id = $1",
        )
        .bind(loan_id)
        .fetch_one(&self.db_pool)
        .await
        .map_err(StoreError::from)
        .map_err(not_found("disbursement for loan", loan_id))
    }

    async fn investor_email(&self, investor_id: Uuid) -> Result<String, StoreError> {
        sqlx::query_scalar::<_, String>("SELECT email FROM investors WHERE id = $1")
            .bind(investor_id)
            .fetch_one(&self.db_pool)
            .await
            .map_err(StoreError::from)
            .map_err(not_found("investor", investor_id))
    }
}
