//! PostgreSQL entity store tests

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use sqlx::PgPool;
    use uuid::Uuid;

    use loanflow_server::loan::{
        Investment, Loan, LoanApproval, LoanRepository, LoanState, PgLoanRepository, StoreError,
    };

    /// Helper to create a migrated test database pool
    async fn setup_test_db() -> PgPool {
        let database_url = std::env::var("TEST_DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/loanflow_test".to_string());

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(2)
            .connect(&database_url)
            .await
            .expect("Failed to connect to test database");

        loanflow_server::db::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_loan_round_trip_and_conditional_update() {
        let repo = PgLoanRepository::new(setup_test_db().await);
        let mut loan = Loan::new(Uuid::new_v4(), 10_000.0, 5.0, 3.0);
        repo.create_loan(&loan).await.unwrap();

        let stored = repo.get_loan(loan.id).await.unwrap();
        assert_eq!(stored.state, LoanState::Proposed);
        assert_eq!(stored.principal_amount, 10_000.0);

        loan.transition_to(LoanState::Approved).unwrap();
        repo.update_loan(&loan, LoanState::Proposed).await.unwrap();

        let err = repo
            .update_loan(&loan, LoanState::Proposed)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let approved = repo.get_loans_by_state(LoanState::Approved).await.unwrap();
        assert!(approved.iter().any(|l| l.id == loan.id));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_missing_rows_are_not_found() {
        let repo = PgLoanRepository::new(setup_test_db().await);
        let missing = Loan::new(Uuid::new_v4(), 1.0, 0.0, 0.0);

        assert!(matches!(
            repo.get_loan(missing.id).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            repo.update_loan(&missing, LoanState::Proposed).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            repo.investor_email(Uuid::new_v4()).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_second_approval_conflicts() {
        let repo = PgLoanRepository::new(setup_test_db().await);
        let loan = Loan::new(Uuid::new_v4(), 1_000.0, 5.0, 3.0);
        repo.create_loan(&loan).await.unwrap();

        let approval = LoanApproval {
            loan_id: loan.id,
            employee_id: Uuid::new_v4(),
            picture_proof_url: "http://files/visit.jpg".to_string(),
            approval_date: Utc::now(),
            created_at: Utc::now(),
        };
        repo.create_approval(&approval).await.unwrap();

        let err = repo.create_approval(&approval).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(repo.get_approval(loan.id).await.unwrap().loan_id, loan.id);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_investment_totals() {
        let repo = PgLoanRepository::new(setup_test_db().await);
        let loan = Loan::new(Uuid::new_v4(), 1_000.0, 5.0, 3.0);
        repo.create_loan(&loan).await.unwrap();

        assert_eq!(repo.total_invested(loan.id).await.unwrap(), 0.0);

        let first = Investment::new(loan.id, Uuid::new_v4(), 250.0);
        let second = Investment::new(loan.id, Uuid::new_v4(), 150.0);
        repo.create_investment(&first).await.unwrap();
        repo.create_investment(&second).await.unwrap();

        assert_eq!(repo.total_invested(loan.id).await.unwrap(), 400.0);
        let ids: Vec<Uuid> = repo
            .get_investments(loan.id)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }
}
