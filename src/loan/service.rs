//! Loan service layer - orchestrates the origination workflow
//!
//! Every mutating call runs the same sequence: idempotency check, (for
//! investments) the per-loan lock, loan load, legality check, collaborator
//! writes, idempotency commit. No coordination state is kept in-process, so
//! any number of service instances can share the same stores.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use uuid::Uuid;

use crate::coordination::{
    CoordinationStore, IdempotencyGuard, IdempotencyKey, LoanLock, DEFAULT_IDEMPOTENCY_TTL,
    DEFAULT_LOCK_TTL,
};
use crate::documents::DocumentStore;
use crate::notification::Notifier;

use super::error::LoanError;
use super::funding;
use super::model::{
    ApproveLoanRequest, CreateLoanRequest, DisburseLoanRequest, Disbursement, InvestRequest,
    Investment, InvestmentOutcome, Loan, LoanApproval, LoanFunding, LoanState,
};
use super::repository::{LoanRepository, StoreError};
use super::state_machine::{TransitionCause, TransitionError};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Upper bound on the agreement notice fan-out, kept below the lock TTL
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifetimes of the coordination-store entries the workflow writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowSettings {
    pub idempotency_ttl: Duration,
    pub lock_ttl: Duration,
    pub cache_ttl: Duration,
    pub notify_timeout: Duration,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            idempotency_ttl: DEFAULT_IDEMPOTENCY_TTL,
            lock_ttl: DEFAULT_LOCK_TTL,
            cache_ttl: DEFAULT_CACHE_TTL,
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
        }
    }
}

/// Document path for the agreement letter generated on full funding
pub fn agreement_path(loan_id: Uuid) -> String {
    format!("agreements/{}.pdf", loan_id)
}

pub fn cache_key(loan_id: Uuid) -> String {
    format!("cache:loan:{}", loan_id)
}

/// Loan workflow orchestrator
pub struct LoanService {
    repository: Arc<dyn LoanRepository>,
    coordination: Arc<dyn CoordinationStore>,
    documents: Arc<dyn DocumentStore>,
    notifier: Arc<dyn Notifier>,
    idempotency: IdempotencyGuard,
    lock: LoanLock,
    cache_ttl: Duration,
    notify_timeout: Duration,
}

impl LoanService {
    pub fn new(
        repository: Arc<dyn LoanRepository>,
        coordination: Arc<dyn CoordinationStore>,
        documents: Arc<dyn DocumentStore>,
        notifier: Arc<dyn Notifier>,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            repository,
            idempotency: IdempotencyGuard::new(coordination.clone(), settings.idempotency_ttl),
            lock: LoanLock::new(coordination.clone(), settings.lock_ttl),
            coordination,
            documents,
            notifier,
            cache_ttl: settings.cache_ttl,
            notify_timeout: settings.notify_timeout,
        }
    }

    /// Propose a new loan
    pub async fn create_loan(&self, request: CreateLoanRequest) -> Result<Loan, LoanError> {
        if !request.principal_amount.is_finite() || request.principal_amount <= 0.0 {
            return Err(LoanError::validation("principal amount must be positive"));
        }
        if !request.rate.is_finite() || request.rate < 0.0 {
            return Err(LoanError::validation("rate must not be negative"));
        }
        if !request.roi.is_finite() || request.roi < 0.0 {
            return Err(LoanError::validation("roi must not be negative"));
        }

        let loan = Loan::new(
            request.borrower_id,
            request.principal_amount,
            request.rate,
            request.roi,
        );
        self.repository.create_loan(&loan).await?;

        tracing::info!(
            loan_id = %loan.id,
            borrower_id = %loan.borrower_id,
            principal_amount = loan.principal_amount,
            "Loan proposed"
        );
        Ok(loan)
    }

    /// Move a proposed loan to `approved` after a field visit
    pub async fn approve_loan(&self, request: ApproveLoanRequest) -> Result<Loan, LoanError> {
        let key = IdempotencyKey::approve(request.loan_id, require_token(&request.idempotency_key)?);
        self.ensure_not_duplicate(&key).await?;

        let mut loan = self.repository.get_loan(request.loan_id).await?;
        loan.can_transition_to(LoanState::Approved)?;

        let proof = self
            .documents
            .store(&request.picture_proof.content, &request.picture_proof.filename)
            .await?;

        let previous = loan.state;
        loan.transition_to(LoanState::Approved)?;
        if let Err(e) = self.persist_loan(&loan, previous).await {
            self.discard_document(&proof).await;
            return Err(e);
        }

        let approval = LoanApproval {
            loan_id: loan.id,
            employee_id: request.employee_id,
            picture_proof_url: self.documents.url_for(&proof),
            approval_date: request.approval_date,
            created_at: Utc::now(),
        };
        if let Err(e) = self.repository.create_approval(&approval).await {
            self.discard_document(&proof).await;
            return Err(race_lost(e, previous, LoanState::Approved));
        }

        self.idempotency.commit(&key).await;
        self.refresh_cache(&loan).await;

        tracing::info!(
            loan_id = %loan.id,
            employee_id = %request.employee_id,
            "Loan approved"
        );
        Ok(loan)
    }

    /// Add an investment to an approved loan.
    ///
    /// Runs under the per-loan lock; a second concurrent call on the same loan
    /// fails with [`LoanError::LockContended`] instead of waiting.
    pub async fn invest(&self, request: InvestRequest) -> Result<InvestmentOutcome, LoanError> {
        let token = require_token(&request.idempotency_key)?;

        let guard = self
            .lock
            .acquire(request.loan_id)
            .await?
            .ok_or(LoanError::LockContended(request.loan_id))?;

        let result = self.invest_locked(&request, token).await;
        guard.release().await;
        result
    }

    async fn invest_locked(
        &self,
        request: &InvestRequest,
        token: &str,
    ) -> Result<InvestmentOutcome, LoanError> {
        let key = IdempotencyKey::invest(request.loan_id, request.investor_id, token);
        self.ensure_not_duplicate(&key).await?;

        let mut loan = self.repository.get_loan(request.loan_id).await?;
        if loan.state != LoanState::Approved {
            return Err(TransitionError::new(
                loan.state,
                LoanState::Invested,
                TransitionCause::NotAcceptingInvestments,
            )
            .into());
        }

        let current_total = self.repository.total_invested(loan.id).await?;
        funding::validate_amount(&loan, request.amount, current_total)?;

        let investment = Investment::new(loan.id, request.investor_id, request.amount);
        self.repository.create_investment(&investment).await?;

        let total_invested = self.repository.total_invested(loan.id).await?;
        let fully_funded = funding::is_fully_funded(&loan, total_invested);

        tracing::info!(
            loan_id = %loan.id,
            investor_id = %request.investor_id,
            amount = request.amount,
            total_invested,
            fully_funded,
            "Investment recorded"
        );

        if fully_funded {
            loan = self.complete_funding(loan).await?;
        }

        self.idempotency.commit(&key).await;

        Ok(InvestmentOutcome {
            investment,
            total_invested,
            fully_funded,
            loan,
        })
    }

    /// Transition a fully funded loan to `invested`, attach the agreement
    /// letter and tell every investor about it.
    async fn complete_funding(&self, mut loan: Loan) -> Result<Loan, LoanError> {
        loan.transition_to(LoanState::Invested)?;
        self.persist_loan(&loan, LoanState::Approved).await?;

        let agreement_url = self.documents.url_for(&agreement_path(loan.id));
        loan.agreement_letter_url = Some(agreement_url.clone());
        loan.updated_at = Utc::now();
        self.persist_loan(&loan, LoanState::Invested).await?;
        self.refresh_cache(&loan).await;

        tracing::info!(loan_id = %loan.id, agreement_url = %agreement_url, "Loan fully funded");

        self.notify_investors(loan.id, &agreement_url).await;
        Ok(loan)
    }

    async fn notify_investors(&self, loan_id: Uuid, agreement_url: &str) {
        let investments = match self.repository.get_investments(loan_id).await {
            Ok(investments) => investments,
            Err(e) => {
                tracing::warn!(loan_id = %loan_id, error = %e, "Could not list investors for agreement notice");
                return;
            }
        };

        let mut seen = HashSet::new();
        let recipients: Vec<Uuid> = investments
            .into_iter()
            .map(|investment| investment.investor_id)
            .filter(|investor_id| seen.insert(*investor_id))
            .collect();

        let notices = recipients.into_iter().map(|investor_id| async move {
            let email = match self.repository.investor_email(investor_id).await {
                Ok(email) => email,
                Err(e) => {
                    tracing::warn!(
                        loan_id = %loan_id,
                        investor_id = %investor_id,
                        error = %e,
                        "No contact address for investor"
                    );
                    return;
                }
            };

            if let Err(e) = self
                .notifier
                .send_agreement_notice(&email, agreement_url)
                .await
            {
                tracing::warn!(
                    loan_id = %loan_id,
                    investor_id = %investor_id,
                    error = %e,
                    "Failed to send agreement notice"
                );
            }
        });

        if tokio::time::timeout(self.notify_timeout, join_all(notices))
            .await
            .is_err()
        {
            tracing::warn!(
                loan_id = %loan_id,
                timeout_ms = self.notify_timeout.as_millis() as u64,
                "Agreement notices timed out, abandoning the rest"
            );
        }
    }

    /// Move an invested loan to `disbursed` once the signed agreement is in
    pub async fn disburse_loan(&self, request: DisburseLoanRequest) -> Result<Loan, LoanError> {
        let key =
            IdempotencyKey::disburse(request.loan_id, require_token(&request.idempotency_key)?);
        self.ensure_not_duplicate(&key).await?;

        let mut loan = self.repository.get_loan(request.loan_id).await?;
        loan.can_transition_to(LoanState::Disbursed)?;

        let agreement = self
            .documents
            .store(
                &request.signed_agreement.content,
                &request.signed_agreement.filename,
            )
            .await?;

        let previous = loan.state;
        loan.transition_to(LoanState::Disbursed)?;
        if let Err(e) = self.persist_loan(&loan, previous).await {
            self.discard_document(&agreement).await;
            return Err(e);
        }

        let disbursement = Disbursement {
            loan_id: loan.id,
            employee_id: request.employee_id,
            signed_agreement_url: self.documents.url_for(&agreement),
            disbursement_date: request.disbursement_date,
            created_at: Utc::now(),
        };
        if let Err(e) = self.repository.create_disbursement(&disbursement).await {
            self.discard_document(&agreement).await;
            return Err(race_lost(e, previous, LoanState::Disbursed));
        }

        self.idempotency.commit(&key).await;
        self.refresh_cache(&loan).await;

        tracing::info!(
            loan_id = %loan.id,
            employee_id = %request.employee_id,
            "Loan disbursed"
        );
        Ok(loan)
    }

    pub async fn get_loan(&self, loan_id: Uuid) -> Result<Loan, LoanError> {
        let loan = self.repository.get_loan(loan_id).await?;
        self.refresh_cache(&loan).await;
        Ok(loan)
    }

    pub async fn get_loans_by_state(&self, state: LoanState) -> Result<Vec<Loan>, LoanError> {
        Ok(self.repository.get_loans_by_state(state).await?)
    }

    /// Investments on a loan together with how much of the principal is still open
    pub async fn get_loan_investments(&self, loan_id: Uuid) -> Result<LoanFunding, LoanError> {
        let loan = self.repository.get_loan(loan_id).await?;
        let investments = self.repository.get_investments(loan_id).await?;
        let total_invested = self.repository.total_invested(loan_id).await?;

        Ok(LoanFunding {
            loan_id,
            principal_amount: loan.principal_amount,
            total_invested,
            remaining_amount: funding::remaining(&loan, total_invested),
            fully_funded: funding::is_fully_funded(&loan, total_invested),
            investments,
        })
    }

    pub async fn get_approval(&self, loan_id: Uuid) -> Result<LoanApproval, LoanError> {
        Ok(self.repository.get_approval(loan_id).await?)
    }

    pub async fn get_disbursement(&self, loan_id: Uuid) -> Result<Disbursement, LoanError> {
        Ok(self.repository.get_disbursement(loan_id).await?)
    }

    async fn ensure_not_duplicate(&self, key: &IdempotencyKey) -> Result<(), LoanError> {
        if self.idempotency.check(key).await? {
            tracing::debug!(key = %key, "Duplicate request rejected");
            return Err(LoanError::DuplicateRequest);
        }
        Ok(())
    }

    /// Conditional write; a row that left `expected` means another request won the race.
    async fn persist_loan(&self, loan: &Loan, expected: LoanState) -> Result<(), LoanError> {
        self.repository
            .update_loan(loan, expected)
            .await
            .map_err(|e| race_lost(e, expected, loan.state))
    }

    async fn discard_document(&self, path_token: &str) {
        if let Err(e) = self.documents.delete(path_token).await {
            tracing::warn!(path = %path_token, error = %e, "Failed to remove orphaned document");
        }
    }

    async fn refresh_cache(&self, loan: &Loan) {
        let payload = match serde_json::to_string(loan) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(loan_id = %loan.id, error = %e, "Failed to serialize loan for cache");
                return;
            }
        };

        if let Err(e) = self
            .coordination
            .set_cache(&cache_key(loan.id), &payload, self.cache_ttl)
            .await
        {
            tracing::warn!(loan_id = %loan.id, error = %e, "Failed to refresh loan cache");
        }
    }
}

/// A conflicting write during `from -> to` means another request got there first
fn race_lost(err: StoreError, from: LoanState, to: LoanState) -> LoanError {
    match err {
        StoreError::Conflict(_) => {
            TransitionError::new(from, to, TransitionCause::ConcurrentUpdate).into()
        }
        other => other.into(),
    }
}

fn require_token(token: &str) -> Result<&str, LoanError> {
    if token.trim().is_empty() {
        return Err(LoanError::validation("idempotency key must not be empty"));
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{
        InMemoryCoordinationStore, InMemoryDocumentStore, InMemoryLoanRepository,
        RecordingNotifier,
    };

    struct Harness {
        service: LoanService,
        repository: Arc<InMemoryLoanRepository>,
        coordination: Arc<InMemoryCoordinationStore>,
    }

    fn harness() -> Harness {
        let repository = Arc::new(InMemoryLoanRepository::new());
        let coordination = Arc::new(InMemoryCoordinationStore::new());
        let service = LoanService::new(
            repository.clone(),
            coordination.clone(),
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(RecordingNotifier::new()),
            WorkflowSettings::default(),
        );
        Harness {
            service,
            repository,
            coordination,
        }
    }

    fn create_request(principal: f64) -> CreateLoanRequest {
        CreateLoanRequest {
            borrower_id: Uuid::new_v4(),
            principal_amount: principal,
            rate: 5.0,
            roi: 3.0,
        }
    }

    #[test]
    fn test_require_token() {
        assert!(require_token("abc").is_ok());
        assert!(matches!(
            require_token("   "),
            Err(LoanError::ValidationFailed(_))
        ));
        assert!(matches!(require_token(""), Err(LoanError::ValidationFailed(_))));
    }

    #[tokio::test]
    async fn test_create_loan_validates_terms() {
        let h = harness();

        for (principal, rate, roi) in [(0.0, 5.0, 3.0), (-1.0, 5.0, 3.0), (100.0, -0.1, 3.0), (100.0, 5.0, f64::NAN)] {
            let err = h
                .service
                .create_loan(CreateLoanRequest {
                    borrower_id: Uuid::new_v4(),
                    principal_amount: principal,
                    rate,
                    roi,
                })
                .await
                .unwrap_err();
            assert!(matches!(err, LoanError::ValidationFailed(_)));
        }

        let loan = h.service.create_loan(create_request(500.0)).await.unwrap();
        assert_eq!(loan.state, LoanState::Proposed);
        assert_eq!(h.repository.get_loan(loan.id).await.unwrap(), loan);
    }

    #[tokio::test]
    async fn test_get_loan_warms_cache() {
        let h = harness();
        let loan = h.service.create_loan(create_request(500.0)).await.unwrap();

        assert!(h.coordination.raw_value(&cache_key(loan.id)).await.is_none());
        h.service.get_loan(loan.id).await.unwrap();

        let cached = h.coordination.raw_value(&cache_key(loan.id)).await.unwrap();
        let cached: Loan = serde_json::from_str(&cached).unwrap();
        assert_eq!(cached, loan);
    }

    #[tokio::test]
    async fn test_invest_rejects_empty_token_without_locking() {
        let h = harness();
        let loan = h.service.create_loan(create_request(500.0)).await.unwrap();

        let err = h
            .service
            .invest(InvestRequest {
                loan_id: loan.id,
                investor_id: Uuid::new_v4(),
                amount: 10.0,
                idempotency_key: " ".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, LoanError::ValidationFailed(_)));
        assert!(!h.coordination.exists(&LoanLock::key(loan.id)).await.unwrap());
    }

    #[tokio::test]
    async fn test_invest_on_proposed_loan_is_refused() {
        let h = harness();
        let loan = h.service.create_loan(create_request(500.0)).await.unwrap();

        let err = h
            .service
            .invest(InvestRequest {
                loan_id: loan.id,
                investor_id: Uuid::new_v4(),
                amount: 10.0,
                idempotency_key: "t1".to_string(),
            })
            .await
            .unwrap_err();

        match err {
            LoanError::InvalidTransition(e) => {
                assert_eq!(e.from, LoanState::Proposed);
                assert_eq!(e.to, LoanState::Invested);
                assert_eq!(e.cause, TransitionCause::NotAcceptingInvestments);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!h.coordination.exists(&LoanLock::key(loan.id)).await.unwrap());
    }

    #[tokio::test]
    async fn test_held_lock_surfaces_contention() {
        let h = harness();
        let loan = h.service.create_loan(create_request(500.0)).await.unwrap();
        h.coordination
            .set_if_absent(&LoanLock::key(loan.id), "1", Duration::from_secs(30))
            .await
            .unwrap();

        let err = h
            .service
            .invest(InvestRequest {
                loan_id: loan.id,
                investor_id: Uuid::new_v4(),
                amount: 10.0,
                idempotency_key: "t1".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LoanError::LockContended(id) if id == loan.id));
    }
}
