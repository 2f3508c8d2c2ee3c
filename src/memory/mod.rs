//! In-memory collaborators
//!
//! HashMap-backed implementations of the entity store, coordination store,
//! document store and notifier, with switches for injecting collaborator
//! failures. The test suite wires the service to these.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::coordination::{CoordinationError, CoordinationStore};
use crate::documents::{sanitize_filename, DocumentError, DocumentStore};
use crate::loan::{
    Disbursement, Investment, Loan, LoanApproval, LoanRepository, LoanState, StoreError,
};
use crate::notification::{Notifier, NotifyError};

// ===== Entity store =====

#[derive(Default)]
struct Tables {
    loans: HashMap<Uuid, Loan>,
    approvals: HashMap<Uuid, LoanApproval>,
    investments: Vec<Investment>,
    disbursements: HashMap<Uuid, Disbursement>,
    investors: HashMap<Uuid, String>,
    loan_updates: usize,
}

#[derive(Default)]
pub struct InMemoryLoanRepository {
    tables: RwLock<Tables>,
    fail_loan_updates: AtomicBool,
}

impl InMemoryLoanRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_investor(&self, investor_id: Uuid, email: impl Into<String>) {
        self.tables
            .write()
            .await
            .investors
            .insert(investor_id, email.into());
    }

    /// Make every `update_loan` call fail as if the database were down
    pub fn fail_loan_updates(&self, fail: bool) {
        self.fail_loan_updates.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `update_loan` calls so far
    pub async fn loan_update_count(&self) -> usize {
        self.tables.read().await.loan_updates
    }

    pub async fn approval_count(&self) -> usize {
        self.tables.read().await.approvals.len()
    }

    pub async fn investment_count(&self, loan_id: Uuid) -> usize {
        self.tables
            .read()
            .await
            .investments
            .iter()
            .filter(|i| i.loan_id == loan_id)
            .count()
    }
}

#[async_trait]
impl LoanRepository for InMemoryLoanRepository {
    async fn create_loan(&self, loan: &Loan) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.loans.contains_key(&loan.id) {
            return Err(StoreError::Conflict(format!("loan {} already exists", loan.id)));
        }
        tables.loans.insert(loan.id, loan.clone());
        Ok(())
    }

    async fn get_loan(&self, id: Uuid) -> Result<Loan, StoreError> {
        self.tables
            .read()
            .await
            .loans
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("loan {}", id)))
    }

    async fn get_loans_by_state(&self, state: LoanState) -> Result<Vec<Loan>, StoreError> {
        let tables = self.tables.read().await;
        let mut loans: Vec<Loan> = tables
            .loans
            .values()
            .filter(|loan| loan.state == state)
            .cloned()
            .collect();
        loans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(loans)
    }

    async fn update_loan(&self, loan: &Loan, expected_state: LoanState) -> Result<(), StoreError> {
        if self.fail_loan_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("loan updates disabled".to_string()));
        }

        let mut tables = self.tables.write().await;
        let stored = tables
            .loans
            .get_mut(&loan.id)
            .ok_or_else(|| StoreError::NotFound(format!("loan {}", loan.id)))?;

        if stored.state != expected_state {
            return Err(StoreError::Conflict(format!(
                "loan {} is no longer {}",
                loan.id, expected_state
            )));
        }

        stored.agreement_letter_url = loan.agreement_letter_url.clone();
        stored.state = loan.state;
        stored.updated_at = loan.updated_at;
        tables.loan_updates += 1;
        Ok(())
    }

    async fn create_approval(&self, approval: &LoanApproval) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.approvals.contains_key(&approval.loan_id) {
            return Err(StoreError::Conflict(format!(
                "approval for loan {} already exists",
                approval.loan_id
            )));
        }
        tables.approvals.insert(approval.loan_id, approval.clone());
        Ok(())
    }

    async fn get_approval(&self, loan_id: Uuid) -> Result<LoanApproval, StoreError> {
        self.tables
            .read()
            .await
            .approvals
            .get(&loan_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("approval for loan {}", loan_id)))
    }

    async fn create_investment(&self, investment: &Investment) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .investments
            .push(investment.clone());
        Ok(())
    }

    async fn get_investments(&self, loan_id: Uuid) -> Result<Vec<Investment>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .investments
            .iter()
            .filter(|i| i.loan_id == loan_id)
            .cloned()
            .collect())
    }

    async fn total_invested(&self, loan_id: Uuid) -> Result<f64, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .investments
            .iter()
            .filter(|i| i.loan_id == loan_id)
            .map(|i| i.amount)
            .sum())
    }

    async fn create_disbursement(&self, disbursement: &Disbursement) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.disbursements.contains_key(&disbursement.loan_id) {
            return Err(StoreError::Conflict(format!(
                "disbursement for loan {} already exists",
                disbursement.loan_id
            )));
        }
        tables
            .disbursements
            .insert(disbursement.loan_id, disbursement.clone());
        Ok(())
    }

    async fn get_disbursement(&self, loan_id: Uuid) -> Result<Disbursement, StoreError> {
        self.tables
            .read()
            .await
            .disbursements
            .get(&loan_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("disbursement for loan {}", loan_id)))
    }

    async fn investor_email(&self, investor_id: Uuid) -> Result<String, StoreError> {
        self.tables
            .read()
            .await
            .investors
            .get(&investor_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("investor {}", investor_id)))
    }
}

// ===== Coordination store =====

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// TTL-aware key-value store; expired entries are dropped lazily on access
#[derive(Default)]
pub struct InMemoryCoordinationStore {
    entries: Mutex<HashMap<String, Entry>>,
    fail_commands: AtomicBool,
    fail_writes: AtomicBool,
}

impl InMemoryCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every command fail as if the store were unreachable
    pub fn fail_commands(&self, fail: bool) {
        self.fail_commands.store(fail, Ordering::SeqCst);
    }

    /// Fail writes and deletes only; `exists` and `get_cache` keep working
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_available(&self, write: bool) -> Result<(), CoordinationError> {
        if self.fail_commands.load(Ordering::SeqCst) {
            return Err(CoordinationError::ConnectionError(
                "in-memory store switched off".to_string(),
            ));
        }
        if write && self.fail_writes.load(Ordering::SeqCst) {
            return Err(CoordinationError::CommandError(
                "in-memory store rejecting writes".to_string(),
            ));
        }
        Ok(())
    }

    /// Live value stored under `key`, for assertions
    pub async fn raw_value(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|e| !e.is_expired())
            .map(|e| e.value.clone())
    }
}

#[async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CoordinationError> {
        self.check_available(true)?;
        let mut entries = self.entries.lock().await;
        if entries.get(key).is_some_and(|e| !e.is_expired()) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(true)
    }

    async fn exists(&self, key: &str) -> Result<bool, CoordinationError> {
        self.check_available(false)?;
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                Ok(false)
            }
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), CoordinationError> {
        self.check_available(true)?;
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn set_cache(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CoordinationError> {
        self.check_available(true)?;
        self.entries.lock().await.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get_cache(&self, key: &str) -> Result<Option<String>, CoordinationError> {
        self.check_available(false)?;
        Ok(self.raw_value(key).await)
    }

    async fn ping(&self) -> Result<(), CoordinationError> {
        self.check_available(false)
    }
}

// ===== Document store =====

pub struct InMemoryDocumentStore {
    documents: Mutex<HashMap<String, Vec<u8>>>,
    next_id: AtomicU64,
    fail_writes: AtomicBool,
}

impl InMemoryDocumentStore {
    pub const BASE_URL: &'static str = "memory://documents";

    pub fn new() -> Self {
        Self {
            documents: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.documents.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, path_token: &str) -> bool {
        self.documents.lock().await.contains_key(path_token)
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn store(&self, content: &[u8], filename: &str) -> Result<String, DocumentError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DocumentError::WriteError("document writes disabled".to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let token = format!("{}_{}", id, sanitize_filename(filename));
        self.documents
            .lock()
            .await
            .insert(token.clone(), content.to_vec());
        Ok(token)
    }

    fn url_for(&self, path_token: &str) -> String {
        format!("{}/{}", Self::BASE_URL, path_token)
    }

    async fn delete(&self, path_token: &str) -> Result<(), DocumentError> {
        self.documents
            .lock()
            .await
            .remove(path_token)
            .map(|_| ())
            .ok_or_else(|| DocumentError::DeleteError(format!("{} not found", path_token)))
    }
}

// ===== Notifier =====

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotice {
    pub recipient: String,
    pub document_url: String,
}

/// Records every delivery attempt; recipients marked failing get an error back
#[derive(Default)]
pub struct RecordingNotifier {
    attempts: Mutex<Vec<SentNotice>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_for(&self, recipient: impl Into<String>) {
        self.failing.lock().await.insert(recipient.into());
    }

    pub async fn attempts(&self) -> Vec<SentNotice> {
        self.attempts.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_agreement_notice(
        &self,
        recipient: &str,
        document_url: &str,
    ) -> Result<(), NotifyError> {
        self.attempts.lock().await.push(SentNotice {
            recipient: recipient.to_string(),
            document_url: document_url.to_string(),
        });

        if self.failing.lock().await.contains(recipient) {
            return Err(NotifyError::Rejected(503));
        }
        Ok(())
    }
}
