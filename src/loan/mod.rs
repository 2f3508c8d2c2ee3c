//! Loan domain module
//!
//! Contains the loan models, the lifecycle state machine, funding rules, the
//! entity store seam and the workflow service.

mod error;
pub mod funding;
mod model;
mod postgres;
mod repository;
mod service;
pub mod state_machine;

pub use error::LoanError;
pub use model::*;
pub use postgres::PgLoanRepository;
pub use repository::{LoanRepository, StoreError};
pub use service::{
    agreement_path, cache_key, LoanService, WorkflowSettings, DEFAULT_CACHE_TTL,
    DEFAULT_NOTIFY_TIMEOUT,
};
pub use state_machine::{can_transition, TransitionCause, TransitionError};
