//! Loan lifecycle transition table
//!
//! Every state change in the workflow goes through [`can_transition`]; nothing
//! else decides whether a loan may move from one state to another.

use std::fmt;

use chrono::Utc;
use thiserror::Error;

use super::model::{Loan, LoanState};

const TRANSITIONS: &[(LoanState, &[LoanState])] = &[
    (LoanState::Proposed, &[LoanState::Approved]),
    (LoanState::Approved, &[LoanState::Invested]),
    (LoanState::Invested, &[LoanState::Disbursed]),
    (LoanState::Disbursed, &[]),
];

/// Why a transition was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionCause {
    UnknownState,
    NotAllowed,
    /// Investments are only accepted while the loan is `approved`
    NotAcceptingInvestments,
    /// Another request moved the loan first
    ConcurrentUpdate,
}

impl fmt::Display for TransitionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cause = match self {
            TransitionCause::UnknownState => "unknown current state",
            TransitionCause::NotAllowed => "transition not allowed",
            TransitionCause::NotAcceptingInvestments => "loan is not accepting investments",
            TransitionCause::ConcurrentUpdate => "concurrent transition",
        };
        f.write_str(cause)
    }
}

/// Refused state transition
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid transition {from} -> {to}: {cause}")]
pub struct TransitionError {
    pub from: LoanState,
    pub to: LoanState,
    pub cause: TransitionCause,
}

impl TransitionError {
    pub fn new(from: LoanState, to: LoanState, cause: TransitionCause) -> Self {
        Self { from, to, cause }
    }
}

/// States reachable from `state` in one step, `None` if the state has no table entry
pub fn allowed_targets(state: LoanState) -> Option<&'static [LoanState]> {
    TRANSITIONS
        .iter()
        .find(|(from, _)| *from == state)
        .map(|(_, targets)| *targets)
}

pub fn can_transition(current: LoanState, target: LoanState) -> Result<(), TransitionError> {
    let allowed = allowed_targets(current)
        .ok_or_else(|| TransitionError::new(current, target, TransitionCause::UnknownState))?;

    if allowed.contains(&target) {
        Ok(())
    } else {
        Err(TransitionError::new(
            current,
            target,
            TransitionCause::NotAllowed,
        ))
    }
}

impl Loan {
    pub fn can_transition_to(&self, target: LoanState) -> Result<(), TransitionError> {
        can_transition(self.state, target)
    }

    /// Move the loan to `target`, touching `updated_at`. Leaves the loan unchanged on error.
    pub fn transition_to(&mut self, target: LoanState) -> Result<(), TransitionError> {
        self.can_transition_to(target)?;
        self.state = target;
        self.updated_at = Utc::now();
        Ok(())
    }
}
