//! Named all-or-nothing workflows built on [`LedgerStore::run_in_transaction`].
//!
//! Workflows hold no state. Each run ends in exactly one of two states,
//! logged as a [`WorkflowOutcome`].
//!
//! [`LedgerStore::run_in_transaction`]: crate::store::LedgerStore::run_in_transaction

pub mod create_user;
pub mod transfer;

pub use create_user::{create_user_with_verification, execute_user_creation};
pub use transfer::{apply_ordered_adjustments, execute_money_transfer};

use housebank_core::LedgerResult;
use tracing::{info, warn};

/// Terminal state of one workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowOutcome {
    Committed,
    RolledBack,
}

impl WorkflowOutcome {
    pub fn of<T>(result: &LedgerResult<T>) -> Self {
        match result {
            Ok(_) => WorkflowOutcome::Committed,
            Err(_) => WorkflowOutcome::RolledBack,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowOutcome::Committed => "committed",
            WorkflowOutcome::RolledBack => "rolled_back",
        }
    }
}

pub(crate) fn record_outcome<T>(workflow: &'static str, result: &LedgerResult<T>) {
    let outcome = WorkflowOutcome::of(result);
    match result {
        Ok(_) => info!(workflow, outcome = outcome.as_str(), "workflow finished"),
        Err(err) => warn!(
            workflow,
            outcome = outcome.as_str(),
            category = ?err.category(),
            retryable = err.is_retryable(),
            error = %err,
            "workflow finished"
        ),
    }
}
