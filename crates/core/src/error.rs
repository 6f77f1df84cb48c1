//! Ledger error model.

use thiserror::Error;

/// Result type used across the ledger core.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Outward-facing failure category.
///
/// Adapters map these onto their own responses (404, 409, 500, ...). Every
/// [`LedgerError`] collapses onto exactly one category.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// A referenced account/user/session/entry/transfer is absent.
    NotFound,
    /// A constraint violation such as a duplicate username.
    Conflict,
    /// A debit would drive a balance below zero.
    InsufficientFunds,
    /// Malformed input (e.g. a non-positive transfer amount).
    Validation,
    /// Connection, timeout, lock-wait or deadlock failures.
    Infrastructure,
    /// An injected side-effect callback failed.
    SideEffectFailure,
}

/// Ledger-level error.
///
/// Store backends translate their native failures into this enum; workflows
/// propagate it unchanged so the category survives the core boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A requested row was not found.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// A uniqueness or referential constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A balance adjustment would make the account balance negative.
    #[error("insufficient funds on account {account_id} for delta {delta}")]
    InsufficientFunds { account_id: i64, delta: i64 },

    /// A value failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Connection loss, pool exhaustion, statement timeout and similar.
    #[error("infrastructure failure in {operation}: {message}")]
    Infrastructure { operation: String, message: String },

    /// A row lock could not be acquired before the lock timeout elapsed.
    #[error("lock wait timeout: {0}")]
    LockTimeout(String),

    /// The storage engine detected a circular lock wait.
    #[error("deadlock detected: {0}")]
    Deadlock(String),

    /// A caller-supplied side effect failed inside the transaction.
    #[error("side effect failed: {0}")]
    SideEffect(String),

    /// The unit of work failed and the rollback failed too.
    #[error("tx error: {error}, rb error: {rollback}")]
    RollbackFailed {
        error: Box<LedgerError>,
        rollback: Box<LedgerError>,
    },
}

impl LedgerError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn infrastructure(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::Infrastructure {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn side_effect(msg: impl ToString) -> Self {
        Self::SideEffect(msg.to_string())
    }

    /// Combine a unit-of-work failure with the rollback failure that followed it.
    pub fn rollback_failed(error: LedgerError, rollback: LedgerError) -> Self {
        Self::RollbackFailed {
            error: Box::new(error),
            rollback: Box::new(rollback),
        }
    }

    /// Re-tag an error produced by a side-effect callback.
    ///
    /// Errors that are already `SideEffect` pass through untouched.
    pub fn into_side_effect(self) -> Self {
        match self {
            Self::SideEffect(_) => self,
            other => Self::SideEffect(other.to_string()),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Conflict(_) => ErrorCategory::Conflict,
            Self::InsufficientFunds { .. } => ErrorCategory::InsufficientFunds,
            Self::Validation(_) => ErrorCategory::Validation,
            Self::Infrastructure { .. } | Self::LockTimeout(_) | Self::Deadlock(_) => {
                ErrorCategory::Infrastructure
            }
            Self::SideEffect(_) => ErrorCategory::SideEffectFailure,
            Self::RollbackFailed { error, .. } => error.category(),
        }
    }

    /// Whether the whole workflow may be re-run.
    ///
    /// Only infrastructure failures qualify: the rollback guarantees that no
    /// partial state survived the failed attempt. Workflows with external
    /// side effects are the exception and must not be blindly retried.
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Infrastructure
    }

    pub fn is_not_found(&self) -> bool {
        self.category() == ErrorCategory::NotFound
    }
}
