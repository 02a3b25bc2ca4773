//! Ledger Error Types
//!
//! One taxonomy shared by the repository, the transaction coordinator and the
//! transfer orchestrator. Repository errors pass through the coordinator
//! unchanged; the coordinator only adds the begin/commit/rollback variants.

use thiserror::Error;

/// PostgreSQL SQLSTATE codes we classify explicitly
mod sqlstate {
    pub const LOCK_NOT_AVAILABLE: &str = "55P03";
    pub const DEADLOCK_DETECTED: &str = "40P01";
    pub const SERIALIZATION_FAILURE: &str = "40001";
    /// Referenced row is missing
    pub const FOREIGN_KEY_VIOLATION: &str = "23503";
    /// Class 23: integrity constraint violation
    pub const INTEGRITY_CLASS: &str = "23";
}

/// Ledger error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    // === Caller Errors ===
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Insufficient funds in account {account_id}: balance {balance}, requested {amount}")]
    InsufficientFunds {
        account_id: i64,
        balance: i64,
        amount: i64,
    },

    // === Retryable Errors ===
    #[error("Lock timeout: {0}")]
    LockTimeout(String),

    #[error("Failed to start transaction: {0}")]
    TransactionStartFailed(String),

    #[error("Failed to commit transaction: {0}")]
    CommitFailed(String),

    // === Integrity Alarm ===
    #[error("Rollback failed: {rollback} (original error: {source})")]
    RollbackFailed {
        source: Box<LedgerError>,
        rollback: String,
    },

    // === System Errors ===
    #[error("Database error: {0}")]
    Database(String),
}

impl LedgerError {
    /// Stable error code for callers and logs
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::NotFound(_) => "NOT_FOUND",
            LedgerError::ConstraintViolation(_) => "CONSTRAINT_VIOLATION",
            LedgerError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            LedgerError::LockTimeout(_) => "LOCK_TIMEOUT",
            LedgerError::TransactionStartFailed(_) => "TRANSACTION_START_FAILED",
            LedgerError::CommitFailed(_) => "COMMIT_FAILED",
            LedgerError::RollbackFailed { .. } => "ROLLBACK_FAILED",
            LedgerError::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Whether the caller may re-invoke the whole operation with identical
    /// arguments. Safe because nothing from a failed attempt is ever committed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::LockTimeout(_)
                | LedgerError::TransactionStartFailed(_)
                | LedgerError::CommitFailed(_)
        )
    }

    /// Shorthand for a missing account
    pub fn account_not_found(id: i64) -> Self {
        LedgerError::NotFound(format!("account {}", id))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => LedgerError::NotFound("no rows returned".to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code();
                match code.as_deref() {
                    Some(sqlstate::LOCK_NOT_AVAILABLE)
                    | Some(sqlstate::DEADLOCK_DETECTED)
                    | Some(sqlstate::SERIALIZATION_FAILURE) => {
                        LedgerError::LockTimeout(db_err.message().to_string())
                    }
                    Some(sqlstate::FOREIGN_KEY_VIOLATION) => {
                        LedgerError::NotFound(db_err.message().to_string())
                    }
                    Some(c) if c.starts_with(sqlstate::INTEGRITY_CLASS) => {
                        LedgerError::ConstraintViolation(db_err.message().to_string())
                    }
                    _ => LedgerError::Database(e.to_string()),
                }
            }
            _ => LedgerError::Database(e.to_string()),
        }
    }
}
