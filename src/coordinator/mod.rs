//! Transaction Coordinator
//!
//! Runs a caller-supplied unit of work against a transaction-scoped
//! [`Repository`] and either commits it or leaves no visible effect.
//!
//! # Outcome Table
//!
//! ```text
//! begin fails                 → TransactionStartFailed
//! work fails, rollback ok     → work's error, unchanged
//! work fails, rollback fails  → RollbackFailed { source: work's error, rollback }
//! work ok,    commit fails    → CommitFailed (work's value dropped)
//! work ok,    commit ok       → work's value
//! ```
//!
//! The coordinator does not serialize callers. Isolation and row locking are
//! the backend's job; see [`postgres::PgStore`] and
//! [`crate::repository::MemoryStore`].

pub mod postgres;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::{debug, error, warn};

use crate::error::LedgerError;
use crate::repository::Repository;

pub use postgres::PgStore;

/// Anything that can lend out a repository
pub trait RepositoryHandle: Send {
    fn repository(&mut self) -> &mut dyn Repository;
}

/// An open store transaction
#[async_trait]
pub trait TxHandle: RepositoryHandle {
    async fn commit(self) -> Result<(), LedgerError>;
    async fn rollback(self) -> Result<(), LedgerError>;
}

/// Connection source: transactions plus ambient (autocommit) connections
#[async_trait]
pub trait TxBackend: Send + Sync {
    type Tx: TxHandle;
    type Conn: RepositoryHandle;

    async fn begin(&self) -> Result<Self::Tx, LedgerError>;
    async fn acquire(&self) -> Result<Self::Conn, LedgerError>;
}

/// Transaction coordinator. Holds no domain state.
pub struct TransactionCoordinator<B> {
    backend: B,
}

impl<B: TxBackend> TransactionCoordinator<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run `work` inside one transaction. See the module docs for outcomes.
    ///
    /// ```ignore
    /// let balance = coordinator
    ///     .run_in_transaction(|repo| Box::pin(async move {
    ///         Ok(repo.get_account_for_update(1).await?.balance)
    ///     }))
    ///     .await?;
    /// ```
    pub async fn run_in_transaction<T, F>(&self, work: F) -> Result<T, LedgerError>
    where
        T: Send,
        F: for<'r> FnOnce(&'r mut dyn Repository) -> BoxFuture<'r, Result<T, LedgerError>>
            + Send,
    {
        let mut tx = self.backend.begin().await.map_err(|e| {
            warn!(error = %e, "Failed to begin transaction");
            LedgerError::TransactionStartFailed(e.to_string())
        })?;
        debug!("Transaction started");

        let outcome = work(tx.repository()).await;

        match outcome {
            Ok(value) => {
                tx.commit().await.map_err(|e| {
                    error!(error = %e, "Transaction commit failed");
                    LedgerError::CommitFailed(e.to_string())
                })?;
                debug!("Transaction committed");
                Ok(value)
            }
            Err(err) => match tx.rollback().await {
                Ok(()) => {
                    warn!(error = %err, code = err.code(), "Transaction rolled back");
                    Err(err)
                }
                Err(rb) => {
                    // Data-integrity alarm: keep both causes
                    error!(error = %err, rollback_error = %rb, "Transaction rollback failed");
                    Err(LedgerError::RollbackFailed {
                        source: Box::new(err),
                        rollback: rb.to_string(),
                    })
                }
            },
        }
    }

    /// Run `work` against an ambient connection, outside any explicit transaction
    pub async fn with_connection<T, F>(&self, work: F) -> Result<T, LedgerError>
    where
        T: Send,
        F: for<'r> FnOnce(&'r mut dyn Repository) -> BoxFuture<'r, Result<T, LedgerError>>
            + Send,
    {
        let mut conn = self.backend.acquire().await?;
        work(conn.repository()).await
    }
}
