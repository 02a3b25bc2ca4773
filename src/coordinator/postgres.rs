//! PostgreSQL transaction backend
//!
//! Transactions run at PostgreSQL's default READ COMMITTED level. Balance rows
//! are locked with `SELECT ... FOR NO KEY UPDATE`, and every transaction sets
//! `lock_timeout` so a blocked transfer fails with a retryable `LockTimeout`
//! instead of waiting indefinitely.

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;

use super::{RepositoryHandle, TxBackend, TxHandle};
use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::repository::Repository;

/// Pool-backed transaction source
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    lock_timeout: Duration,
    statement_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, config: &LedgerConfig) -> Self {
        Self {
            pool,
            lock_timeout: Duration::from_millis(config.lock_timeout_ms),
            statement_timeout: Duration::from_millis(config.statement_timeout_ms),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl RepositoryHandle for Transaction<'static, Postgres> {
    fn repository(&mut self) -> &mut dyn Repository {
        &mut **self
    }
}

#[async_trait]
impl TxHandle for Transaction<'static, Postgres> {
    async fn commit(self) -> Result<(), LedgerError> {
        Transaction::commit(self).await.map_err(LedgerError::from)
    }

    async fn rollback(self) -> Result<(), LedgerError> {
        Transaction::rollback(self).await.map_err(LedgerError::from)
    }
}

impl RepositoryHandle for PoolConnection<Postgres> {
    fn repository(&mut self) -> &mut dyn Repository {
        &mut **self
    }
}

#[async_trait]
impl TxBackend for PgStore {
    type Tx = Transaction<'static, Postgres>;
    type Conn = PoolConnection<Postgres>;

    async fn begin(&self) -> Result<Self::Tx, LedgerError> {
        let mut tx = self.pool.begin().await?;

        // SET does not take bind parameters; both values are integers we own.
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!(
            "SET LOCAL statement_timeout = '{}ms'",
            self.statement_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await?;

        Ok(tx)
    }

    async fn acquire(&self) -> Result<Self::Conn, LedgerError> {
        Ok(self.pool.acquire().await?)
    }
}
