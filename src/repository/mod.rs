//! Repository layer
//!
//! Single-row primitives against ledger state. A repository gives no cross-row
//! guarantees; atomicity comes from running calls against a transaction-scoped
//! handle handed out by the [`crate::coordinator::TransactionCoordinator`].
//!
//! Implementations:
//! - [`postgres`] - `Repository for sqlx::PgConnection` (pooled connection or
//!   the connection behind an open transaction)
//! - [`memory`] - in-process store with row locks and buffered transactions

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::LedgerError;
use crate::models::{
    Account, CreateAccountParams, CreateEntryParams, CreateTransferParams, Entry,
    ListAccountsParams, ListEntriesParams, ListTransfersParams, Transfer, UpdateAccountParams,
};

pub use memory::MemoryStore;

/// Primitive ledger operations
///
/// Every call is a potential suspension point (store I/O). Dropping the
/// returned future cancels the call.
#[async_trait]
pub trait Repository: Send {
    // === Accounts ===

    /// Insert a new account. Fails with `ConstraintViolation` on invalid fields.
    async fn create_account(&mut self, params: CreateAccountParams)
    -> Result<Account, LedgerError>;

    /// Plain read. Fails with `NotFound`.
    async fn get_account(&mut self, id: i64) -> Result<Account, LedgerError>;

    /// Read that takes the row-level lock for the rest of the transaction.
    /// Fails with `NotFound`, or `LockTimeout` if the lock cannot be acquired in time.
    async fn get_account_for_update(&mut self, id: i64) -> Result<Account, LedgerError>;

    /// Page of accounts ordered by id
    async fn list_accounts(
        &mut self,
        params: ListAccountsParams,
    ) -> Result<Vec<Account>, LedgerError>;

    /// Unconditional balance overwrite. The caller computes the new value from
    /// a balance read inside the same transaction.
    async fn update_account(&mut self, params: UpdateAccountParams)
    -> Result<Account, LedgerError>;

    // === Transfers ===

    async fn create_transfer(
        &mut self,
        params: CreateTransferParams,
    ) -> Result<Transfer, LedgerError>;

    async fn get_transfer(&mut self, id: i64) -> Result<Transfer, LedgerError>;

    async fn list_transfers(
        &mut self,
        params: ListTransfersParams,
    ) -> Result<Vec<Transfer>, LedgerError>;

    // === Entries ===

    async fn create_entry(&mut self, params: CreateEntryParams) -> Result<Entry, LedgerError>;

    async fn get_entry(&mut self, id: i64) -> Result<Entry, LedgerError>;

    async fn list_entries(&mut self, params: ListEntriesParams)
    -> Result<Vec<Entry>, LedgerError>;
}
