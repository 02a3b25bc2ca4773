//! In-memory ledger store
//!
//! Behaves like a READ COMMITTED store with row-level locking:
//! - committed tables live behind one mutex and change only at commit
//! - a [`MemoryTx`] buffers its inserts and balance updates, and reads its own writes
//! - `get_account_for_update` / `update_account` take a per-account lock held
//!   until commit, rollback or drop, bounded by the lock timeout
//! - ids come from store-wide sequences, so a rolled-back insert leaves a gap
//!
//! Fault injection (`fail_nth_call`, `fail_next_begin`, ...) lets tests force a
//! failure at any step of a unit of work.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};
use tracing::debug;

use super::Repository;
use crate::coordinator::{RepositoryHandle, TxBackend, TxHandle};
use crate::error::LedgerError;
use crate::models::{
    Account, CreateAccountParams, CreateEntryParams, CreateTransferParams, Entry,
    ListAccountsParams, ListEntriesParams, ListTransfersParams, Transfer, UpdateAccountParams,
};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Repository operation, used to target injected faults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateAccount,
    GetAccount,
    GetAccountForUpdate,
    ListAccounts,
    UpdateAccount,
    CreateTransfer,
    GetTransfer,
    ListTransfers,
    CreateEntry,
    GetEntry,
    ListEntries,
}

#[derive(Default)]
struct Tables {
    accounts: BTreeMap<i64, Account>,
    transfers: BTreeMap<i64, Transfer>,
    entries: BTreeMap<i64, Entry>,
    account_seq: i64,
    transfer_seq: i64,
    entry_seq: i64,
}

#[derive(Default)]
struct Faults {
    /// Remaining calls until the operation fails (1 = the next call)
    countdown: HashMap<Operation, usize>,
    fail_begin: bool,
    fail_commit: bool,
    fail_rollback: bool,
}

struct Shared {
    tables: Mutex<Tables>,
    row_locks: Mutex<HashMap<i64, Arc<RowLock<()>>>>,
    faults: Mutex<Faults>,
    lock_timeout: Duration,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn row_lock(&self, account_id: i64) -> Arc<RowLock<()>> {
        lock(&self.row_locks)
            .entry(account_id)
            .or_insert_with(|| Arc::new(RowLock::new(())))
            .clone()
    }

    fn check_fault(&self, op: Operation) -> Result<(), LedgerError> {
        let mut faults = lock(&self.faults);
        if let Some(remaining) = faults.countdown.get_mut(&op) {
            *remaining -= 1;
            if *remaining == 0 {
                faults.countdown.remove(&op);
                return Err(LedgerError::Database(format!("injected failure in {:?}", op)));
            }
        }
        Ok(())
    }

    fn take_flag(&self, pick: impl FnOnce(&mut Faults) -> &mut bool) -> bool {
        let mut faults = lock(&self.faults);
        std::mem::take(pick(&mut *faults))
    }
}

/// Shared handle to an in-memory ledger. Cloning is cheap.
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: Mutex::new(Tables::default()),
                row_locks: Mutex::new(HashMap::new()),
                faults: Mutex::new(Faults::default()),
                lock_timeout,
            }),
        }
    }

    /// Open a transaction. Dropping it without commit discards its writes.
    pub fn begin_tx(&self) -> MemoryTx {
        MemoryTx {
            shared: self.shared.clone(),
            accounts: BTreeMap::new(),
            transfers: Vec::new(),
            entries: Vec::new(),
            held: HashMap::new(),
        }
    }

    /// Fail the `n`-th upcoming call of `op` (1 = the next call)
    pub fn fail_nth_call(&self, op: Operation, n: usize) {
        assert!(n > 0, "n is 1-based");
        lock(&self.shared.faults).countdown.insert(op, n);
    }

    pub fn fail_next_begin(&self) {
        lock(&self.shared.faults).fail_begin = true;
    }

    pub fn fail_next_commit(&self) {
        lock(&self.shared.faults).fail_commit = true;
    }

    pub fn fail_next_rollback(&self) {
        lock(&self.shared.faults).fail_rollback = true;
    }

    // === Committed-state inspection ===

    /// Sum of all committed account balances
    pub fn total_balance(&self) -> i128 {
        lock(&self.shared.tables)
            .accounts
            .values()
            .map(|a| a.balance as i128)
            .sum()
    }

    pub fn transfer_count(&self) -> usize {
        lock(&self.shared.tables).transfers.len()
    }

    pub fn entry_count(&self) -> usize {
        lock(&self.shared.tables).entries.len()
    }

    /// Sum of committed entries for one account
    pub fn entry_sum(&self, account_id: i64) -> i64 {
        lock(&self.shared.tables)
            .entries
            .values()
            .filter(|e| e.account_id == account_id)
            .map(|e| e.amount)
            .sum()
    }
}

/// Transaction against a [`MemoryStore`]
pub struct MemoryTx {
    shared: Arc<Shared>,
    /// Accounts created or updated by this transaction
    accounts: BTreeMap<i64, Account>,
    transfers: Vec<Transfer>,
    entries: Vec<Entry>,
    /// Row locks held until the transaction ends
    held: HashMap<i64, OwnedMutexGuard<()>>,
}

impl MemoryTx {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        lock(&self.shared.tables)
    }

    /// Latest visible version: own write, else committed
    fn visible_account(&self, id: i64) -> Option<Account> {
        if let Some(account) = self.accounts.get(&id) {
            return Some(account.clone());
        }
        self.tables().accounts.get(&id).cloned()
    }

    fn account_exists(&self, id: i64) -> bool {
        self.accounts.contains_key(&id) || self.tables().accounts.contains_key(&id)
    }

    fn require_account_reference(&self, id: i64) -> Result<(), LedgerError> {
        if self.account_exists(id) {
            Ok(())
        } else {
            Err(LedgerError::account_not_found(id))
        }
    }

    async fn lock_row(&mut self, account_id: i64) -> Result<(), LedgerError> {
        if self.held.contains_key(&account_id) {
            return Ok(());
        }

        let row = self.shared.row_lock(account_id);
        let timeout = self.shared.lock_timeout;
        match tokio::time::timeout(timeout, row.lock_owned()).await {
            Ok(guard) => {
                self.held.insert(account_id, guard);
                Ok(())
            }
            Err(_) => Err(LedgerError::LockTimeout(format!(
                "account {} row lock not acquired within {:?}",
                account_id, timeout
            ))),
        }
    }

    /// Publish buffered writes, then release row locks
    fn apply(self) {
        let MemoryTx {
            shared,
            accounts,
            transfers,
            entries,
            held,
        } = self;

        {
            let mut tables = lock(&shared.tables);
            tables.accounts.extend(accounts);
            tables
                .transfers
                .extend(transfers.into_iter().map(|t| (t.id, t)));
            tables
                .entries
                .extend(entries.into_iter().map(|e| (e.id, e)));
        }
        drop(held);
    }
}

#[async_trait]
impl Repository for MemoryTx {
    async fn create_account(
        &mut self,
        params: CreateAccountParams,
    ) -> Result<Account, LedgerError> {
        self.shared.check_fault(Operation::CreateAccount)?;
        params.validate()?;

        let id = {
            let mut tables = self.tables();
            tables.account_seq += 1;
            tables.account_seq
        };
        let account = Account {
            id,
            owner: params.owner,
            balance: params.balance,
            currency: params.currency,
            created_at: Utc::now(),
        };
        self.accounts.insert(id, account.clone());
        Ok(account)
    }

    async fn get_account(&mut self, id: i64) -> Result<Account, LedgerError> {
        self.shared.check_fault(Operation::GetAccount)?;
        self.visible_account(id)
            .ok_or_else(|| LedgerError::account_not_found(id))
    }

    async fn get_account_for_update(&mut self, id: i64) -> Result<Account, LedgerError> {
        self.shared.check_fault(Operation::GetAccountForUpdate)?;
        if !self.account_exists(id) {
            return Err(LedgerError::account_not_found(id));
        }
        self.lock_row(id).await?;
        // Re-read after the lock: a previous holder may have committed a new balance.
        self.visible_account(id)
            .ok_or_else(|| LedgerError::account_not_found(id))
    }

    async fn list_accounts(
        &mut self,
        params: ListAccountsParams,
    ) -> Result<Vec<Account>, LedgerError> {
        self.shared.check_fault(Operation::ListAccounts)?;
        params.validate()?;

        let mut visible = self.tables().accounts.clone();
        visible.extend(self.accounts.iter().map(|(id, a)| (*id, a.clone())));
        Ok(visible
            .into_values()
            .skip(params.offset as usize)
            .take(params.limit as usize)
            .collect())
    }

    async fn update_account(
        &mut self,
        params: UpdateAccountParams,
    ) -> Result<Account, LedgerError> {
        self.shared.check_fault(Operation::UpdateAccount)?;
        if !self.account_exists(params.id) {
            return Err(LedgerError::account_not_found(params.id));
        }
        self.lock_row(params.id).await?;

        let mut account = self
            .visible_account(params.id)
            .ok_or_else(|| LedgerError::account_not_found(params.id))?;
        account.balance = params.balance;
        self.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn create_transfer(
        &mut self,
        params: CreateTransferParams,
    ) -> Result<Transfer, LedgerError> {
        self.shared.check_fault(Operation::CreateTransfer)?;
        params.validate()?;
        self.require_account_reference(params.from_account_id)?;
        self.require_account_reference(params.to_account_id)?;

        let id = {
            let mut tables = self.tables();
            tables.transfer_seq += 1;
            tables.transfer_seq
        };
        let transfer = Transfer {
            id,
            from_account_id: params.from_account_id,
            to_account_id: params.to_account_id,
            amount: params.amount,
            created_at: Utc::now(),
        };
        self.transfers.push(transfer.clone());
        Ok(transfer)
    }

    async fn get_transfer(&mut self, id: i64) -> Result<Transfer, LedgerError> {
        self.shared.check_fault(Operation::GetTransfer)?;
        if let Some(t) = self.transfers.iter().find(|t| t.id == id) {
            return Ok(t.clone());
        }
        self.tables()
            .transfers
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("transfer {}", id)))
    }

    async fn list_transfers(
        &mut self,
        params: ListTransfersParams,
    ) -> Result<Vec<Transfer>, LedgerError> {
        self.shared.check_fault(Operation::ListTransfers)?;
        params.validate()?;

        let (a, b) = (params.from_account_id, params.to_account_id);
        let between = |t: &Transfer| {
            (t.from_account_id == a && t.to_account_id == b)
                || (t.from_account_id == b && t.to_account_id == a)
        };

        let mut visible: BTreeMap<i64, Transfer> = self
            .tables()
            .transfers
            .values()
            .filter(|t| between(*t))
            .map(|t| (t.id, t.clone()))
            .collect();
        visible.extend(
            self.transfers
                .iter()
                .filter(|t| between(*t))
                .map(|t| (t.id, t.clone())),
        );
        Ok(visible
            .into_values()
            .skip(params.offset as usize)
            .take(params.limit as usize)
            .collect())
    }

    async fn create_entry(&mut self, params: CreateEntryParams) -> Result<Entry, LedgerError> {
        self.shared.check_fault(Operation::CreateEntry)?;
        self.require_account_reference(params.account_id)?;

        let id = {
            let mut tables = self.tables();
            tables.entry_seq += 1;
            tables.entry_seq
        };
        let entry = Entry {
            id,
            account_id: params.account_id,
            amount: params.amount,
            created_at: Utc::now(),
        };
        self.entries.push(entry.clone());
        Ok(entry)
    }

    async fn get_entry(&mut self, id: i64) -> Result<Entry, LedgerError> {
        self.shared.check_fault(Operation::GetEntry)?;
        if let Some(e) = self.entries.iter().find(|e| e.id == id) {
            return Ok(e.clone());
        }
        self.tables()
            .entries
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("entry {}", id)))
    }

    async fn list_entries(
        &mut self,
        params: ListEntriesParams,
    ) -> Result<Vec<Entry>, LedgerError> {
        self.shared.check_fault(Operation::ListEntries)?;
        params.validate()?;

        let mut visible: BTreeMap<i64, Entry> = self
            .tables()
            .entries
            .values()
            .filter(|e| e.account_id == params.account_id)
            .map(|e| (e.id, e.clone()))
            .collect();
        visible.extend(
            self.entries
                .iter()
                .filter(|e| e.account_id == params.account_id)
                .map(|e| (e.id, e.clone())),
        );
        Ok(visible
            .into_values()
            .skip(params.offset as usize)
            .take(params.limit as usize)
            .collect())
    }
}

impl RepositoryHandle for MemoryTx {
    fn repository(&mut self) -> &mut dyn Repository {
        self
    }
}

#[async_trait]
impl TxHandle for MemoryTx {
    async fn commit(self) -> Result<(), LedgerError> {
        if self.shared.take_flag(|f| &mut f.fail_commit) {
            return Err(LedgerError::Database("injected commit failure".to_string()));
        }
        debug!(
            accounts = self.accounts.len(),
            transfers = self.transfers.len(),
            entries = self.entries.len(),
            "memory tx commit"
        );
        self.apply();
        Ok(())
    }

    async fn rollback(self) -> Result<(), LedgerError> {
        if self.shared.take_flag(|f| &mut f.fail_rollback) {
            return Err(LedgerError::Database(
                "injected rollback failure".to_string(),
            ));
        }
        Ok(())
    }
}

/// Autocommit connection: every call runs in its own transaction
pub struct MemoryConn {
    store: MemoryStore,
}

macro_rules! autocommit {
    ($self:ident, $call:ident($($arg:expr),*)) => {{
        let mut tx = $self.store.begin_tx();
        let out = tx.$call($($arg),*).await?;
        tx.apply();
        Ok(out)
    }};
}

#[async_trait]
impl Repository for MemoryConn {
    async fn create_account(
        &mut self,
        params: CreateAccountParams,
    ) -> Result<Account, LedgerError> {
        autocommit!(self, create_account(params))
    }

    async fn get_account(&mut self, id: i64) -> Result<Account, LedgerError> {
        autocommit!(self, get_account(id))
    }

    async fn get_account_for_update(&mut self, id: i64) -> Result<Account, LedgerError> {
        autocommit!(self, get_account_for_update(id))
    }

    async fn list_accounts(
        &mut self,
        params: ListAccountsParams,
    ) -> Result<Vec<Account>, LedgerError> {
        autocommit!(self, list_accounts(params))
    }

    async fn update_account(
        &mut self,
        params: UpdateAccountParams,
    ) -> Result<Account, LedgerError> {
        autocommit!(self, update_account(params))
    }

    async fn create_transfer(
        &mut self,
        params: CreateTransferParams,
    ) -> Result<Transfer, LedgerError> {
        autocommit!(self, create_transfer(params))
    }

    async fn get_transfer(&mut self, id: i64) -> Result<Transfer, LedgerError> {
        autocommit!(self, get_transfer(id))
    }

    async fn list_transfers(
        &mut self,
        params: ListTransfersParams,
    ) -> Result<Vec<Transfer>, LedgerError> {
        autocommit!(self, list_transfers(params))
    }

    async fn create_entry(&mut self, params: CreateEntryParams) -> Result<Entry, LedgerError> {
        autocommit!(self, create_entry(params))
    }

    async fn get_entry(&mut self, id: i64) -> Result<Entry, LedgerError> {
        autocommit!(self, get_entry(id))
    }

    async fn list_entries(
        &mut self,
        params: ListEntriesParams,
    ) -> Result<Vec<Entry>, LedgerError> {
        autocommit!(self, list_entries(params))
    }
}

impl RepositoryHandle for MemoryConn {
    fn repository(&mut self) -> &mut dyn Repository {
        self
    }
}

#[async_trait]
impl TxBackend for MemoryStore {
    type Tx = MemoryTx;
    type Conn = MemoryConn;

    async fn begin(&self) -> Result<MemoryTx, LedgerError> {
        if self.shared.take_flag(|f| &mut f.fail_begin) {
            return Err(LedgerError::Database("injected begin failure".to_string()));
        }
        Ok(self.begin_tx())
    }

    async fn acquire(&self) -> Result<MemoryConn, LedgerError> {
        Ok(MemoryConn {
            store: self.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed(store: &MemoryStore, balance: i64) -> Account {
        let mut conn = store.acquire().await.unwrap();
        conn.create_account(CreateAccountParams::new("seed", balance, "USD"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible() {
        let store = MemoryStore::new();
        let account = seed(&store, 100).await;

        let mut tx = store.begin_tx();
        tx.update_account(UpdateAccountParams {
            id: account.id,
            balance: 5,
        })
        .await
        .unwrap();
        assert_eq!(tx.get_account(account.id).await.unwrap().balance, 5);

        let mut conn = store.acquire().await.unwrap();
        assert_eq!(conn.get_account(account.id).await.unwrap().balance, 100);

        tx.commit().await.unwrap();
        assert_eq!(conn.get_account(account.id).await.unwrap().balance, 5);
    }

    #[tokio::test]
    async fn test_dropped_tx_discards_writes_and_releases_locks() {
        let store = MemoryStore::with_lock_timeout(Duration::from_millis(50));
        let account = seed(&store, 100).await;

        {
            let mut tx = store.begin_tx();
            tx.get_account_for_update(account.id).await.unwrap();
            tx.create_entry(CreateEntryParams {
                account_id: account.id,
                amount: 1,
            })
            .await
            .unwrap();
        }

        assert_eq!(store.entry_count(), 0);
        let mut tx = store.begin_tx();
        assert!(tx.get_account_for_update(account.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_row_lock_times_out() {
        let store = MemoryStore::with_lock_timeout(Duration::from_millis(20));
        let account = seed(&store, 100).await;

        let mut holder = store.begin_tx();
        holder.get_account_for_update(account.id).await.unwrap();

        let mut waiter = store.begin_tx();
        let err = waiter.get_account_for_update(account.id).await.unwrap_err();
        assert_eq!(err.code(), "LOCK_TIMEOUT");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_waiter_sees_value_committed_by_lock_holder() {
        let store = MemoryStore::new();
        let account = seed(&store, 100).await;

        let mut holder = store.begin_tx();
        holder.get_account_for_update(account.id).await.unwrap();
        holder
            .update_account(UpdateAccountParams {
                id: account.id,
                balance: 60,
            })
            .await
            .unwrap();

        let waiter_store = store.clone();
        let waiter = tokio::spawn(async move {
            let mut tx = waiter_store.begin_tx();
            tx.get_account_for_update(account.id).await.unwrap().balance
        });

        tokio::task::yield_now().await;
        holder.commit().await.unwrap();
        assert_eq!(waiter.await.unwrap(), 60);
    }

    #[tokio::test]
    async fn test_missing_referenced_account_is_not_found() {
        let store = MemoryStore::new();
        let account = seed(&store, 0).await;
        let mut conn = store.acquire().await.unwrap();

        let err = conn
            .create_entry(CreateEntryParams {
                account_id: 999,
                amount: 1,
            })
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::account_not_found(999));

        let err = conn
            .create_transfer(CreateTransferParams {
                from_account_id: account.id,
                to_account_id: 999,
                amount: 1,
            })
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::account_not_found(999));
    }

    #[tokio::test]
    async fn test_list_accounts_paginates_by_id() {
        let store = MemoryStore::new();
        for _ in 0..5 {
            seed(&store, 0).await;
        }
        let mut conn = store.acquire().await.unwrap();

        let page = conn
            .list_accounts(ListAccountsParams {
                limit: 2,
                offset: 2,
            })
            .await
            .unwrap();
        let ids: Vec<i64> = page.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_fail_nth_call() {
        let store = MemoryStore::new();
        let account = seed(&store, 0).await;
        store.fail_nth_call(Operation::GetAccount, 2);

        let mut conn = store.acquire().await.unwrap();
        assert!(conn.get_account(account.id).await.is_ok());
        assert!(conn.get_account(account.id).await.is_err());
        assert!(conn.get_account(account.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_rolled_back_insert_leaves_id_gap() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin_tx();
            tx.create_account(CreateAccountParams::new("ghost", 0, "USD"))
                .await
                .unwrap();
            tx.rollback().await.unwrap();
        }
        let account = seed(&store, 0).await;
        assert_eq!(account.id, 2);
    }
}
