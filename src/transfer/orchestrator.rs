//! Transfer Orchestrator
//!
//! Sequences the five repository calls of a transfer inside one
//! coordinator-managed transaction and assembles the [`TransferResult`].

use tracing::{debug, info};

use super::types::{BalancePolicy, TransferParams, TransferResult};
use crate::coordinator::{TransactionCoordinator, TxBackend};
use crate::error::LedgerError;
use crate::models::{
    Account, CreateAccountParams, CreateEntryParams, ListAccountsParams, UpdateAccountParams,
};
use crate::repository::Repository;

/// Transfer orchestrator plus the account pass-through operations
pub struct TransferOrchestrator<B> {
    coordinator: TransactionCoordinator<B>,
    policy: BalancePolicy,
}

impl<B: TxBackend> TransferOrchestrator<B> {
    pub fn new(backend: B, policy: BalancePolicy) -> Self {
        Self {
            coordinator: TransactionCoordinator::new(backend),
            policy,
        }
    }

    pub fn coordinator(&self) -> &TransactionCoordinator<B> {
        &self.coordinator
    }

    pub fn policy(&self) -> BalancePolicy {
        self.policy
    }

    /// Move `amount` from one account to another, atomically.
    ///
    /// Dropping the returned future cancels the in-flight store call and
    /// rolls the transaction back.
    pub async fn transfer(&self, params: TransferParams) -> Result<TransferResult, LedgerError> {
        params.validate()?;

        let policy = self.policy;
        let result = self
            .coordinator
            .run_in_transaction(move |repo| Box::pin(execute_transfer(repo, params, policy)))
            .await?;

        info!(
            transfer_id = result.transfer.id,
            from = params.from_account_id,
            to = params.to_account_id,
            amount = params.amount,
            "Transfer committed"
        );
        Ok(result)
    }

    // === Pass-through account operations ===

    pub async fn create_account(&self, params: CreateAccountParams) -> Result<Account, LedgerError> {
        let account = self
            .coordinator
            .with_connection(move |repo| Box::pin(async move { repo.create_account(params).await }))
            .await?;
        info!(account_id = account.id, owner = %account.owner, "Account created");
        Ok(account)
    }

    pub async fn get_account(&self, id: i64) -> Result<Account, LedgerError> {
        self.coordinator
            .with_connection(move |repo| Box::pin(async move { repo.get_account(id).await }))
            .await
    }

    pub async fn list_accounts(&self, limit: i64, offset: i64) -> Result<Vec<Account>, LedgerError> {
        let params = ListAccountsParams { limit, offset };
        self.coordinator
            .with_connection(move |repo| Box::pin(async move { repo.list_accounts(params).await }))
            .await
    }
}

/// Transaction body. Every `?` aborts the whole transfer via rollback.
async fn execute_transfer(
    repo: &mut dyn Repository,
    params: TransferParams,
    policy: BalancePolicy,
) -> Result<TransferResult, LedgerError> {
    let TransferParams {
        from_account_id,
        to_account_id,
        amount,
    } = params;

    let transfer = repo.create_transfer(params.into()).await?;

    let from_entry = repo
        .create_entry(CreateEntryParams {
            account_id: from_account_id,
            amount: -amount,
        })
        .await?;
    let to_entry = repo
        .create_entry(CreateEntryParams {
            account_id: to_account_id,
            amount,
        })
        .await?;

    // Lower id first, whatever the direction
    let delta_for = |id: i64| if id == from_account_id { -amount } else { amount };
    let [first, second] = params.lock_order();
    let first_account = apply_delta(repo, first, delta_for(first), policy).await?;
    let second_account = apply_delta(repo, second, delta_for(second), policy).await?;
    let (from_account, to_account) = if first == from_account_id {
        (first_account, second_account)
    } else {
        (second_account, first_account)
    };

    Ok(TransferResult {
        transfer,
        from_account,
        to_account,
        from_entry,
        to_entry,
    })
}

/// Lock the row, compute the new balance from the locked read, write it back
async fn apply_delta(
    repo: &mut dyn Repository,
    account_id: i64,
    delta: i64,
    policy: BalancePolicy,
) -> Result<Account, LedgerError> {
    let account = repo.get_account_for_update(account_id).await?;

    let balance = account.balance.checked_add(delta).ok_or_else(|| {
        LedgerError::ConstraintViolation(format!("balance overflow on account {}", account_id))
    })?;

    if delta < 0 && balance < 0 && policy == BalancePolicy::RejectOverdraft {
        return Err(LedgerError::InsufficientFunds {
            account_id,
            balance: account.balance,
            amount: -delta,
        });
    }

    debug!(account_id, old = account.balance, new = balance, "Balance update");
    repo.update_account(UpdateAccountParams {
        id: account_id,
        balance,
    })
    .await
}
