//! Transfer request/result types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::LedgerError;
use crate::models::{Account, CreateTransferParams, Entry, Transfer};

/// Overdraft rule applied to the debited account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalancePolicy {
    /// Balances may go negative; sufficiency is checked by a higher layer
    #[default]
    AllowNegative,
    /// Reject a transfer that would leave the source balance below zero
    RejectOverdraft,
}

/// Inbound transfer request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferParams {
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub amount: i64,
}

impl TransferParams {
    pub fn new(from_account_id: i64, to_account_id: i64, amount: i64) -> Self {
        Self {
            from_account_id,
            to_account_id,
            amount,
        }
    }

    /// Positive amount, distinct accounts
    pub fn validate(&self) -> Result<(), LedgerError> {
        CreateTransferParams::from(*self).validate()
    }

    /// Account ids in lock order (ascending)
    pub fn lock_order(&self) -> [i64; 2] {
        if self.from_account_id < self.to_account_id {
            [self.from_account_id, self.to_account_id]
        } else {
            [self.to_account_id, self.from_account_id]
        }
    }
}

impl From<TransferParams> for CreateTransferParams {
    fn from(p: TransferParams) -> Self {
        CreateTransferParams {
            from_account_id: p.from_account_id,
            to_account_id: p.to_account_id,
            amount: p.amount,
        }
    }
}

impl fmt::Display for TransferParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transfer {} -> {} amount={}",
            self.from_account_id, self.to_account_id, self.amount
        )
    }
}

/// Everything a committed transfer produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    pub transfer: Transfer,
    pub from_account: Account,
    pub to_account: Account,
    pub from_entry: Entry,
    pub to_entry: Entry,
}
