//! Ledger rows and repository parameter types
//!
//! `Entry` and `Transfer` are append-only facts. `Account::balance` is the only
//! mutable quantity; it is a materialized running sum of the account's entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::LedgerError;

/// Account row. Balance is in the smallest currency unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: i64,
    pub owner: String,
    pub balance: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

/// One side of a value movement: negative = debit, positive = credit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Entry {
    pub id: i64,
    pub account_id: i64,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

/// Transfer record. `amount` is always positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Transfer {
    pub id: i64,
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Parameters
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccountParams {
    pub owner: String,
    #[serde(default)]
    pub balance: i64,
    pub currency: String,
}

impl CreateAccountParams {
    pub fn new(owner: impl Into<String>, balance: i64, currency: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            balance,
            currency: currency.into(),
        }
    }

    /// Field checks shared by every repository implementation
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.owner.trim().is_empty() {
            return Err(LedgerError::ConstraintViolation(
                "owner must not be empty".to_string(),
            ));
        }
        let valid_currency =
            self.currency.len() == 3 && self.currency.chars().all(|c| c.is_ascii_uppercase());
        if !valid_currency {
            return Err(LedgerError::ConstraintViolation(format!(
                "invalid currency code: {:?}",
                self.currency
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ListAccountsParams {
    pub limit: i64,
    pub offset: i64,
}

impl ListAccountsParams {
    pub fn validate(&self) -> Result<(), LedgerError> {
        validate_page(self.limit, self.offset)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UpdateAccountParams {
    pub id: i64,
    pub balance: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CreateTransferParams {
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub amount: i64,
}

impl CreateTransferParams {
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.amount <= 0 {
            return Err(LedgerError::ConstraintViolation(
                "transfer amount must be positive".to_string(),
            ));
        }
        if self.from_account_id == self.to_account_id {
            return Err(LedgerError::ConstraintViolation(
                "source and destination accounts must differ".to_string(),
            ));
        }
        Ok(())
    }
}

/// Transfers between two accounts, in either direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ListTransfersParams {
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub limit: i64,
    pub offset: i64,
}

impl ListTransfersParams {
    pub fn validate(&self) -> Result<(), LedgerError> {
        validate_page(self.limit, self.offset)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CreateEntryParams {
    pub account_id: i64,
    pub amount: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ListEntriesParams {
    pub account_id: i64,
    pub limit: i64,
    pub offset: i64,
}

impl ListEntriesParams {
    pub fn validate(&self) -> Result<(), LedgerError> {
        validate_page(self.limit, self.offset)
    }
}

fn validate_page(limit: i64, offset: i64) -> Result<(), LedgerError> {
    if limit <= 0 {
        return Err(LedgerError::ConstraintViolation(
            "limit must be positive".to_string(),
        ));
    }
    if offset < 0 {
        return Err(LedgerError::ConstraintViolation(
            "offset must not be negative".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_account_params_validate() {
        assert!(CreateAccountParams::new("alice", 0, "USD").validate().is_ok());
        assert!(CreateAccountParams::new("  ", 0, "USD").validate().is_err());
        assert!(CreateAccountParams::new("bob", 0, "usd").validate().is_err());
        assert!(CreateAccountParams::new("bob", 0, "USDT").validate().is_err());
    }

    #[test]
    fn test_create_transfer_params_validate() {
        let ok = CreateTransferParams {
            from_account_id: 1,
            to_account_id: 2,
            amount: 10,
        };
        assert!(ok.validate().is_ok());

        let same = CreateTransferParams {
            to_account_id: 1,
            ..ok
        };
        assert_eq!(same.validate().unwrap_err().code(), "CONSTRAINT_VIOLATION");

        let zero = CreateTransferParams { amount: 0, ..ok };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_page_validation() {
        assert!(ListAccountsParams { limit: 5, offset: 0 }.validate().is_ok());
        assert!(ListAccountsParams { limit: 0, offset: 0 }.validate().is_err());
        assert!(ListAccountsParams { limit: 5, offset: -1 }.validate().is_err());
    }
}
