// src/asset.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::LedgerError;

pub type AssetId = u32;

/// Accounting record of a single asset class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDetails {
    pub id: AssetId,
    pub owner: Uuid,
    pub min_balance: u64,
    pub supply: u64,
    /// Accounts currently holding a non-zero balance.
    pub accounts: u32,
}

impl AssetDetails {
    pub fn new(id: AssetId, owner: Uuid, min_balance: u64) -> Result<Self, LedgerError> {
        if min_balance == 0 {
            return Err(LedgerError::InvalidMinBalance);
        }

        Ok(Self {
            id,
            owner,
            min_balance,
            supply: 0,
            accounts: 0,
        })
    }

    pub fn is_owner(&self, who: Uuid) -> bool {
        self.owner == who
    }

    /// A stored balance is either zero or at least `min_balance`.
    pub fn check_balance(&self, balance: u64) -> Result<(), LedgerError> {
        if balance != 0 && balance < self.min_balance {
            return Err(LedgerError::BelowMinBalance);
        }
        Ok(())
    }

    /// Balance of `balance` after receiving `amount`.
    pub(crate) fn credit(&self, balance: u64, amount: u64) -> Result<u64, LedgerError> {
        let credited = balance.checked_add(amount).ok_or(LedgerError::Overflow)?;
        self.check_balance(credited)?;
        Ok(credited)
    }

    /// Balance of `balance` after giving up `amount`.
    pub(crate) fn debit(&self, balance: u64, amount: u64) -> Result<u64, LedgerError> {
        let remaining = balance
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance)?;
        self.check_balance(remaining)?;
        Ok(remaining)
    }

    /// Keep `accounts` in step with an entry moving from `before` to `after`.
    pub(crate) fn track_account(&mut self, before: u64, after: u64) -> Result<(), LedgerError> {
        match (before == 0, after == 0) {
            (true, false) => {
                self.accounts = self.accounts.checked_add(1).ok_or(LedgerError::Overflow)?;
            }
            (false, true) => {
                self.accounts = self.accounts.checked_sub(1).ok_or(LedgerError::Overflow)?;
            }
            _ => {}
        }
        Ok(())
    }
}
