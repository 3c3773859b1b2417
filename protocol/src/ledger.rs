//! # Token Ledger
//!
//! A flat `account -> balance` book for a single custodied asset. External
//! wallets and vault custody accounts are just entries keyed by
//! [`PublicKey`]; a vault's custody account is its derived address.
//!
//! The ledger enforces the only two rules money needs: you can't spend
//! what you don't have, and balances never wrap. A failed transfer changes
//! nothing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::crypto::keys::PublicKey;

/// Errors from ledger operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("insufficient funds in {account}: available {available}, requested {requested}")]
    InsufficientFunds {
        account: PublicKey,
        available: u64,
        requested: u64,
    },

    /// Crediting would push the balance past `u64::MAX`.
    #[error("balance overflow crediting {account}")]
    Overflow { account: PublicKey },
}

/// Balances for every account the host knows about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenLedger {
    balances: BTreeMap<PublicKey, u64>,
}

impl TokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of `account`. Unknown accounts hold zero.
    pub fn balance_of(&self, account: &PublicKey) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Overwrite a balance. Used when loading persisted state.
    pub fn set_balance(&mut self, account: PublicKey, amount: u64) {
        self.balances.insert(account, amount);
    }

    /// Issue new units to `account`.
    pub fn mint(&mut self, account: &PublicKey, amount: u64) -> Result<u64, TransferError> {
        let updated = self
            .balance_of(account)
            .checked_add(amount)
            .ok_or(TransferError::Overflow { account: *account })?;
        self.balances.insert(*account, updated);
        debug!(%account, amount, balance = updated, "minted");
        Ok(updated)
    }

    /// Move `amount` from `from` to `to`.
    ///
    /// Both sides are computed before either is written, so an error leaves
    /// the ledger exactly as it was.
    pub fn transfer(
        &mut self,
        from: &PublicKey,
        to: &PublicKey,
        amount: u64,
    ) -> Result<(), TransferError> {
        let available = self.balance_of(from);
        let debited = available
            .checked_sub(amount)
            .ok_or(TransferError::InsufficientFunds {
                account: *from,
                available,
                requested: amount,
            })?;

        if from == to {
            return Ok(());
        }

        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(TransferError::Overflow { account: *to })?;

        self.balances.insert(*from, debited);
        self.balances.insert(*to, credited);
        debug!(%from, %to, amount, "transferred");
        Ok(())
    }

    /// Every known account and its balance, in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&PublicKey, &u64)> {
        self.balances.iter()
    }

    /// Sum of all balances. `None` if the sum itself overflows.
    pub fn total_supply(&self) -> Option<u64> {
        self.balances
            .values()
            .try_fold(0u64, |acc, v| acc.checked_add(*v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(b: u8) -> PublicKey {
        PublicKey::from_bytes([b; 32])
    }

    #[test]
    fn unknown_account_has_zero_balance() {
        let ledger = TokenLedger::new();
        assert_eq!(ledger.balance_of(&key(1)), 0);
    }

    #[test]
    fn mint_then_transfer() {
        let mut ledger = TokenLedger::new();
        ledger.mint(&key(1), 1_000_000).unwrap();
        ledger.transfer(&key(1), &key(2), 400_000).unwrap();
        assert_eq!(ledger.balance_of(&key(1)), 600_000);
        assert_eq!(ledger.balance_of(&key(2)), 400_000);
        assert_eq!(ledger.total_supply(), Some(1_000_000));
    }

    #[test]
    fn insufficient_funds_changes_nothing() {
        let mut ledger = TokenLedger::new();
        ledger.mint(&key(1), 100).unwrap();
        let before = ledger.clone();

        let err = ledger.transfer(&key(1), &key(2), 101).unwrap_err();
        assert_eq!(
            err,
            TransferError::InsufficientFunds {
                account: key(1),
                available: 100,
                requested: 101,
            }
        );
        assert_eq!(ledger, before);
    }

    #[test]
    fn overflowing_credit_changes_nothing() {
        let mut ledger = TokenLedger::new();
        ledger.mint(&key(1), 10).unwrap();
        ledger.mint(&key(2), u64::MAX).unwrap();
        let before = ledger.clone();

        let err = ledger.transfer(&key(1), &key(2), 10).unwrap_err();
        assert_eq!(err, TransferError::Overflow { account: key(2) });
        assert_eq!(ledger, before);
    }

    #[test]
    fn mint_overflow_rejected() {
        let mut ledger = TokenLedger::new();
        ledger.mint(&key(1), u64::MAX).unwrap();
        assert!(ledger.mint(&key(1), 1).is_err());
        assert_eq!(ledger.balance_of(&key(1)), u64::MAX);
    }

    #[test]
    fn self_transfer_is_a_no_op() {
        let mut ledger = TokenLedger::new();
        ledger.mint(&key(1), 50).unwrap();
        ledger.transfer(&key(1), &key(1), 50).unwrap();
        assert_eq!(ledger.balance_of(&key(1)), 50);
    }
}
