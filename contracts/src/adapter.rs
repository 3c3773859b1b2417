//! # Asset Transfer Adapter
//!
//! The contract decides *whether* value moves; the adapter decides *how*.
//! Anything that can move `amount` units between two accounts and report
//! insufficient funds can custody a vault.
//!
//! [`TokenLedger`] is the reference backing. [`StagedLedger`] wraps it so a
//! host can run an operation, look at what it would change, and only then
//! write those changes back.

use std::collections::BTreeSet;

use timelockr_protocol::crypto::PublicKey;
use timelockr_protocol::ledger::{TokenLedger, TransferError};

/// Moves custodied value between accounts.
pub trait AssetTransferAdapter {
    /// Move `amount` from `from` to `to`. On error nothing moved.
    fn transfer(&mut self, from: &PublicKey, to: &PublicKey, amount: u64)
        -> Result<(), TransferError>;
}

impl AssetTransferAdapter for TokenLedger {
    fn transfer(
        &mut self,
        from: &PublicKey,
        to: &PublicKey,
        amount: u64,
    ) -> Result<(), TransferError> {
        TokenLedger::transfer(self, from, to, amount)
    }
}

/// Copy-on-write view over a [`TokenLedger`].
///
/// Reads fall through to the base ledger; writes land in a scratch ledger
/// seeded with only the accounts a transfer touches. Dropping the staged
/// ledger discards everything.
#[derive(Debug)]
pub struct StagedLedger<'a> {
    base: &'a TokenLedger,
    scratch: TokenLedger,
    seeded: BTreeSet<PublicKey>,
}

impl<'a> StagedLedger<'a> {
    pub fn new(base: &'a TokenLedger) -> Self {
        Self {
            base,
            scratch: TokenLedger::new(),
            seeded: BTreeSet::new(),
        }
    }

    pub fn balance_of(&self, account: &PublicKey) -> u64 {
        if self.seeded.contains(account) {
            self.scratch.balance_of(account)
        } else {
            self.base.balance_of(account)
        }
    }

    fn seed(&mut self, account: &PublicKey) {
        if self.seeded.insert(*account) {
            self.scratch
                .set_balance(*account, self.base.balance_of(account));
        }
    }

    /// Staged balances of every touched account.
    pub fn into_changes(self) -> Vec<(PublicKey, u64)> {
        self.scratch.iter().map(|(k, v)| (*k, *v)).collect()
    }
}

impl AssetTransferAdapter for StagedLedger<'_> {
    fn transfer(
        &mut self,
        from: &PublicKey,
        to: &PublicKey,
        amount: u64,
    ) -> Result<(), TransferError> {
        self.seed(from);
        self.seed(to);
        self.scratch.transfer(from, to, amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(b: u8) -> PublicKey {
        PublicKey::from_bytes([b; 32])
    }

    #[test]
    fn staged_transfer_leaves_base_untouched() {
        let mut base = TokenLedger::new();
        base.mint(&key(1), 100).unwrap();

        let mut staged = StagedLedger::new(&base);
        staged.transfer(&key(1), &key(2), 60).unwrap();
        assert_eq!(staged.balance_of(&key(1)), 40);
        assert_eq!(staged.balance_of(&key(2)), 60);

        let changes = staged.into_changes();
        assert_eq!(changes, vec![(key(1), 40), (key(2), 60)]);
        assert_eq!(base.balance_of(&key(1)), 100);
        assert_eq!(base.balance_of(&key(2)), 0);
    }

    #[test]
    fn staged_transfer_surfaces_insufficient_funds() {
        let base = TokenLedger::new();
        let mut staged = StagedLedger::new(&base);
        let err = staged.transfer(&key(1), &key(2), 1).unwrap_err();
        assert!(matches!(err, TransferError::InsufficientFunds { .. }));
    }
}
