//! Contract error taxonomy.
//!
//! Every rejection is a specific variant so callers can tell "try again
//! later" ([`VaultError::NotYetUnlocked`]) from "never valid"
//! ([`VaultError::Unauthorized`], [`VaultError::AlreadyInitialized`]).
//! Nothing here is retried by the contract itself.

use thiserror::Error;
use timelockr_protocol::config::ConfigError;
use timelockr_protocol::crypto::PublicKey;
use timelockr_protocol::ledger::TransferError;

/// Errors returned by vault operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VaultError {
    /// A record already exists at the owner's derived address.
    #[error("vault already initialized at {address}")]
    AlreadyInitialized { address: PublicKey },

    /// The caller is not the identity this operation requires, or did not
    /// sign the transaction.
    #[error("{caller} is not authorized for this vault operation")]
    Unauthorized { caller: PublicKey },

    /// The caller's time condition is not met yet. `unlocks_at` is the
    /// earliest moment the caller's path opens, or `None` when the backup
    /// path has not been triggered at all.
    #[error("vault not yet unlocked (now {now}, unlocks at {unlocks_at:?})")]
    NotYetUnlocked { now: i64, unlocks_at: Option<i64> },

    /// The balance or a timestamp would leave its representable range.
    #[error("arithmetic overflow")]
    Overflow,

    /// Surfaced verbatim from the asset transfer adapter.
    #[error("transfer failed: {0}")]
    TransferFailed(#[from] TransferError),

    #[error("deposit amount must be greater than zero")]
    InvalidAmount,

    #[error("unlock time {unlock_time} is not in the future (now {now})")]
    InvalidUnlockTime { unlock_time: i64, now: i64 },

    #[error("vault holds no funds")]
    EmptyVault,

    #[error("no recovery is pending")]
    RecoveryNotTriggered,

    #[error("no vault exists at {address}")]
    VaultNotFound { address: PublicKey },

    /// The addressed slot is not the canonical derivation for the record's owner.
    #[error("{address} is not a canonical vault address")]
    InvalidVaultAddress { address: PublicKey },

    #[error("invalid account data: {0}")]
    InvalidAccountData(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

impl VaultError {
    /// Whether the same request may succeed later without any other change.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VaultError::NotYetUnlocked { .. })
    }
}
