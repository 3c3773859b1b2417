//! # Vault Record
//!
//! The durable state of one owner's vault and the addressed slot it lives in.
//!
//! ## Packed format
//!
//! ```text
//! [0..8)   discriminator   sha256("account:VaultRecord")[..8]
//! [8..40)  owner
//! [40..72) backup_address
//! [72..80) amount                  u64 LE
//! [80..88) unlock_time             i64 LE
//! [88]     recovery_enabled        0 | 1
//! [89..97) recovery_request_time   i64 LE
//! [97]     derivation_nonce
//! ```
//!
//! The body is bincode's fixed-width little-endian encoding of the struct
//! fields in declaration order, so field order here *is* the wire format.

use serde::{Deserialize, Serialize};
use timelockr_protocol::config::{
    DISCRIMINATOR_LENGTH, VAULT_ACCOUNT_LENGTH, VAULT_RECORD_BODY_LENGTH,
};
use timelockr_protocol::crypto::{sha256_array, PublicKey};

use crate::error::VaultError;

/// Where a vault sits on the recovery axis at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryState {
    NoRecovery,
    /// Triggered; the backup may withdraw from `ready_at` on.
    Pending { ready_at: i64 },
    Ready,
}

/// Persisted per-owner vault state.
///
/// `owner`, `backup_address`, `unlock_time` and `derivation_nonce` are set
/// once by Initialize and never written again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultRecord {
    pub owner: PublicKey,
    pub backup_address: PublicKey,
    /// Custodied units. Always equals deposits minus withdrawals.
    pub amount: u64,
    pub unlock_time: i64,
    pub recovery_enabled: bool,
    /// Zero unless `recovery_enabled`.
    pub recovery_request_time: i64,
    /// Canonical nonce proving the record's address derives from `owner`.
    pub derivation_nonce: u8,
}

impl VaultRecord {
    pub fn new(owner: PublicKey, backup_address: PublicKey, unlock_time: i64, nonce: u8) -> Self {
        Self {
            owner,
            backup_address,
            amount: 0,
            unlock_time,
            recovery_enabled: false,
            recovery_request_time: 0,
            derivation_nonce: nonce,
        }
    }

    /// Account discriminator: first 8 bytes of `sha256("account:VaultRecord")`.
    pub fn discriminator() -> [u8; DISCRIMINATOR_LENGTH] {
        let hash = sha256_array(b"account:VaultRecord");
        let mut out = [0u8; DISCRIMINATOR_LENGTH];
        out.copy_from_slice(&hash[..DISCRIMINATOR_LENGTH]);
        out
    }

    /// Serialize to the 98-byte account format.
    pub fn pack(&self) -> Result<Vec<u8>, VaultError> {
        let body =
            bincode::serialize(self).map_err(|e| VaultError::InvalidAccountData(e.to_string()))?;
        if body.len() != VAULT_RECORD_BODY_LENGTH {
            return Err(VaultError::InvalidAccountData(format!(
                "packed body is {} bytes, expected {}",
                body.len(),
                VAULT_RECORD_BODY_LENGTH
            )));
        }
        let mut out = Vec::with_capacity(VAULT_ACCOUNT_LENGTH);
        out.extend_from_slice(&Self::discriminator());
        out.extend_from_slice(&body);
        Ok(out)
    }

    pub fn unpack(data: &[u8]) -> Result<Self, VaultError> {
        if data.len() != VAULT_ACCOUNT_LENGTH {
            return Err(VaultError::InvalidAccountData(format!(
                "account is {} bytes, expected {}",
                data.len(),
                VAULT_ACCOUNT_LENGTH
            )));
        }
        let (disc, body) = data.split_at(DISCRIMINATOR_LENGTH);
        if disc != Self::discriminator() {
            return Err(VaultError::InvalidAccountData(
                "discriminator mismatch".to_string(),
            ));
        }
        let record: Self =
            bincode::deserialize(body).map_err(|e| VaultError::InvalidAccountData(e.to_string()))?;
        if !record.recovery_enabled && record.recovery_request_time != 0 {
            return Err(VaultError::InvalidAccountData(
                "recovery time set without recovery enabled".to_string(),
            ));
        }
        Ok(record)
    }

    /// Owner path: open once `now >= unlock_time`, and stays open.
    pub fn owner_unlocked(&self, now: i64) -> bool {
        now >= self.unlock_time
    }

    /// Backup path: triggered and the delay has elapsed.
    pub fn recovery_ready(&self, now: i64) -> bool {
        self.recovery_enabled && now >= self.recovery_request_time
    }

    /// Recovery axis evaluated at `now`. `Ready` is a predicate over time,
    /// never a stored transition.
    pub fn recovery_state(&self, now: i64) -> RecoveryState {
        if !self.recovery_enabled {
            RecoveryState::NoRecovery
        } else if now >= self.recovery_request_time {
            RecoveryState::Ready
        } else {
            RecoveryState::Pending {
                ready_at: self.recovery_request_time,
            }
        }
    }
}

/// An addressed slot that may or may not hold a vault record.
///
/// This is what the processor operates on: the host loads the slot at the
/// transaction's target address, hands it over, and persists it afterwards
/// only if the operation succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultAccount {
    pub address: PublicKey,
    pub record: Option<VaultRecord>,
}

impl VaultAccount {
    pub fn empty(address: PublicKey) -> Self {
        Self {
            address,
            record: None,
        }
    }

    pub fn with_record(address: PublicKey, record: VaultRecord) -> Self {
        Self {
            address,
            record: Some(record),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.record.is_some()
    }
}
