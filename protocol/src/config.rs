//! # Protocol Configuration & Constants
//!
//! Every magic number in Timelockr lives here. If you're hardcoding a
//! constant somewhere else, you're doing it wrong.
//!
//! Two kinds of values live in this module:
//!
//! - **Constants** that are baked into the record format and the address
//!   derivation scheme. Changing them orphans every existing vault.
//! - **Deployment parameters** ([`VaultConfig`]) that an operator picks once
//!   per deployment. The recovery delay is one of these: the contract logic
//!   reads it from the config and never assumes a particular value.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Address Derivation
// ---------------------------------------------------------------------------

/// Seed tag for vault records. A vault address is a function of
/// (`VAULT_SEED`, owner) and nothing else.
pub const VAULT_SEED: &[u8] = b"vault";

/// Domain separator appended to every derived-address hash. Keeps derived
/// addresses out of the space of any other SHA-256 usage in the system.
pub const DERIVED_ADDRESS_MARKER: &[u8] = b"ProgramDerivedAddress";

/// Maximum length of a single derivation seed.
pub const MAX_SEED_LEN: usize = 32;

/// Maximum number of seeds (excluding the nonce) in one derivation.
pub const MAX_SEEDS: usize = 16;

/// Default deployment identifier mixed into every derivation. Two deployments
/// with different program IDs never share vault addresses.
pub const DEFAULT_PROGRAM_ID: [u8; 32] = *b"timelockr-vault-program-v1\0\0\0\0\0\0";

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Recovery delay used on devnet and in tests, in seconds.
///
/// Production deployments set their own value through [`VaultConfig`].
/// Ten seconds is only long enough to prove the state machine works.
pub const DEFAULT_RECOVERY_DELAY_SECS: i64 = 10;

// ---------------------------------------------------------------------------
// Record Layout
// ---------------------------------------------------------------------------

/// Account discriminator prefix length. Stops a record of one type from
/// being read as another.
pub const DISCRIMINATOR_LENGTH: usize = 8;

/// Packed vault record body: owner(32) + backup(32) + amount(8) +
/// unlock_time(8) + recovery_enabled(1) + recovery_request_time(8) + nonce(1).
pub const VAULT_RECORD_BODY_LENGTH: usize = 90;

/// Full on-disk size of a vault account.
pub const VAULT_ACCOUNT_LENGTH: usize = DISCRIMINATOR_LENGTH + VAULT_RECORD_BODY_LENGTH;

// ---------------------------------------------------------------------------
// Deployment Parameters
// ---------------------------------------------------------------------------

/// Errors from validating a [`VaultConfig`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("recovery delay must be non-negative, got {0}")]
    NegativeRecoveryDelay(i64),
}

/// Parameters fixed for the lifetime of a deployment.
///
/// Persisted alongside the data it governs so a restarted host can't
/// silently change the recovery delay under existing vaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Deployment identifier used in address derivation.
    pub program_id: [u8; 32],
    /// Seconds between a backup's TriggerRecovery and the moment the backup
    /// may withdraw.
    pub recovery_delay_secs: i64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            program_id: DEFAULT_PROGRAM_ID,
            recovery_delay_secs: DEFAULT_RECOVERY_DELAY_SECS,
        }
    }
}

impl VaultConfig {
    /// Default config with a different recovery delay.
    pub fn with_recovery_delay(recovery_delay_secs: i64) -> Self {
        Self {
            recovery_delay_secs,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.recovery_delay_secs < 0 {
            return Err(ConfigError::NegativeRecoveryDelay(self.recovery_delay_secs));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_length_matches_layout() {
        assert_eq!(VAULT_RECORD_BODY_LENGTH, 32 + 32 + 8 + 8 + 1 + 8 + 1);
        assert_eq!(VAULT_ACCOUNT_LENGTH, 98);
    }

    #[test]
    fn default_config_is_valid() {
        let config = VaultConfig::default();
        assert_eq!(config.recovery_delay_secs, DEFAULT_RECOVERY_DELAY_SECS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn negative_delay_rejected() {
        let config = VaultConfig::with_recovery_delay(-1);
        assert_eq!(
            config.validate(),
            Err(ConfigError::NegativeRecoveryDelay(-1))
        );
    }

    #[test]
    fn zero_delay_allowed() {
        assert!(VaultConfig::with_recovery_delay(0).validate().is_ok());
    }
}
