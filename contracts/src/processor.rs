//! # Access Control & Timelock Engine
//!
//! One state machine per vault, on two independent axes:
//!
//! ```text
//! funding:   Uninitialized -> Locked(0) -> Locked(n>0) <-> Unlockable -> Locked(0) -> ...
//! recovery:  NoRecovery --TriggerRecovery--> Pending --(now >= ready_at)--> Ready
//!                 ^                              |
//!                 +-------CancelRecovery---------+
//! ```
//!
//! Every operation checks, in order: the slot is the canonical address for
//! the record's owner, the caller is the right identity and signed, the
//! time condition holds, and only then asks the adapter to move money.
//! Record fields are written last, after the adapter has succeeded.
//!
//! ## Re-triggering recovery
//!
//! TriggerRecovery while already pending or ready resets the timer to
//! `now + recovery_delay`. Only the backup can trigger, so a reset only
//! ever delays the backup itself.
//!
//! ## Self-backup
//!
//! `backup_address == owner` is accepted (and logged). Such a vault simply
//! has two withdrawal paths for the same identity.

use tracing::{debug, info, warn};

use timelockr_protocol::address::{vault_address, verify_vault_address};
use timelockr_protocol::config::VaultConfig;
use timelockr_protocol::crypto::PublicKey;

use crate::adapter::AssetTransferAdapter;
use crate::context::ExecutionContext;
use crate::error::VaultError;
use crate::state::{VaultAccount, VaultRecord};

/// Applies vault operations under a fixed deployment config.
#[derive(Debug, Clone)]
pub struct VaultProcessor {
    config: VaultConfig,
}

impl VaultProcessor {
    /// Build a processor, rejecting an invalid config up front.
    pub fn new(config: VaultConfig) -> Result<Self, VaultError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Canonical vault address and nonce for `owner` in this deployment.
    pub fn vault_address(&self, owner: &PublicKey) -> Result<(PublicKey, u8), VaultError> {
        vault_address(owner, &self.config.program_id)
            .map_err(|_| VaultError::InvalidVaultAddress { address: *owner })
    }

    // -----------------------------------------------------------------------
    // Initialize
    // -----------------------------------------------------------------------

    /// Create the owner's vault record.
    ///
    /// `owner` must have signed, and `vault` must be the slot at the owner's
    /// canonical address. The slot must be empty: a second Initialize for
    /// the same owner fails with [`VaultError::AlreadyInitialized`] no matter
    /// what the existing record holds.
    ///
    /// # Errors
    ///
    /// [`VaultError::Unauthorized`], [`VaultError::InvalidVaultAddress`],
    /// [`VaultError::AlreadyInitialized`], [`VaultError::InvalidUnlockTime`].
    pub fn initialize<C: ExecutionContext>(
        &self,
        ctx: &C,
        owner: &PublicKey,
        vault: &mut VaultAccount,
        unlock_time: i64,
        backup_address: PublicKey,
    ) -> Result<(), VaultError> {
        if !ctx.verify_signer(owner) {
            warn!(%owner, "initialize without owner signature");
            return Err(VaultError::Unauthorized { caller: *owner });
        }

        let (expected, nonce) = self.vault_address(owner)?;
        if expected != vault.address {
            return Err(VaultError::InvalidVaultAddress {
                address: vault.address,
            });
        }

        if vault.is_initialized() {
            warn!(vault = %vault.address, %owner, "vault already initialized");
            return Err(VaultError::AlreadyInitialized {
                address: vault.address,
            });
        }

        let now = ctx.now();
        if unlock_time <= now {
            return Err(VaultError::InvalidUnlockTime { unlock_time, now });
        }

        if backup_address == *owner {
            warn!(%owner, "vault created with the owner as its own backup");
        }

        vault.record = Some(VaultRecord::new(*owner, backup_address, unlock_time, nonce));
        info!(
            vault = %vault.address,
            %owner,
            backup = %backup_address,
            unlock_time,
            "vault initialized"
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Deposit
    // -----------------------------------------------------------------------

    /// Owner moves `amount` from their external account into custody.
    ///
    /// The new balance is computed before the adapter runs, so an
    /// overflowing deposit never moves funds.
    ///
    /// # Errors
    ///
    /// [`VaultError::InvalidAmount`], [`VaultError::VaultNotFound`],
    /// [`VaultError::InvalidVaultAddress`], [`VaultError::Unauthorized`],
    /// [`VaultError::Overflow`], [`VaultError::TransferFailed`].
    pub fn deposit<C: ExecutionContext, A: AssetTransferAdapter>(
        &self,
        ctx: &C,
        caller: &PublicKey,
        vault: &mut VaultAccount,
        adapter: &mut A,
        amount: u64,
    ) -> Result<u64, VaultError> {
        if amount == 0 {
            return Err(VaultError::InvalidAmount);
        }

        let custody = vault.address;
        let record = self.load_record(vault)?;

        if *caller != record.owner || !ctx.verify_signer(caller) {
            warn!(vault = %custody, %caller, "deposit by non-owner");
            return Err(VaultError::Unauthorized { caller: *caller });
        }

        let updated = record.amount.checked_add(amount).ok_or(VaultError::Overflow)?;

        adapter.transfer(caller, &custody, amount)?;
        record.amount = updated;

        info!(vault = %custody, amount, balance = updated, "deposit");
        Ok(updated)
    }

    // -----------------------------------------------------------------------
    // Recovery
    // -----------------------------------------------------------------------

    /// Backup starts the recovery clock: the backup may withdraw from
    /// `now + recovery_delay` on. Returns that instant.
    ///
    /// # Errors
    ///
    /// [`VaultError::VaultNotFound`], [`VaultError::InvalidVaultAddress`],
    /// [`VaultError::Unauthorized`], [`VaultError::Overflow`].
    pub fn trigger_recovery<C: ExecutionContext>(
        &self,
        ctx: &C,
        caller: &PublicKey,
        vault: &mut VaultAccount,
    ) -> Result<i64, VaultError> {
        let address = vault.address;
        let delay = self.config.recovery_delay_secs;
        let record = self.load_record(vault)?;

        if *caller != record.backup_address || !ctx.verify_signer(caller) {
            warn!(vault = %address, %caller, "recovery triggered by non-backup");
            return Err(VaultError::Unauthorized { caller: *caller });
        }

        let ready_at = ctx.now().checked_add(delay).ok_or(VaultError::Overflow)?;

        if record.recovery_enabled {
            debug!(
                vault = %address,
                previous = record.recovery_request_time,
                ready_at,
                "recovery re-triggered, timer reset"
            );
        }

        record.recovery_enabled = true;
        record.recovery_request_time = ready_at;

        info!(vault = %address, ready_at, "recovery triggered");
        Ok(ready_at)
    }

    /// Owner aborts a pending or ready recovery.
    ///
    /// # Errors
    ///
    /// [`VaultError::VaultNotFound`], [`VaultError::InvalidVaultAddress`],
    /// [`VaultError::Unauthorized`], [`VaultError::RecoveryNotTriggered`].
    pub fn cancel_recovery<C: ExecutionContext>(
        &self,
        ctx: &C,
        caller: &PublicKey,
        vault: &mut VaultAccount,
    ) -> Result<(), VaultError> {
        let address = vault.address;
        let record = self.load_record(vault)?;

        if *caller != record.owner || !ctx.verify_signer(caller) {
            warn!(vault = %address, %caller, "recovery cancel by non-owner");
            return Err(VaultError::Unauthorized { caller: *caller });
        }

        if !record.recovery_enabled {
            return Err(VaultError::RecoveryNotTriggered);
        }

        record.recovery_enabled = false;
        record.recovery_request_time = 0;

        info!(vault = %address, "recovery cancelled");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Withdraw
    // -----------------------------------------------------------------------

    /// Move the whole balance to the caller.
    ///
    /// Allowed for the owner once `now >= unlock_time`, or for the backup
    /// once recovery is triggered and `now >= recovery_request_time`. The
    /// balance is zeroed only after the adapter reports success. Returns
    /// the amount withdrawn.
    ///
    /// # Errors
    ///
    /// [`VaultError::VaultNotFound`], [`VaultError::InvalidVaultAddress`],
    /// [`VaultError::Unauthorized`], [`VaultError::NotYetUnlocked`],
    /// [`VaultError::EmptyVault`], [`VaultError::TransferFailed`].
    pub fn withdraw<C: ExecutionContext, A: AssetTransferAdapter>(
        &self,
        ctx: &C,
        caller: &PublicKey,
        vault: &mut VaultAccount,
        adapter: &mut A,
    ) -> Result<u64, VaultError> {
        let custody = vault.address;
        let record = self.load_record(vault)?;

        let is_owner = *caller == record.owner;
        let is_backup = *caller == record.backup_address;
        if !(is_owner || is_backup) || !ctx.verify_signer(caller) {
            warn!(vault = %custody, %caller, "withdraw by unknown identity");
            return Err(VaultError::Unauthorized { caller: *caller });
        }

        let now = ctx.now();
        let owner_path = is_owner && record.owner_unlocked(now);
        let backup_path = is_backup && record.recovery_ready(now);
        if !(owner_path || backup_path) {
            let unlocks_at = earliest_unlock(record, is_owner, is_backup);
            debug!(vault = %custody, %caller, now, ?unlocks_at, "withdraw before unlock");
            return Err(VaultError::NotYetUnlocked { now, unlocks_at });
        }

        let amount = record.amount;
        if amount == 0 {
            return Err(VaultError::EmptyVault);
        }

        adapter.transfer(&custody, caller, amount)?;
        record.amount = 0;

        info!(
            vault = %custody,
            %caller,
            amount,
            via = if owner_path { "owner" } else { "recovery" },
            "withdraw"
        );
        Ok(amount)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// The slot's record, after proving the slot address derives from the
    /// record's owner. Guards against a record copied to a spoofed address.
    fn load_record<'v>(&self, vault: &'v mut VaultAccount) -> Result<&'v mut VaultRecord, VaultError> {
        let address = vault.address;
        let record = vault
            .record
            .as_mut()
            .ok_or(VaultError::VaultNotFound { address })?;

        if !verify_vault_address(
            &address,
            &record.owner,
            record.derivation_nonce,
            &self.config.program_id,
        ) {
            warn!(vault = %address, owner = %record.owner, "vault address does not derive from owner");
            return Err(VaultError::InvalidVaultAddress { address });
        }
        Ok(record)
    }
}

/// Earliest instant at which one of the caller's paths opens.
fn earliest_unlock(record: &VaultRecord, is_owner: bool, is_backup: bool) -> Option<i64> {
    let owner_at = is_owner.then_some(record.unlock_time);
    let backup_at = (is_backup && record.recovery_enabled).then_some(record.recovery_request_time);
    match (owner_at, backup_at) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
