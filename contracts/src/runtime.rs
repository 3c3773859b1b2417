//! # In-Process Runtime
//!
//! The host side of the contract. The runtime owns the clock, the vault
//! records and the token ledger, and it is the only thing that turns a
//! signed [`Transaction`] into state changes.
//!
//! ## Transaction pipeline
//!
//! ```text
//! Transaction
//!   -> replay check (transaction id already processed?)
//!   -> signature check (signer really signed the payload?)
//!   -> clock read, once
//!   -> processor runs against a cloned slot and a StagedLedger
//!   -> Ok:  Receipt (new record + touched balances), then apply / persist
//!      Err: everything staged is dropped
//! ```
//!
//! Staging is what makes each operation all-or-nothing. The processor
//! never sees the live state, so a rejected operation has nothing to undo.
//!
//! ## Persistence
//!
//! A [`Receipt`] converts into a storage [`ChangeSet`].
//! [`Runtime::process_and_persist`] writes that change set before touching
//! memory, so the in-memory bank never runs ahead of disk.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use timelockr_protocol::config::VaultConfig;
use timelockr_protocol::crypto::PublicKey;
use timelockr_protocol::ledger::{TokenLedger, TransferError};
use timelockr_protocol::storage::{AccountsDb, ChangeSet, DbError};

use crate::adapter::StagedLedger;
use crate::context::InvocationContext;
use crate::error::VaultError;
use crate::instruction::{Instruction, Transaction};
use crate::processor::VaultProcessor;
use crate::state::{VaultAccount, VaultRecord};

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of unix time for the runtime.
pub trait Clock {
    fn unix_timestamp(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn unix_timestamp(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(now)),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn unix_timestamp(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("transaction signature is missing or invalid")]
    InvalidSignature,

    #[error("transaction {id} was already processed")]
    DuplicateTransaction { id: String },

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("storage error: {0}")]
    Storage(#[from] DbError),
}

impl RuntimeError {
    /// The contract error behind this failure, if there is one.
    pub fn vault_error(&self) -> Option<&VaultError> {
        match self {
            RuntimeError::Vault(e) => Some(e),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Bank
// ---------------------------------------------------------------------------

/// All live state: vault records by address and the token ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bank {
    vaults: BTreeMap<PublicKey, VaultRecord>,
    ledger: TokenLedger,
}

impl Bank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild state from persisted accounts and balances.
    pub fn load(db: &AccountsDb) -> Result<Self, RuntimeError> {
        let mut bank = Self::new();
        for (address, data) in db.accounts()? {
            bank.vaults.insert(address, VaultRecord::unpack(&data)?);
        }
        for (account, balance) in db.balances()? {
            bank.ledger.set_balance(account, balance);
        }
        debug!(
            vaults = bank.vaults.len(),
            "bank loaded from storage"
        );
        Ok(bank)
    }

    pub fn vault(&self, address: &PublicKey) -> Option<&VaultRecord> {
        self.vaults.get(address)
    }

    pub fn vaults(&self) -> impl Iterator<Item = (&PublicKey, &VaultRecord)> {
        self.vaults.iter()
    }

    pub fn ledger(&self) -> &TokenLedger {
        &self.ledger
    }

    pub fn balance_of(&self, account: &PublicKey) -> u64 {
        self.ledger.balance_of(account)
    }

    /// Issue units to an external account. Not a vault operation; this is
    /// how a devnet or a test funds its participants.
    pub fn mint(&mut self, account: &PublicKey, amount: u64) -> Result<u64, TransferError> {
        self.ledger.mint(account, amount)
    }

    fn slot(&self, address: &PublicKey) -> VaultAccount {
        VaultAccount {
            address: *address,
            record: self.vaults.get(address).cloned(),
        }
    }

    fn apply(&mut self, receipt: &Receipt) {
        self.vaults.insert(receipt.vault, receipt.record.clone());
        for (account, balance) in &receipt.balances {
            self.ledger.set_balance(*account, *balance);
        }
    }
}

// ---------------------------------------------------------------------------
// Receipt
// ---------------------------------------------------------------------------

/// What a successful instruction produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Initialized { unlock_time: i64 },
    Deposited { amount: u64, balance: u64 },
    RecoveryTriggered { ready_at: i64 },
    RecoveryCancelled,
    Withdrawn { amount: u64 },
}

/// Result of one successfully processed transaction: everything it changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_id: [u8; 32],
    pub vault: PublicKey,
    pub outcome: Outcome,
    /// The vault record after the operation.
    pub record: VaultRecord,
    /// New balances of every ledger account the operation touched.
    pub balances: Vec<(PublicKey, u64)>,
}

impl Receipt {
    /// Storage changes for this receipt, including the replay-set entry.
    pub fn change_set(&self) -> Result<ChangeSet, VaultError> {
        Ok(ChangeSet {
            accounts: vec![(self.vault, self.record.pack()?)],
            balances: self.balances.clone(),
            transaction_id: Some(self.transaction_id),
        })
    }
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

/// Applies signed transactions to a [`Bank`] under one deployment config.
pub struct Runtime<C: Clock> {
    processor: VaultProcessor,
    clock: C,
    bank: Bank,
    processed: HashSet<[u8; 32]>,
}

impl<C: Clock> Runtime<C> {
    /// Empty runtime.
    pub fn new(config: VaultConfig, clock: C) -> Result<Self, RuntimeError> {
        Self::with_state(config, clock, Bank::new(), HashSet::new())
    }

    pub fn with_state(
        config: VaultConfig,
        clock: C,
        bank: Bank,
        processed: HashSet<[u8; 32]>,
    ) -> Result<Self, RuntimeError> {
        Ok(Self {
            processor: VaultProcessor::new(config)?,
            clock,
            bank,
            processed,
        })
    }

    /// Runtime over everything persisted in `db`, including its replay set.
    pub fn load(config: VaultConfig, clock: C, db: &AccountsDb) -> Result<Self, RuntimeError> {
        let bank = Bank::load(db)?;
        let processed = db.transaction_ids()?.into_iter().collect();
        Self::with_state(config, clock, bank, processed)
    }

    pub fn processor(&self) -> &VaultProcessor {
        &self.processor
    }

    pub fn bank(&self) -> &Bank {
        &self.bank
    }

    pub fn bank_mut(&mut self) -> &mut Bank {
        &mut self.bank
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn now(&self) -> i64 {
        self.clock.unix_timestamp()
    }

    /// Canonical vault address for `owner`.
    pub fn vault_address(&self, owner: &PublicKey) -> Result<PublicKey, RuntimeError> {
        Ok(self.processor.vault_address(owner)?.0)
    }

    /// Process a transaction and apply it to memory.
    pub fn process_transaction(&mut self, tx: &Transaction) -> Result<Receipt, RuntimeError> {
        let receipt = self.stage(tx)?;
        self.apply(&receipt);
        Ok(receipt)
    }

    /// Process a transaction, write its changes to `db` atomically, then
    /// apply them to memory. A storage failure leaves memory untouched.
    pub fn process_and_persist(
        &mut self,
        tx: &Transaction,
        db: &AccountsDb,
    ) -> Result<Receipt, RuntimeError> {
        let receipt = self.stage(tx)?;
        db.commit(&receipt.change_set()?)?;
        self.apply(&receipt);
        Ok(receipt)
    }

    /// Run `tx` against staged copies of the state. Nothing live changes.
    fn stage(&self, tx: &Transaction) -> Result<Receipt, RuntimeError> {
        let id = tx.id();
        if self.processed.contains(&id) {
            warn!(tx = %hex::encode(id), "replayed transaction rejected");
            return Err(RuntimeError::DuplicateTransaction {
                id: hex::encode(id),
            });
        }
        if !tx.verify_signature() {
            warn!(tx = %hex::encode(id), signer = %tx.signer, "invalid signature");
            return Err(RuntimeError::InvalidSignature);
        }

        let ctx = InvocationContext::new(self.clock.unix_timestamp(), vec![tx.signer]);
        let mut slot = self.bank.slot(&tx.vault);
        let mut ledger = StagedLedger::new(&self.bank.ledger);
        let caller = &tx.signer;
        let p = &self.processor;

        let result = match &tx.instruction {
            Instruction::Initialize {
                unlock_time,
                backup_address,
            } => p
                .initialize(&ctx, caller, &mut slot, *unlock_time, *backup_address)
                .map(|()| Outcome::Initialized {
                    unlock_time: *unlock_time,
                }),
            Instruction::Deposit { amount } => p
                .deposit(&ctx, caller, &mut slot, &mut ledger, *amount)
                .map(|balance| Outcome::Deposited {
                    amount: *amount,
                    balance,
                }),
            Instruction::TriggerRecovery => p
                .trigger_recovery(&ctx, caller, &mut slot)
                .map(|ready_at| Outcome::RecoveryTriggered { ready_at }),
            Instruction::Withdraw => p
                .withdraw(&ctx, caller, &mut slot, &mut ledger)
                .map(|amount| Outcome::Withdrawn { amount }),
            Instruction::CancelRecovery => p
                .cancel_recovery(&ctx, caller, &mut slot)
                .map(|()| Outcome::RecoveryCancelled),
        };

        let outcome = result.map_err(|e| {
            debug!(tx = %hex::encode(id), instruction = %tx.instruction, error = %e, "transaction rejected");
            e
        })?;

        let record = slot.record.ok_or(VaultError::VaultNotFound { address: tx.vault })?;
        Ok(Receipt {
            transaction_id: id,
            vault: tx.vault,
            outcome,
            record,
            balances: ledger.into_changes(),
        })
    }

    fn apply(&mut self, receipt: &Receipt) {
        self.bank.apply(receipt);
        self.processed.insert(receipt.transaction_id);
        info!(
            tx = %hex::encode(receipt.transaction_id),
            vault = %receipt.vault,
            outcome = ?receipt.outcome,
            "transaction applied"
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
