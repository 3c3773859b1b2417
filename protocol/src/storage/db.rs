//! # AccountsDb: Persistent Storage Engine
//!
//! Built on sled's embedded key-value store. Each concern gets its own tree:
//!
//! | Tree           | Key               | Value                          |
//! |----------------|-------------------|--------------------------------|
//! | `accounts`     | address (32B)     | packed account data            |
//! | `balances`     | address (32B)     | balance (8B BE)                |
//! | `transactions` | tx id (32B)       | empty                          |
//! | `metadata`     | key (UTF-8)       | `bincode(VaultConfig)` etc.    |
//!
//! ## Atomicity
//!
//! A processed transaction touches a vault record, one or two ledger
//! balances and the replay set. [`AccountsDb::commit`] writes all of them
//! in a single sled multi-tree transaction: either every change lands on
//! disk or none does.

use sled::transaction::{ConflictableTransactionResult, TransactionError, Transactional};
use sled::{Db, IVec, Tree};
use std::path::Path;
use tracing::debug;

use crate::config::VaultConfig;
use crate::crypto::keys::PublicKey;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("transaction aborted: {0}")]
    Transaction(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Metadata key holding the pinned deployment config.
const META_VAULT_CONFIG: &[u8] = b"vault_config";

// ---------------------------------------------------------------------------
// ChangeSet
// ---------------------------------------------------------------------------

/// Everything one processed transaction changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Accounts whose data changed, with their new packed bytes.
    pub accounts: Vec<(PublicKey, Vec<u8>)>,
    /// Ledger entries whose balance changed, with their new balance.
    pub balances: Vec<(PublicKey, u64)>,
    /// ID to add to the replay set, if the change came from a signed transaction.
    pub transaction_id: Option<[u8; 32]>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.balances.is_empty() && self.transaction_id.is_none()
    }
}

// ---------------------------------------------------------------------------
// AccountsDb
// ---------------------------------------------------------------------------

/// Persistent storage for accounts, balances and the replay set.
///
/// sled trees are safe to share across threads, so `AccountsDb` is cheap
/// to clone and needs no external locking.
#[derive(Debug, Clone)]
pub struct AccountsDb {
    db: Db,
    accounts: Tree,
    balances: Tree,
    transactions: Tree,
    metadata: Tree,
}

impl AccountsDb {
    /// Open or create a database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// In-memory database, removed on drop. For tests.
    pub fn open_temporary() -> DbResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        Ok(Self {
            accounts: db.open_tree("accounts")?,
            balances: db.open_tree("balances")?,
            transactions: db.open_tree("transactions")?,
            metadata: db.open_tree("metadata")?,
            db,
        })
    }

    // -- Accounts -----------------------------------------------------------

    pub fn get_account(&self, address: &PublicKey) -> DbResult<Option<Vec<u8>>> {
        Ok(self.accounts.get(address.as_bytes())?.map(|v| v.to_vec()))
    }

    /// All stored accounts, in key order.
    pub fn accounts(&self) -> DbResult<Vec<(PublicKey, Vec<u8>)>> {
        self.accounts
            .iter()
            .map(|entry| {
                let (key, value) = entry?;
                Ok((decode_key(&key)?, value.to_vec()))
            })
            .collect()
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    // -- Balances -----------------------------------------------------------

    pub fn get_balance(&self, account: &PublicKey) -> DbResult<u64> {
        match self.balances.get(account.as_bytes())? {
            Some(bytes) => decode_balance(&bytes),
            None => Ok(0),
        }
    }

    pub fn balances(&self) -> DbResult<Vec<(PublicKey, u64)>> {
        self.balances
            .iter()
            .map(|entry| {
                let (key, value) = entry?;
                Ok((decode_key(&key)?, decode_balance(&value)?))
            })
            .collect()
    }

    // -- Replay set ---------------------------------------------------------

    pub fn has_transaction(&self, id: &[u8; 32]) -> DbResult<bool> {
        Ok(self.transactions.contains_key(id)?)
    }

    pub fn transaction_ids(&self) -> DbResult<Vec<[u8; 32]>> {
        self.transactions
            .iter()
            .keys()
            .map(|key| {
                let key = key?;
                let id: [u8; 32] = key
                    .as_ref()
                    .try_into()
                    .map_err(|_| DbError::Serialization("invalid transaction id".to_string()))?;
                Ok(id)
            })
            .collect()
    }

    // -- Metadata -----------------------------------------------------------

    pub fn load_config(&self) -> DbResult<Option<VaultConfig>> {
        match self.metadata.get(META_VAULT_CONFIG)? {
            Some(bytes) => {
                let config = bincode::deserialize(&bytes)
                    .map_err(|e| DbError::Serialization(e.to_string()))?;
                Ok(Some(config))
            }
            None => Ok(None),
        }
    }

    pub fn store_config(&self, config: &VaultConfig) -> DbResult<()> {
        let bytes =
            bincode::serialize(config).map_err(|e| DbError::Serialization(e.to_string()))?;
        self.metadata.insert(META_VAULT_CONFIG, bytes)?;
        self.db.flush()?;
        Ok(())
    }

    // -- Commit -------------------------------------------------------------

    /// Apply a change set atomically across all trees, then flush.
    pub fn commit(&self, changes: &ChangeSet) -> DbResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let result: Result<(), TransactionError<()>> =
            (&self.accounts, &self.balances, &self.transactions).transaction(
                |(accounts, balances, transactions)| -> ConflictableTransactionResult<(), ()> {
                    for (address, data) in &changes.accounts {
                        accounts.insert(address.as_bytes().as_slice(), data.as_slice())?;
                    }
                    for (account, amount) in &changes.balances {
                        balances.insert(
                            account.as_bytes().as_slice(),
                            amount.to_be_bytes().as_slice(),
                        )?;
                    }
                    if let Some(id) = &changes.transaction_id {
                        transactions.insert(id.as_slice(), &[] as &[u8])?;
                    }
                    Ok(())
                },
            );

        result.map_err(|e| match e {
            TransactionError::Storage(err) => DbError::Sled(err),
            TransactionError::Abort(()) => DbError::Transaction("aborted".to_string()),
        })?;

        self.db.flush()?;
        debug!(
            accounts = changes.accounts.len(),
            balances = changes.balances.len(),
            "change set committed"
        );
        Ok(())
    }

    /// Block until all pending writes are durable.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn decode_key(key: &IVec) -> DbResult<PublicKey> {
    let bytes: [u8; 32] = key
        .as_ref()
        .try_into()
        .map_err(|_| DbError::Serialization("invalid account key".to_string()))?;
    Ok(PublicKey::from_bytes(bytes))
}

fn decode_balance(value: &IVec) -> DbResult<u64> {
    let bytes: [u8; 8] = value
        .as_ref()
        .try_into()
        .map_err(|_| DbError::Serialization("invalid balance bytes".to_string()))?;
    Ok(u64::from_be_bytes(bytes))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn key(b: u8) -> PublicKey {
        PublicKey::from_bytes([b; 32])
    }

    #[test]
    fn open_temporary_database() {
        let db = AccountsDb::open_temporary().expect("should create temp db");
        assert_eq!(db.account_count(), 0);
        assert_eq!(db.get_balance(&key(1)).unwrap(), 0);
        assert!(db.load_config().unwrap().is_none());
    }

    #[test]
    fn commit_writes_every_tree() {
        let db = AccountsDb::open_temporary().unwrap();
        let changes = ChangeSet {
            accounts: vec![(key(1), vec![1, 2, 3])],
            balances: vec![(key(1), 500), (key(2), 42)],
            transaction_id: Some([9u8; 32]),
        };
        db.commit(&changes).unwrap();

        assert_eq!(db.get_account(&key(1)).unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(db.get_balance(&key(1)).unwrap(), 500);
        assert_eq!(db.get_balance(&key(2)).unwrap(), 42);
        assert!(db.has_transaction(&[9u8; 32]).unwrap());
        assert!(!db.has_transaction(&[8u8; 32]).unwrap());
        assert_eq!(db.balances().unwrap(), vec![(key(1), 500), (key(2), 42)]);
        assert_eq!(db.transaction_ids().unwrap(), vec![[9u8; 32]]);
    }

    #[test]
    fn commit_overwrites_existing_values() {
        let db = AccountsDb::open_temporary().unwrap();
        db.commit(&ChangeSet {
            accounts: vec![(key(1), vec![1])],
            balances: vec![(key(1), 10)],
            transaction_id: None,
        })
        .unwrap();
        db.commit(&ChangeSet {
            accounts: vec![(key(1), vec![2])],
            balances: vec![(key(1), 0)],
            transaction_id: None,
        })
        .unwrap();

        assert_eq!(db.accounts().unwrap(), vec![(key(1), vec![2])]);
        assert_eq!(db.get_balance(&key(1)).unwrap(), 0);
    }

    #[test]
    fn config_roundtrip() {
        let db = AccountsDb::open_temporary().unwrap();
        let config = VaultConfig::with_recovery_delay(86_400);
        db.store_config(&config).unwrap();
        assert_eq!(db.load_config().unwrap(), Some(config));
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let db = AccountsDb::open(dir.path()).unwrap();
            db.commit(&ChangeSet {
                accounts: vec![(key(3), vec![7; 98])],
                balances: vec![(key(3), 1_000_000)],
                transaction_id: Some([1u8; 32]),
            })
            .unwrap();
        }

        let db = AccountsDb::open(dir.path()).unwrap();
        assert_eq!(db.get_account(&key(3)).unwrap(), Some(vec![7; 98]));
        assert_eq!(db.get_balance(&key(3)).unwrap(), 1_000_000);
        assert!(db.has_transaction(&[1u8; 32]).unwrap());
    }
}
