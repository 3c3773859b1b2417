//! # Storage Module
//!
//! Persistence for everything a host needs to survive a restart:
//!
//! ```text
//! db.rs: sled trees for account data, ledger balances, processed
//!         transaction IDs and deployment metadata
//! ```
//!
//! Account data is stored as opaque bytes. The storage layer doesn't know
//! what a vault record looks like; the contract crate packs and unpacks it.
//! Bincode is used for everything structured; JSON is for humans.

pub mod db;

pub use db::{AccountsDb, ChangeSet, DbError, DbResult};
