//! # Timelockr Vault Contract
//!
//! Custody with two keys and a clock:
//!
//! - The **owner** deposits, and withdraws everything once `unlock_time`
//!   has passed.
//! - The **backup** can trigger recovery; after the configured recovery
//!   delay the backup may withdraw too. The owner can cancel a pending
//!   recovery.
//!
//! ## Layout
//!
//! - [`state`]: the persisted [`VaultRecord`](state::VaultRecord) and its packed format.
//! - [`processor`]: the access-control and timelock engine.
//! - [`context`] / [`adapter`]: the seams to the host. Time and signer
//!   checks come in through one, value moves out through the other.
//! - [`instruction`]: signed transactions carrying one instruction each.
//! - [`runtime`]: an in-process host that applies transactions atomically.
//!
//! ## Design Principles
//!
//! 1. All monetary operations are checked. Overflow is an error, never a wrap.
//! 2. Authorization first, then time, then money.
//! 3. A rejected operation changes nothing. The processor stages, the
//!    runtime commits.

pub mod adapter;
pub mod context;
pub mod error;
pub mod instruction;
pub mod processor;
pub mod runtime;
pub mod state;

pub use error::VaultError;
pub use processor::VaultProcessor;
pub use state::{RecoveryState, VaultAccount, VaultRecord};
