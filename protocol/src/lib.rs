// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Timelockr Protocol Core Primitives
//!
//! Everything the timelock vault contract leans on but does not own.
//! Identities and their signatures, the derived address a vault lives at,
//! the ledger that moves value, and the storage that survives a restart.
//!
//! ## Architecture
//!
//! - **config**: Constants and deployment parameters. One place for magic numbers.
//! - **crypto**: Ed25519 identities, signatures, SHA-256 and BLAKE3.
//! - **address**: Deterministic derived addresses (the "one vault per owner" guarantee).
//! - **ledger**: A checked token ledger backing the asset transfer seam.
//! - **storage**: sled persistence for account data, balances and processed transactions.
//!
//! ## Design Philosophy
//!
//! 1. Money is `u64` and arithmetic is checked. Always.
//! 2. No unsafe code. The workspace doesn't need it.
//! 3. Derived addresses are off-curve, so nobody holds a key for them.

pub mod address;
pub mod config;
pub mod crypto;
pub mod ledger;
pub mod storage;
