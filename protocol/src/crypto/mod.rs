//! # Cryptographic Primitives
//!
//! Every signature check and every derived address in Timelockr flows
//! through here. The choices are boring on purpose:
//!
//! - **Ed25519** for identities and signatures.
//! - **SHA-256** for address derivation and account discriminators.
//! - **BLAKE3** for transaction IDs.
//!
//! Everything is a thin, type-safe wrapper around audited implementations.
//! We don't roll our own.

pub mod hash;
pub mod keys;
pub mod signatures;

pub use hash::{blake3_hash, hashv, sha256_array};
pub use keys::{KeyError, Keypair, PublicKey, Signature};
pub use signatures::{sign, verify, verify_raw, SignatureError};
