//! # Hashing Utilities
//!
//! Two hash functions, two jobs:
//!
//! - **SHA-256**: address derivation and account discriminators. These
//!   values are part of the persisted format, so we pick the hash every
//!   other ecosystem can reproduce.
//! - **BLAKE3**: transaction IDs and anything else that never leaves the
//!   process boundary as a format commitment.

use sha2::{Digest, Sha256};

/// SHA-256 of a single byte slice, as a fixed-size array.
pub fn sha256_array(data: &[u8]) -> [u8; 32] {
    hashv(&[data])
}

/// SHA-256 over several slices fed sequentially into one hasher.
///
/// Equivalent to hashing the concatenation, without building the
/// concatenation. Derivation hashes are always built this way.
pub fn hashv(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// BLAKE3 digest of the input.
///
/// # Example
///
/// ```
/// use timelockr_protocol::crypto::blake3_hash;
///
/// let hash = blake3_hash(b"timelockr");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        // SHA-256 of the empty string.
        let hash = sha256_array(b"");
        let expected =
            hex::decode("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
                .unwrap();
        assert_eq!(hash.as_slice(), expected.as_slice());
    }

    #[test]
    fn hashv_equals_hash_of_concatenation() {
        let multi = hashv(&[b"vault", b" ", b"owner"]);
        let single = sha256_array(b"vault owner");
        assert_eq!(multi, single);
    }

    #[test]
    fn blake3_deterministic() {
        let a = blake3_hash(b"timelockr");
        let b = blake3_hash(b"timelockr");
        assert_eq!(a, b);
    }

    #[test]
    fn blake3_and_sha256_differ() {
        assert_ne!(blake3_hash(b"vault"), sha256_array(b"vault"));
    }
}
