//! # Key Management
//!
//! Ed25519 keypairs and the 32-byte [`PublicKey`] that names every
//! participant and every account in Timelockr.
//!
//! A `PublicKey` is deliberately *not* guaranteed to be a curve point.
//! Signer identities are (they come from a [`Keypair`]); derived vault
//! addresses are not (see [`crate::address`]). Both live in the same
//! keyspace, the same way both live in the same ledger.
//!
//! Key bytes are never logged. `Debug` on [`Keypair`] only prints the
//! public half.

use curve25519_dalek::edwards::CompressedEdwardsY;
use ed25519_dalek::{
    Signature as DalekSignature, Signer, SigningKey, VerifyingKey, SECRET_KEY_LENGTH,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during key operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid secret key bytes: wrong length or not a valid scalar")]
    InvalidSecretKey,

    #[error("invalid public key bytes: not a valid Ed25519 point")]
    InvalidPublicKey,

    #[error("invalid key encoding: {0}")]
    InvalidEncoding(String),
}

/// An Ed25519 identity keypair.
///
/// Intentionally does not implement `Serialize`. Exporting a secret should
/// be a conscious call to [`secret_key_hex`](Self::secret_key_hex), not a
/// side effect of dumping a struct to JSON.
pub struct Keypair {
    signing_key: SigningKey,
}

/// A 32-byte account identity: a signer's Ed25519 public key or a derived
/// (off-curve) address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct PublicKey([u8; 32]);

/// An Ed25519 signature. Always 64 bytes when produced by a [`Keypair`];
/// anything else simply fails verification.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    bytes: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Keypair
// ---------------------------------------------------------------------------

impl Keypair {
    /// Generate a fresh keypair from the OS CSPRNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Build a keypair deterministically from a 32-byte seed. In Ed25519 the
    /// seed *is* the secret key.
    pub fn from_seed(seed: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Parse a hex-encoded secret key, as written by `timelockr keygen`.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|_| KeyError::InvalidSecretKey)?;
        let seed: [u8; SECRET_KEY_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self::from_seed(&seed))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign a message. Deterministic per RFC 8032: same key and message,
    /// same signature.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature {
            bytes: self.signing_key.sign(message).to_bytes().to_vec(),
        }
    }

    /// Hex-encoded secret key. Handle with care.
    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }
}

impl Clone for Keypair {
    fn clone(&self) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&self.signing_key.to_bytes()),
        }
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair(pub={})", self.public_key())
    }
}

// ---------------------------------------------------------------------------
// PublicKey
// ---------------------------------------------------------------------------

impl PublicKey {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a slice that must be a valid Ed25519 point, i.e. a key somebody
    /// could actually sign with.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; 32] = slice.try_into().map_err(|_| KeyError::InvalidPublicKey)?;
        VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }

    /// Whether these bytes decompress to a point on the Ed25519 curve.
    ///
    /// Derived addresses are required to be off-curve: no private key
    /// exists for them, so only the contract can move their funds.
    pub fn is_on_curve(&self) -> bool {
        CompressedEdwardsY(self.0).decompress().is_some()
    }

    /// Verify an Ed25519 signature made by this key.
    ///
    /// Returns `false` for malformed keys and signatures rather than
    /// distinguishing failure modes. Callers only need yes or no.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let Some(dalek_sig) = signature.to_dalek_signature() else {
            return false;
        };
        verifying_key.verify_strict(message, &dalek_sig).is_ok()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }

    pub fn from_base58(s: &str) -> Result<Self, KeyError> {
        let bytes = bs58::decode(s.trim())
            .into_vec()
            .map_err(|e| KeyError::InvalidEncoding(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidEncoding(format!("expected 32 bytes, got {}", bytes.len())))?;
        Ok(Self(arr))
    }
}

impl From<[u8; 32]> for PublicKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for PublicKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base58(s)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_base58())
    }
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

impl Signature {
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// `None` if the stored bytes aren't exactly 64 long.
    pub fn to_dalek_signature(&self) -> Option<DalekSignature> {
        let arr: [u8; 64] = self.bytes.as_slice().try_into().ok()?;
        Some(DalekSignature::from_bytes(&arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s).map_err(|e| KeyError::InvalidEncoding(e.to_string()))?;
        if bytes.len() != 64 {
            return Err(KeyError::InvalidEncoding(format!(
                "expected 64 signature bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self { bytes })
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_str = self.to_hex();
        if hex_str.len() >= 128 {
            write!(f, "Signature({}...{})", &hex_str[..8], &hex_str[120..])
        } else {
            write!(f, "Signature({})", hex_str)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keypair_sign_verify_roundtrip() {
        let kp = Keypair::generate();
        let msg = b"deposit 1000000";
        let sig = kp.sign(msg);
        assert!(kp.public_key().verify(msg, &sig));
    }

    #[test]
    fn wrong_message_fails_verification() {
        let kp = Keypair::generate();
        let sig = kp.sign(b"correct message");
        assert!(!kp.public_key().verify(b"wrong message", &sig));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let kp1 = Keypair::generate();
        let kp2 = Keypair::generate();
        let sig = kp1.sign(b"message");
        assert!(!kp2.public_key().verify(b"message", &sig));
    }

    #[test]
    fn test_roundtrip_hex() {
        let kp = Keypair::generate();
        let restored = Keypair::from_hex(&kp.secret_key_hex()).unwrap();
        assert_eq!(kp.public_key(), restored.public_key());
    }

    #[test]
    fn test_invalid_hex_rejected() {
        assert_eq!(
            Keypair::from_hex("deadbeef").unwrap_err(),
            KeyError::InvalidSecretKey
        );
        assert!(Keypair::from_hex("not-hex-at-all").is_err());
    }

    #[test]
    fn base58_roundtrip_and_from_str() {
        let pk = Keypair::generate().public_key();
        let parsed: PublicKey = pk.to_base58().parse().unwrap();
        assert_eq!(pk, parsed);
        assert_eq!(pk.to_string(), pk.to_base58());
    }

    #[test]
    fn base58_wrong_length_rejected() {
        let short = bs58::encode([1u8; 16]).into_string();
        assert!(matches!(
            PublicKey::from_base58(&short),
            Err(KeyError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn generated_keys_are_on_curve() {
        let pk = Keypair::generate().public_key();
        assert!(pk.is_on_curve());
        assert!(PublicKey::try_from_slice(pk.as_bytes()).is_ok());
    }

    #[test]
    fn try_from_slice_rejects_wrong_length() {
        assert_eq!(
            PublicKey::try_from_slice(&[0u8; 16]),
            Err(KeyError::InvalidPublicKey)
        );
    }

    #[test]
    fn deterministic_from_seed() {
        let kp1 = Keypair::from_seed(&[42u8; 32]);
        let kp2 = Keypair::from_seed(&[42u8; 32]);
        assert_eq!(kp1.public_key(), kp2.public_key());
        assert_eq!(kp1.sign(b"x"), kp2.sign(b"x"));
    }

    #[test]
    fn truncated_signature_fails_verification() {
        let kp = Keypair::generate();
        let sig = kp.sign(b"msg");
        let truncated = Signature {
            bytes: sig.as_bytes()[..63].to_vec(),
        };
        assert!(!kp.public_key().verify(b"msg", &truncated));
    }

    #[test]
    fn signature_hex_roundtrip() {
        let sig = Keypair::generate().sign(b"test");
        assert_eq!(Signature::from_hex(&sig.to_hex()).unwrap(), sig);
        assert!(Signature::from_hex("abcd").is_err());
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let kp = Keypair::generate();
        let debug_str = format!("{:?}", kp);
        assert!(debug_str.starts_with("Keypair(pub="));
        assert!(!debug_str.contains(&kp.secret_key_hex()));
    }
}
