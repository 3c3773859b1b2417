//! # Digital Signatures
//!
//! Free-function entry points for signing and verification. The host
//! runtime checks every transaction through [`verify`] before the contract
//! ever sees a signer identity.
//!
//! Verification is strict (`verify_strict`): non-canonical encodings and
//! small-order keys are rejected. Stricter is safer.

use ed25519_dalek::{Signature as DalekSignature, VerifyingKey};
use thiserror::Error;

use super::keys::{Keypair, PublicKey, Signature};

/// Errors during signature operations.
///
/// Intentionally vague. We don't tell attackers why verification failed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature verification failed")]
    VerificationFailed,

    #[error("invalid public key")]
    InvalidPublicKey,
}

/// Sign a message with a keypair.
pub fn sign(keypair: &Keypair, message: &[u8]) -> Signature {
    keypair.sign(message)
}

/// Verify a signature. `true` if valid, `false` otherwise.
///
/// # Example
///
/// ```
/// use timelockr_protocol::crypto::{sign, verify, Keypair};
///
/// let keypair = Keypair::generate();
/// let signature = sign(&keypair, b"withdraw");
/// assert!(verify(&keypair.public_key(), b"withdraw", &signature));
/// ```
pub fn verify(public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
    public_key.verify(message, signature)
}

/// Verify from raw wire bytes.
pub fn verify_raw(
    public_key_bytes: &[u8; 32],
    message: &[u8],
    signature_bytes: &[u8; 64],
) -> Result<(), SignatureError> {
    let verifying_key =
        VerifyingKey::from_bytes(public_key_bytes).map_err(|_| SignatureError::InvalidPublicKey)?;
    let signature = DalekSignature::from_bytes(signature_bytes);
    verifying_key
        .verify_strict(message, &signature)
        .map_err(|_| SignatureError::VerificationFailed)
}
