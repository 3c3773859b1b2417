//! Instructions and the signed transactions that carry them.
//!
//! A [`Transaction`] names one vault slot, one instruction and the identity
//! that signed it. The runtime checks the signature, then hands the
//! instruction to the processor with the signer as the caller.
//!
//! The signing payload is a hand-rolled fixed layout rather than a serde
//! encoding, so it stays stable if the instruction enum grows new variants.

use serde::{Deserialize, Serialize};
use std::fmt;

use timelockr_protocol::crypto::{blake3_hash, Keypair, PublicKey, Signature};

/// Domain tag prefixed to every signing payload.
const SIGNING_DOMAIN: &[u8] = b"timelockr-tx-v1";

// ---------------------------------------------------------------------------
// Instruction
// ---------------------------------------------------------------------------

/// One operation on one vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// Create the signer's vault. The transaction's `vault` must be the
    /// signer's canonical vault address.
    Initialize {
        unlock_time: i64,
        backup_address: PublicKey,
    },
    /// Owner moves `amount` units into custody.
    Deposit { amount: u64 },
    /// Backup starts the recovery clock.
    TriggerRecovery,
    /// Owner or backup takes the full balance.
    Withdraw,
    /// Owner aborts a pending recovery.
    CancelRecovery,
}

impl Instruction {
    fn tag(&self) -> u8 {
        match self {
            Self::Initialize { .. } => 0,
            Self::Deposit { .. } => 1,
            Self::TriggerRecovery => 2,
            Self::Withdraw => 3,
            Self::CancelRecovery => 4,
        }
    }

    fn write_signable(&self, buf: &mut Vec<u8>) {
        buf.push(self.tag());
        match self {
            Self::Initialize {
                unlock_time,
                backup_address,
            } => {
                buf.extend_from_slice(&unlock_time.to_le_bytes());
                buf.extend_from_slice(backup_address.as_bytes());
            }
            Self::Deposit { amount } => buf.extend_from_slice(&amount.to_le_bytes()),
            Self::TriggerRecovery | Self::Withdraw | Self::CancelRecovery => {}
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialize { .. } => write!(f, "Initialize"),
            Self::Deposit { .. } => write!(f, "Deposit"),
            Self::TriggerRecovery => write!(f, "TriggerRecovery"),
            Self::Withdraw => write!(f, "Withdraw"),
            Self::CancelRecovery => write!(f, "CancelRecovery"),
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A signed request to apply one [`Instruction`] to one vault slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Target vault slot.
    pub vault: PublicKey,
    pub instruction: Instruction,
    /// Identity that signed; becomes the operation's caller.
    pub signer: PublicKey,
    /// Caller-chosen value that makes otherwise identical requests distinct.
    /// Two transactions with equal fields have equal IDs and the second is
    /// rejected as a replay.
    pub nonce: u64,
    /// Ed25519 signature over [`Transaction::signable_bytes`].
    pub signature: Option<Signature>,
}

impl Transaction {
    /// Unsigned transaction.
    pub fn new(vault: PublicKey, instruction: Instruction, signer: PublicKey, nonce: u64) -> Self {
        Self {
            vault,
            instruction,
            signer,
            nonce,
            signature: None,
        }
    }

    /// Build and sign in one step. The signer is the keypair's public key.
    pub fn new_signed(
        vault: PublicKey,
        instruction: Instruction,
        keypair: &Keypair,
        nonce: u64,
    ) -> Self {
        let mut tx = Self::new(vault, instruction, keypair.public_key(), nonce);
        tx.sign(keypair);
        tx
    }

    /// Canonical signing payload. Excludes the signature.
    ///
    /// Layout: domain tag, vault (32), signer (32), nonce (8 LE), then the
    /// instruction tag byte and its fixed-width fields.
    pub fn signable_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(128);
        buf.extend_from_slice(SIGNING_DOMAIN);
        buf.extend_from_slice(self.vault.as_bytes());
        buf.extend_from_slice(self.signer.as_bytes());
        buf.extend_from_slice(&self.nonce.to_le_bytes());
        self.instruction.write_signable(&mut buf);
        buf
    }

    /// Transaction ID: `blake3(signable_bytes)`. Independent of the signature.
    pub fn id(&self) -> [u8; 32] {
        blake3_hash(&self.signable_bytes())
    }

    pub fn id_hex(&self) -> String {
        hex::encode(self.id())
    }

    /// Sign in place. Does not change `signer`; a keypair that doesn't match
    /// it produces a transaction that fails verification.
    pub fn sign(&mut self, keypair: &Keypair) {
        self.signature = Some(keypair.sign(&self.signable_bytes()));
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// Whether `signature` is a valid signature by `signer` over the payload.
    pub fn verify_signature(&self) -> bool {
        match &self.signature {
            Some(sig) => self.signer.verify(&self.signable_bytes(), sig),
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> PublicKey {
        PublicKey::from_bytes([5; 32])
    }

    #[test]
    fn signed_transaction_verifies() {
        let kp = Keypair::generate();
        let tx = Transaction::new_signed(vault(), Instruction::Deposit { amount: 10 }, &kp, 1);
        assert!(tx.is_signed());
        assert!(tx.verify_signature());
    }

    #[test]
    fn unsigned_transaction_fails_verification() {
        let kp = Keypair::generate();
        let tx = Transaction::new(vault(), Instruction::Withdraw, kp.public_key(), 1);
        assert!(!tx.verify_signature());
    }

    #[test]
    fn tampered_instruction_fails_verification() {
        let kp = Keypair::generate();
        let mut tx = Transaction::new_signed(vault(), Instruction::Deposit { amount: 10 }, &kp, 1);
        tx.instruction = Instruction::Deposit { amount: 10_000 };
        assert!(!tx.verify_signature());
    }

    #[test]
    fn signature_by_another_key_fails() {
        let owner = Keypair::generate();
        let thief = Keypair::generate();
        let mut tx = Transaction::new(vault(), Instruction::Withdraw, owner.public_key(), 1);
        tx.sign(&thief);
        assert!(!tx.verify_signature());
    }

    #[test]
    fn signing_does_not_change_id() {
        let kp = Keypair::generate();
        let mut tx = Transaction::new(vault(), Instruction::TriggerRecovery, kp.public_key(), 7);
        let before = tx.id();
        tx.sign(&kp);
        assert_eq!(tx.id(), before);
        assert_eq!(tx.id_hex().len(), 64);
    }

    #[test]
    fn nonce_and_instruction_change_id() {
        let kp = Keypair::generate();
        let a = Transaction::new(vault(), Instruction::Withdraw, kp.public_key(), 1);
        let b = Transaction::new(vault(), Instruction::Withdraw, kp.public_key(), 2);
        let c = Transaction::new(vault(), Instruction::CancelRecovery, kp.public_key(), 1);
        assert_ne!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn transaction_json_roundtrip() {
        let kp = Keypair::generate();
        let tx = Transaction::new_signed(
            vault(),
            Instruction::Initialize {
                unlock_time: 1_700_000_000,
                backup_address: PublicKey::from_bytes([6; 32]),
            },
            &kp,
            3,
        );
        let json = serde_json::to_string(&tx).unwrap();
        let back: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tx);
        assert!(back.verify_signature());
    }
}
