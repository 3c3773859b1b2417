//! # Execution Context
//!
//! What the contract needs from its host and refuses to implement itself:
//! the current time and proof of who signed.
//!
//! The host guarantees that [`ExecutionContext::verify_signer`] only returns
//! `true` for identities whose signature it has checked, and that every
//! operation is applied all-or-nothing. The contract assumes both.

use timelockr_protocol::crypto::PublicKey;

/// Capabilities the host lends to one invocation.
pub trait ExecutionContext {
    /// Current unix timestamp in seconds, from the host's clock source.
    /// Read-only; the contract never advances or adjusts it.
    fn now(&self) -> i64;

    /// Whether `identity` signed the transaction being processed.
    fn verify_signer(&self, identity: &PublicKey) -> bool;
}

/// A fixed snapshot of time and verified signers for one transaction.
///
/// Hosts must only list signers whose signatures they have verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationContext {
    now: i64,
    signers: Vec<PublicKey>,
}

impl InvocationContext {
    pub fn new(now: i64, signers: Vec<PublicKey>) -> Self {
        Self { now, signers }
    }

    pub fn signers(&self) -> &[PublicKey] {
        &self.signers
    }
}

impl ExecutionContext for InvocationContext {
    fn now(&self) -> i64 {
        self.now
    }

    fn verify_signer(&self, identity: &PublicKey) -> bool {
        self.signers.contains(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_listed_signers_verify() {
        let signer = PublicKey::from_bytes([1; 32]);
        let stranger = PublicKey::from_bytes([2; 32]);
        let ctx = InvocationContext::new(1_000, vec![signer]);

        assert_eq!(ctx.now(), 1_000);
        assert!(ctx.verify_signer(&signer));
        assert!(!ctx.verify_signer(&stranger));
    }
}
