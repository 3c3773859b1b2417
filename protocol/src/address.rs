//! # Derived Addresses
//!
//! A vault's address is a pure function of its owner:
//!
//! ```text
//! address = SHA-256(seed_1 || ... || seed_n || [nonce] || program_id || "ProgramDerivedAddress")
//! ```
//!
//! with the extra rule that the result must **not** be a valid Ed25519
//! point. Nobody holds a private key for an off-curve address, so the only
//! way to move funds out of it is through the contract.
//!
//! The nonce is searched from 255 downwards and the first one that lands
//! off-curve is the *canonical* nonce. Verification only accepts the
//! canonical nonce, so each owner maps to exactly one address. That is
//! the whole "one vault per owner" guarantee: a second Initialize for the
//! same owner lands on the same address and finds it occupied.

use thiserror::Error;
use tracing::trace;

use crate::config::{DERIVED_ADDRESS_MARKER, MAX_SEEDS, MAX_SEED_LEN, VAULT_SEED};
use crate::crypto::hash::hashv;
use crate::crypto::keys::PublicKey;

/// Errors from address derivation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DerivationError {
    /// The hash for this nonce is a valid curve point; try another nonce.
    #[error("derived address lies on the ed25519 curve")]
    OnCurve,

    #[error("seed of {0} bytes exceeds the maximum seed length")]
    SeedTooLong(usize),

    #[error("{0} seeds exceed the maximum seed count")]
    TooManySeeds(usize),

    /// Every nonce in 0..=255 produced an on-curve point. Astronomically
    /// unlikely; reported rather than looped on.
    #[error("no viable nonce found for the given seeds")]
    NoViableNonce,
}

/// Derive the address for a specific nonce.
///
/// Fails with [`DerivationError::OnCurve`] if the candidate is a curve point.
pub fn create_derived_address(
    seeds: &[&[u8]],
    nonce: u8,
    program_id: &[u8; 32],
) -> Result<PublicKey, DerivationError> {
    if seeds.len() > MAX_SEEDS {
        return Err(DerivationError::TooManySeeds(seeds.len()));
    }
    if let Some(seed) = seeds.iter().find(|s| s.len() > MAX_SEED_LEN) {
        return Err(DerivationError::SeedTooLong(seed.len()));
    }

    let nonce_bytes = [nonce];
    let mut parts: Vec<&[u8]> = Vec::with_capacity(seeds.len() + 3);
    parts.extend_from_slice(seeds);
    parts.push(&nonce_bytes);
    parts.push(program_id);
    parts.push(DERIVED_ADDRESS_MARKER);

    let candidate = PublicKey::from_bytes(hashv(&parts));
    if candidate.is_on_curve() {
        return Err(DerivationError::OnCurve);
    }
    Ok(candidate)
}

/// Find the canonical (highest viable) nonce and its address.
pub fn find_derived_address(
    seeds: &[&[u8]],
    program_id: &[u8; 32],
) -> Result<(PublicKey, u8), DerivationError> {
    for nonce in (0..=u8::MAX).rev() {
        match create_derived_address(seeds, nonce, program_id) {
            Ok(address) => return Ok((address, nonce)),
            Err(DerivationError::OnCurve) => {
                trace!(nonce, "derived candidate on curve, trying next nonce");
            }
            Err(e) => return Err(e),
        }
    }
    Err(DerivationError::NoViableNonce)
}

/// The vault address and canonical nonce for `owner`.
pub fn vault_address(
    owner: &PublicKey,
    program_id: &[u8; 32],
) -> Result<(PublicKey, u8), DerivationError> {
    find_derived_address(&[VAULT_SEED, owner.as_ref()], program_id)
}

/// Check that `address` is the canonical vault address of `owner` and that
/// `nonce` is the canonical nonce.
///
/// A non-canonical nonce that happens to produce an off-curve point is
/// rejected. Accepting it would let one owner control up to 256 vaults.
pub fn verify_vault_address(
    address: &PublicKey,
    owner: &PublicKey,
    nonce: u8,
    program_id: &[u8; 32],
) -> bool {
    match vault_address(owner, program_id) {
        Ok((expected, canonical)) => expected == *address && canonical == nonce,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_PROGRAM_ID;
    use crate::crypto::keys::Keypair;

    #[test]
    fn vault_address_is_deterministic() {
        let owner = Keypair::generate().public_key();
        let a = vault_address(&owner, &DEFAULT_PROGRAM_ID).unwrap();
        let b = vault_address(&owner, &DEFAULT_PROGRAM_ID).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn vault_address_is_off_curve() {
        for _ in 0..16 {
            let owner = Keypair::generate().public_key();
            let (address, _) = vault_address(&owner, &DEFAULT_PROGRAM_ID).unwrap();
            assert!(!address.is_on_curve());
        }
    }

    #[test]
    fn different_owners_get_different_addresses() {
        let a = Keypair::generate().public_key();
        let b = Keypair::generate().public_key();
        let (addr_a, _) = vault_address(&a, &DEFAULT_PROGRAM_ID).unwrap();
        let (addr_b, _) = vault_address(&b, &DEFAULT_PROGRAM_ID).unwrap();
        assert_ne!(addr_a, addr_b);
    }

    #[test]
    fn program_id_separates_deployments() {
        let owner = Keypair::generate().public_key();
        let (a, _) = vault_address(&owner, &DEFAULT_PROGRAM_ID).unwrap();
        let (b, _) = vault_address(&owner, &[7u8; 32]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn verify_accepts_canonical_derivation() {
        let owner = Keypair::generate().public_key();
        let (address, nonce) = vault_address(&owner, &DEFAULT_PROGRAM_ID).unwrap();
        assert!(verify_vault_address(&address, &owner, nonce, &DEFAULT_PROGRAM_ID));
    }

    #[test]
    fn verify_rejects_foreign_owner() {
        let owner = Keypair::generate().public_key();
        let other = Keypair::generate().public_key();
        let (address, nonce) = vault_address(&owner, &DEFAULT_PROGRAM_ID).unwrap();
        assert!(!verify_vault_address(&address, &other, nonce, &DEFAULT_PROGRAM_ID));
    }

    #[test]
    fn verify_rejects_non_canonical_nonce() {
        let owner = Keypair::generate().public_key();
        let (address, nonce) = vault_address(&owner, &DEFAULT_PROGRAM_ID).unwrap();
        // Find some other nonce that also yields an off-curve address.
        let alternative = (0..nonce).rev().find_map(|n| {
            create_derived_address(&[VAULT_SEED, owner.as_ref()], n, &DEFAULT_PROGRAM_ID)
                .ok()
                .map(|addr| (addr, n))
        });
        if let Some((alt_address, alt_nonce)) = alternative {
            assert!(!verify_vault_address(
                &alt_address,
                &owner,
                alt_nonce,
                &DEFAULT_PROGRAM_ID
            ));
        }
        assert!(!verify_vault_address(
            &address,
            &owner,
            nonce.wrapping_sub(1),
            &DEFAULT_PROGRAM_ID
        ));
    }

    #[test]
    fn oversized_seed_rejected() {
        let long = [0u8; 33];
        assert_eq!(
            create_derived_address(&[&long], 255, &DEFAULT_PROGRAM_ID),
            Err(DerivationError::SeedTooLong(33))
        );
    }

    #[test]
    fn too_many_seeds_rejected() {
        let seed: &[u8] = b"s";
        let seeds = vec![seed; 17];
        assert_eq!(
            find_derived_address(&seeds, &DEFAULT_PROGRAM_ID),
            Err(DerivationError::TooManySeeds(17))
        );
    }
}
