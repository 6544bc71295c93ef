// src/wallet/key_management.rs
//! Key management for `did:ethr` controllers.
//!
//! A [`KeyManager`] holds the two key kinds an identity can be controlled by:
//! - a secp256k1 key (via `k256`), whose address is the DID's primary address
//! - a BLS12-381 G2 key, used for BBS credential signatures and registry ownership proofs
//!
//! Signatures produced here are over 32-byte digests; hashing the payload is the caller's job.

use ethers::types::Address;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::SecretKey;
use rand::rngs::OsRng;

use crate::bls::keys::BbsKeyPair;
use crate::error::{Error, Result};
use crate::models::did::EthrDid;
use crate::wallet::address::{bbs_address, secp256k1_address};

/// Length of a recoverable ECDSA signature, `r ‖ s ‖ v`.
pub const RECOVERABLE_SIGNATURE_LEN: usize = 65;

/// Key management for one identity.
///
/// # Security Notes
/// - Secret keys are never exposed by `Debug`
/// - Uses the operating system RNG for generation
#[derive(Clone)]
pub struct KeyManager {
    secret_key: SecretKey,
    bbs: BbsKeyPair,
}

impl KeyManager {
    /// Generates a KeyManager with fresh secp256k1 and BBS keys.
    pub fn new() -> Self {
        Self {
            secret_key: SecretKey::random(&mut OsRng),
            bbs: BbsKeyPair::generate(&mut OsRng),
        }
    }

    /// Restores a KeyManager from 32-byte secrets.
    pub fn from_secrets(secp256k1: &[u8], bbs: &[u8]) -> Result<Self> {
        let secret_key = SecretKey::from_slice(secp256k1)
            .map_err(|_| Error::UnknownKeyType("invalid secp256k1 secret".into()))?;
        Ok(Self {
            secret_key,
            bbs: BbsKeyPair::from_secret_bytes(bbs)?,
        })
    }

    pub fn public_key(&self) -> k256::PublicKey {
        self.secret_key.public_key()
    }

    pub fn bbs(&self) -> &BbsKeyPair {
        &self.bbs
    }

    pub fn address(&self) -> Address {
        secp256k1_address(&self.public_key())
    }

    pub fn bbs_address(&self) -> Address {
        bbs_address(self.bbs.public_key())
    }

    /// `did:ethr:[network:]<secp256k1 address>`
    pub fn did(&self, network: Option<&str>) -> EthrDid {
        EthrDid::new(network.map(str::to_string), self.address())
    }

    /// `did:ethr:[network:]<BBS key address>`, an identity whose owner is the BBS key itself.
    pub fn bbs_did(&self, network: Option<&str>) -> EthrDid {
        EthrDid::new(network.map(str::to_string), self.bbs_address())
    }

    /// `did:ethr:[network:]<secp256k1 address>:<BBS key address>`
    pub fn dual_did(&self, network: Option<&str>) -> EthrDid {
        EthrDid::dual(
            network.map(str::to_string),
            self.address(),
            self.bbs_address(),
        )
    }

    /// Signs a 32-byte digest with ECDSA, returning the 65-byte recoverable form.
    pub fn sign_recoverable(&self, digest: &[u8; 32]) -> Result<Vec<u8>> {
        let signing_key = SigningKey::from(&self.secret_key);
        let (signature, recovery_id) = signing_key
            .sign_prehash_recoverable(digest)
            .map_err(|e| Error::VerificationFailed(format!("ecdsa signing: {}", e).into()))?;
        let mut bytes = signature.to_bytes().to_vec();
        bytes.push(recovery_id.to_byte());
        Ok(bytes)
    }
}

impl Default for KeyManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("address", &self.address())
            .field("bbs_address", &self.bbs_address())
            .finish_non_exhaustive()
    }
}

/// Recovers the signer address of a 65-byte recoverable signature over `digest`.
///
/// Returns `None` for malformed signatures; recovery failures are never errors.
pub fn recover_signer(digest: &[u8; 32], signature: &[u8]) -> Option<Address> {
    if signature.len() != RECOVERABLE_SIGNATURE_LEN {
        return None;
    }
    let sig = Signature::from_slice(&signature[..64]).ok()?;
    // Accept both 0/1 and the legacy 27/28 encodings of v.
    let v = signature[64];
    let recovery_id = RecoveryId::from_byte(if v >= 27 { v - 27 } else { v })?;
    let key = VerifyingKey::recover_from_prehash(digest, &sig, recovery_id).ok()?;
    Some(secp256k1_address(&key.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::crypto::hash_data;

    #[test]
    fn test_recoverable_signature_recovers_address() {
        let keys = KeyManager::new();
        let digest = hash_data(b"message");
        let signature = keys.sign_recoverable(&digest).unwrap();
        assert_eq!(signature.len(), RECOVERABLE_SIGNATURE_LEN);
        assert_eq!(recover_signer(&digest, &signature), Some(keys.address()));

        let mut legacy_v = signature.clone();
        legacy_v[64] += 27;
        assert_eq!(recover_signer(&digest, &legacy_v), Some(keys.address()));

        let other = hash_data(b"other");
        assert_ne!(recover_signer(&other, &signature), Some(keys.address()));
        assert_eq!(recover_signer(&digest, &signature[..64]), None);
    }

    #[test]
    fn test_dids_use_derived_addresses() {
        let keys = KeyManager::new();
        let did = keys.did(Some("sepolia"));
        assert_eq!(did.primary(), keys.address());
        let dual = keys.dual_did(None);
        assert_eq!(dual.primary(), keys.address());
        assert_eq!(dual.secondary(), Some(keys.bbs_address()));
        assert_eq!(keys.bbs_did(None).primary(), keys.bbs_address());
    }

    #[test]
    fn test_restore_from_secrets() {
        let keys = KeyManager::new();
        let restored = KeyManager::from_secrets(
            &keys.secret_key.to_bytes(),
            &keys.bbs().secret_bytes(),
        )
        .unwrap();
        assert_eq!(restored.address(), keys.address());
        assert_eq!(restored.bbs_address(), keys.bbs_address());
    }
}
