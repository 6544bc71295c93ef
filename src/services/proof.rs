// src/services/proof.rs
//! Credential proof primitives shared by issuance and verification.

use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{Signature, VerifyingKey};
use serde_json::json;

use crate::bls::signature::verify as bls_verify;
use crate::error::Result;
use crate::models::credential::{CredentialProof, VerifiableCredential};
use crate::utils::crypto::hash_data;
use crate::utils::serialization::canonical_json;
use crate::wallet::key_material::KeyMaterial;

/// Proof type of credentials signed with a BLS12-381 (BBS) key.
pub const BBS_SIGNATURE_TYPE: &str = "Bls12381BBSSignatureDock2023";

/// Proof type of credentials signed with a recoverable secp256k1 signature.
pub const ECDSA_RECOVERY_SIGNATURE_TYPE: &str = "EcdsaSecp256k1RecoverySignature2020";

pub const ASSERTION_METHOD: &str = "assertionMethod";

/// The 32-byte digest a proof signs: the credential without its proof, together with the proof
/// options, as canonical JSON.
pub fn signing_input(credential: &VerifiableCredential, proof: &CredentialProof) -> Result<[u8; 32]> {
    let payload = json!({
        "credential": credential.unsigned(),
        "proof": proof.options(),
    });
    Ok(hash_data(&canonical_json(&payload)?))
}

/// Signature check for one key kind.
///
/// This is the seam a selective-disclosure library plugs into; the verification pipeline only
/// decides *which* key to check a proof against.
pub trait ProofVerifier: Send + Sync {
    fn verify(&self, key: &KeyMaterial, message: &[u8; 32], signature: &[u8]) -> bool;
}

/// Verifies ECDSA signatures with `k256` and BBS-key signatures as BLS signatures in G1.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultProofVerifier;

impl ProofVerifier for DefaultProofVerifier {
    fn verify(&self, key: &KeyMaterial, message: &[u8; 32], signature: &[u8]) -> bool {
        match key {
            KeyMaterial::Secp256k1(public_key) => {
                // r ‖ s, optionally followed by a recovery byte
                if signature.len() != 64 && signature.len() != 65 {
                    return false;
                }
                let Ok(signature) = Signature::from_slice(&signature[..64]) else {
                    return false;
                };
                VerifyingKey::from(public_key)
                    .verify_prehash(message, &signature)
                    .is_ok()
            }
            KeyMaterial::BbsCompressed(public_key) | KeyMaterial::BbsUncompressed(public_key) => {
                bls_verify(signature, message, &public_key.point())
            }
        }
    }
}
