// src/services/credential_issuer.rs
//! Credential Issuer Service
//!
//! Signs Verifiable Credentials on behalf of a `did:ethr` identity. Two proof kinds are produced:
//! - BBS-key proofs referencing the implicit `#keys-bbs` method, with the compressed G2 key
//!   embedded so verifiers can check the issuer without fetching a document
//! - recoverable ECDSA proofs referencing `#controller`
//!
//! The issuer refuses to sign with a key that does not control the method it would reference.

use chrono::Utc;
use k256::elliptic_curve::sec1::ToEncodedPoint;

use crate::error::{Error, Result};
use crate::models::credential::{CredentialProof, VerifiableCredential};
use crate::models::did::{EthrDid, IMPLICIT_BBS_FRAGMENT};
use crate::services::proof::{
    signing_input, ASSERTION_METHOD, BBS_SIGNATURE_TYPE, ECDSA_RECOVERY_SIGNATURE_TYPE,
};
use crate::utils::crypto::checksummed;
use crate::utils::serialization::{to_base64, to_hex};
use crate::wallet::key_management::KeyManager;

/// Issues credentials for one identity.
pub struct CredentialIssuer {
    /// Identity named as `issuer` in every credential
    did: EthrDid,
    /// Keys of the identity
    keys: KeyManager,
}

impl CredentialIssuer {
    /// Creates a new CredentialIssuer instance
    ///
    /// # Arguments
    /// * `did` - Issuer identity
    /// * `keys` - Key pair set; at least one of its addresses must be an address of `did`
    ///
    /// # Errors
    /// `PreconditionError` if neither key is bound to the identity.
    pub fn new(did: EthrDid, keys: KeyManager) -> Result<Self> {
        let addresses = [Some(did.primary()), did.secondary()];
        let controls = addresses
            .iter()
            .flatten()
            .any(|a| *a == keys.address() || *a == keys.bbs_address());
        if !controls {
            return Err(Error::PreconditionError(
                format!("keys do not control {}", did).into(),
            ));
        }
        Ok(Self { did, keys })
    }

    pub fn did(&self) -> &EthrDid {
        &self.did
    }

    /// Issues a credential signed with the BBS key.
    ///
    /// # Arguments
    /// * `credential` - Unsigned credential; its issuer is overwritten with this identity
    ///
    /// # Returns
    /// The credential with a `Bls12381BBSSignatureDock2023` proof embedding the compressed key
    ///
    /// # Errors
    /// `PreconditionError` if the BBS key's address is not the address `#keys-bbs` binds to.
    pub fn issue_bbs(&self, credential: VerifiableCredential) -> Result<VerifiableCredential> {
        let bound = self.did.address_for_fragment(Some(IMPLICIT_BBS_FRAGMENT));
        if bound != self.keys.bbs_address() {
            return Err(Error::PreconditionError(
                format!(
                    "BBS key address {} is not {}",
                    checksummed(&self.keys.bbs_address()),
                    checksummed(&bound)
                )
                .into(),
            ));
        }
        let public_key = to_hex(&self.keys.bbs().public_key().to_compressed());
        self.sign(
            credential,
            BBS_SIGNATURE_TYPE,
            self.did.implicit_bbs_id(),
            Some(public_key),
            |digest| self.keys.bbs().sign(digest),
        )
    }

    /// Issues a credential with a 65-byte recoverable ECDSA signature over `#controller`.
    ///
    /// # Arguments
    /// * `credential` - Unsigned credential
    /// * `embed_key` - Whether to embed the compressed secp256k1 key in the proof
    ///
    /// # Errors
    /// `PreconditionError` if the secp256k1 key is not the identity's primary address.
    pub fn issue_ecdsa(
        &self,
        credential: VerifiableCredential,
        embed_key: bool,
    ) -> Result<VerifiableCredential> {
        if self.did.primary() != self.keys.address() {
            return Err(Error::PreconditionError(
                format!("secp256k1 key does not control {}", self.did).into(),
            ));
        }
        let public_key =
            embed_key.then(|| to_hex(self.keys.public_key().to_encoded_point(true).as_bytes()));
        self.sign(
            credential,
            ECDSA_RECOVERY_SIGNATURE_TYPE,
            self.did.controller_id(),
            public_key,
            |digest| self.keys.sign_recoverable(digest),
        )
    }

    fn sign(
        &self,
        mut credential: VerifiableCredential,
        proof_type: &str,
        verification_method: String,
        public_key: Option<String>,
        signer: impl FnOnce(&[u8; 32]) -> Result<Vec<u8>>,
    ) -> Result<VerifiableCredential> {
        credential.issuer = Some(self.did.to_string());
        credential.proof = None;
        let mut proof = CredentialProof {
            type_: proof_type.to_string(),
            verification_method,
            proof_purpose: ASSERTION_METHOD.to_string(),
            created: Utc::now(),
            public_key,
            proof_value: String::new(),
        };
        let digest = signing_input(&credential, &proof)?;
        proof.proof_value = to_base64(&signer(&digest)?);
        log::debug!("issued {} proof for {}", proof.type_, self.did);
        credential.proof = Some(proof);
        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn unsigned(did: &EthrDid) -> VerifiableCredential {
        VerifiableCredential::new(did, json!({"id": "did:example:holder", "degree": "BSc"}))
    }

    #[test]
    fn test_rejects_foreign_keys() {
        let did = KeyManager::new().did(None);
        assert!(matches!(
            CredentialIssuer::new(did, KeyManager::new()),
            Err(Error::PreconditionError(_))
        ));
    }

    #[test]
    fn test_bbs_proof_embeds_compressed_key() {
        let keys = KeyManager::new();
        let did = keys.bbs_did(None);
        let issuer = CredentialIssuer::new(did.clone(), keys.clone()).unwrap();
        let credential = issuer.issue_bbs(unsigned(&did)).unwrap();
        let proof = credential.proof.as_ref().unwrap();
        assert_eq!(proof.verification_method, did.implicit_bbs_id());
        assert_eq!(
            proof.public_key,
            Some(to_hex(&keys.bbs().public_key().to_compressed()))
        );
        assert!(!proof.proof_value.is_empty());
    }

    #[test]
    fn test_bbs_proof_needs_bound_key() {
        let keys = KeyManager::new();
        let issuer = CredentialIssuer::new(keys.did(None), keys.clone()).unwrap();
        assert!(matches!(
            issuer.issue_bbs(unsigned(&keys.did(None))),
            Err(Error::PreconditionError(_))
        ));

        // a dual identity binds #keys-bbs to its secondary address
        let dual = CredentialIssuer::new(keys.dual_did(None), keys.clone()).unwrap();
        assert!(dual.issue_bbs(unsigned(&keys.dual_did(None))).is_ok());
    }

    #[test]
    fn test_ecdsa_proof_references_controller() {
        let keys = KeyManager::new();
        let did = keys.did(Some("sepolia"));
        let issuer = CredentialIssuer::new(did.clone(), keys).unwrap();
        let credential = issuer.issue_ecdsa(unsigned(&did), false).unwrap();
        let proof = credential.proof.unwrap();
        assert_eq!(proof.verification_method, did.controller_id());
        assert_eq!(proof.type_, ECDSA_RECOVERY_SIGNATURE_TYPE);
        assert!(proof.public_key.is_none());
    }
}
