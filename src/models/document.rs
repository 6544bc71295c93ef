// src/models/document.rs
//! DID Document data model.
//!
//! Follows the structure of the [DID Core Specification](https://www.w3.org/TR/did-core/),
//! restricted to what `did:ethr` documents carry: verification methods holding either a
//! published key or an account reference, the two relationship lists used by credential
//! verification, and services.

use serde::{Deserialize, Serialize};

use crate::models::did::EthrDid;

pub const DID_CONTEXT: &str = "https://www.w3.org/ns/did/v1";

pub const RECOVERY_METHOD_TYPE: &str = "EcdsaSecp256k1RecoveryMethod2020";
pub const SECP256K1_KEY_TYPE: &str = "EcdsaSecp256k1VerificationKey2019";

/// Explicitly registered key types of the BBS / PS / BBDT16 family. A document carrying any of
/// these has "graduated" and no longer receives the implicit BBS key.
pub const BBS_FAMILY_KEY_TYPES: &[&str] = &[
    "Bls12381G2VerificationKeyDock2022",
    "Bls12381BBSVerificationKeyDock2023",
    "Bls12381PSVerificationKeyDock2023",
    "Bls12381BBDT16VerificationKeyDock2024",
    "Bls12381G2Key2020",
];

pub fn is_bbs_family(key_type: &str) -> bool {
    BBS_FAMILY_KEY_TYPES.contains(&key_type)
}

/// A DID Document for a `did:ethr` identifier.
///
/// Documents are produced fresh by every resolution and are not mutated afterwards; see
/// [`with_implicit_key`](crate::services::resolver::with_implicit_key) for the copy-on-extend rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    pub id: EthrDid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<EthrDid>,
    #[serde(default)]
    pub verification_method: Vec<VerificationMethod>,
    #[serde(default)]
    pub authentication: Vec<String>,
    #[serde(default)]
    pub assertion_method: Vec<String>,
    #[serde(default)]
    pub service: Vec<Service>,
}

impl DidDocument {
    pub fn new(id: EthrDid) -> Self {
        Self {
            context: vec![DID_CONTEXT.to_string()],
            id,
            controller: None,
            verification_method: Vec::new(),
            authentication: Vec::new(),
            assertion_method: Vec::new(),
            service: Vec::new(),
        }
    }

    pub fn verification_method(&self, id: &str) -> Option<&VerificationMethod> {
        self.verification_method.iter().find(|m| m.id == id)
    }

    pub fn is_assertion_method(&self, id: &str) -> bool {
        self.assertion_method.iter().any(|m| m == id)
    }

    pub fn is_authentication(&self, id: &str) -> bool {
        self.authentication.iter().any(|m| m == id)
    }

    /// `true` when at least one explicit BBS-family key is registered.
    pub fn has_explicit_bbs_key(&self) -> bool {
        self.verification_method
            .iter()
            .any(|m| is_bbs_family(&m.type_))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub controller: String,
    /// `eip155:<chainId>:<address>` account reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blockchain_account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_hex: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub service_endpoint: String,
}

/// Splits `eip155:<chainId>:<address>` into its chain id and address parts.
pub fn parse_account_id(account_id: &str) -> Option<(u64, &str)> {
    let mut parts = account_id.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("eip155"), Some(chain), Some(address)) => Some((chain.parse().ok()?, address)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_account_id() {
        assert_eq!(
            parse_account_id("eip155:1:0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"),
            Some((1, "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"))
        );
        assert_eq!(parse_account_id("cosmos:1:abc"), None);
        assert_eq!(parse_account_id("eip155:x:0xabc"), None);
    }

    #[test]
    fn test_document_serializes_camel_case() {
        let did = EthrDid::parse("did:ethr:0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed").unwrap();
        let mut doc = DidDocument::new(did.clone());
        doc.verification_method.push(VerificationMethod {
            id: did.controller_id(),
            type_: RECOVERY_METHOD_TYPE.to_string(),
            controller: did.to_string(),
            blockchain_account_id: Some("eip155:1:0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".into()),
            public_key_hex: None,
        });
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["@context"][0], DID_CONTEXT);
        assert_eq!(
            json["verificationMethod"][0]["blockchainAccountId"],
            "eip155:1:0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        );
        assert!(json["verificationMethod"][0].get("publicKeyHex").is_none());

        let back: DidDocument = serde_json::from_value(json).unwrap();
        assert_eq!(back, doc);
    }
}
