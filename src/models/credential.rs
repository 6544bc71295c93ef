// src/models/credential.rs
//! Verifiable Credential data model and verification results.
//!
//! Follows the [W3C Verifiable Credentials Data Model](https://www.w3.org/TR/vc-data-model/)
//! closely enough for `did:ethr` issuers: the proof may embed the signer's public key so that a
//! verifier can recover the issuer address without a document fetch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::did::EthrDid;

pub const CREDENTIALS_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";

/// A Verifiable Credential according to W3C standards.
///
/// # Security Considerations
/// - `proof.public_key` is attacker controlled until its derived address has been compared with
///   the issuer DID
/// - Claims are covered by the signature through the canonical signing input
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerifiableCredential {
    #[serde(rename = "@context")]
    pub context: Vec<String>,

    /// Unique URI identifier for the credential
    /// Example: "urn:uuid:123e4567-e89b-12d3-a456-426614174000"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "type")]
    pub types: Vec<String>,

    /// DID of the credential issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    pub issuance_date: DateTime<Utc>,

    /// Credential claims, including the subject's `id`.
    pub credential_subject: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<CredentialProof>,
}

impl VerifiableCredential {
    pub fn new(issuer: &EthrDid, credential_subject: serde_json::Value) -> Self {
        Self {
            context: vec![CREDENTIALS_CONTEXT.to_string()],
            id: None,
            types: vec!["VerifiableCredential".to_string()],
            issuer: Some(issuer.to_string()),
            issuance_date: Utc::now(),
            credential_subject,
            proof: None,
        }
    }

    /// Parses the issuer DID, if the credential names a `did:ethr` issuer.
    pub fn issuer_did(&self) -> Option<EthrDid> {
        self.issuer
            .as_deref()
            .and_then(|issuer| EthrDid::parse(issuer).ok())
    }

    /// Copy of the credential with the proof removed, the part covered by the signature.
    pub fn unsigned(&self) -> Self {
        Self {
            proof: None,
            ..self.clone()
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialProof {
    #[serde(rename = "type")]
    pub type_: String,
    /// DID URL of the verification method, e.g. `did:ethr:0x..#keys-bbs`.
    pub verification_method: String,
    pub proof_purpose: String,
    pub created: DateTime<Utc>,
    /// Hex encoded public key of the signer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    /// Base64 signature over the signing input.
    #[serde(default)]
    pub proof_value: String,
}

impl CredentialProof {
    /// Proof options covered by the signature, i.e. everything but `proof_value`.
    pub fn options(&self) -> Self {
        Self {
            proof_value: String::new(),
            ..self.clone()
        }
    }
}

/// The three resolution tiers, in the order the pipeline attempts them.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Tier {
    EmbeddedKey,
    OptimisticDocument,
    Ledger,
}

/// Outcome of one tier.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum TierOutcome {
    Verified,
    /// The tier had nothing to work with (no embedded key, malformed key, no ledger...).
    Inapplicable { reason: String },
    /// The embedded key derives to an address other than the identifier's.
    AddressMismatch { expected: String, derived: String },
    /// The verification method does not resolve, or is not authorized for the proof purpose.
    MethodNotFound { method: String },
    SignatureInvalid,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TierResult {
    pub tier: Tier,
    #[serde(flatten)]
    pub outcome: TierOutcome,
}

/// Structured verification result. A failed verification is a value, never an error.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct VerificationResult {
    pub verified: bool,
    pub results: Vec<TierResult>,
}

impl VerificationResult {
    pub fn push(&mut self, tier: Tier, outcome: TierOutcome) {
        if outcome == TierOutcome::Verified {
            self.verified = true;
        }
        self.results.push(TierResult { tier, outcome });
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            verified: false,
            results: vec![TierResult {
                tier: Tier::EmbeddedKey,
                outcome: TierOutcome::Inapplicable {
                    reason: reason.into(),
                },
            }],
        }
    }

    /// Tiers that were attempted, in order.
    pub fn tiers(&self) -> Vec<Tier> {
        self.results.iter().map(|r| r.tier).collect()
    }

    /// Appends the results of a retry, keeping the earlier attempts visible.
    pub fn extend(&mut self, other: VerificationResult) {
        self.verified |= other.verified;
        self.results.extend(other.results);
    }
}
