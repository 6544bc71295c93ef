// src/services/verifier.rs
//! Credential verification service.
//!
//! Verification is optimistic: most issuers never touch the registry, so their document can be
//! computed from the identifier, and proofs often embed the signing key so even that is not
//! needed. The ledger is consulted only when the cheaper tiers fail, or when the issuer is known
//! to be stale.
//!
//! # Tier state machine
//!
//! | state                | entered when                               | on success | on failure                     |
//! |----------------------|--------------------------------------------|------------|--------------------------------|
//! | `EmbeddedKey`        | first, unless ledger-only                  | done       | `OptimisticDocument`           |
//! | `OptimisticDocument` | embedded key did not verify                | done       | `Ledger` if permitted, or done |
//! | `Ledger`             | permitted after tier 2, or ledger-only     | done       | done                           |
//!
//! Every visited state records a [`TierResult`](crate::models::credential::TierResult). Signature
//! and address failures are values in the returned [`VerificationResult`]; only precondition
//! violations and ledger transport failures are errors.

use std::sync::Arc;

use ethers::types::Address;

use crate::blockchain::ledger::LedgerResolver;
use crate::config::Networks;
use crate::error::{Error, Result};
use crate::models::credential::{
    CredentialProof, Tier, TierOutcome, VerifiableCredential, VerificationResult,
};
use crate::models::did::{split_did_url, EthrDid};
use crate::models::document::{parse_account_id, DidDocument};
use crate::services::proof::{signing_input, DefaultProofVerifier, ProofVerifier, ASSERTION_METHOD};
use crate::services::resolver::default_document;
use crate::storage::staleness_cache::StalenessCache;
use crate::utils::crypto::{address_matches, checksummed};
use crate::utils::serialization::{from_base64, from_hex};
use crate::wallet::key_management::{recover_signer, RECOVERABLE_SIGNATURE_LEN};
use crate::wallet::key_material::KeyMaterial;

/// What the proof's embedded public key turned out to be.
#[derive(Clone, Debug)]
enum Embedded {
    Absent,
    /// Bad encoding, unsupported length or not a curve point.
    Malformed(String),
    /// Derives to an address other than the one the verification method is bound to. A
    /// mismatched key is unusable for every tier.
    Mismatch { expected: Address, derived: Address },
    Matched(KeyMaterial),
}

/// Everything the tiers need about one proof, computed once.
struct ProofContext {
    issuer: EthrDid,
    method_id: String,
    proof_purpose: String,
    digest: [u8; 32],
    /// `None` when the proof value is not valid base64.
    signature: Option<Vec<u8>>,
    embedded: Embedded,
}

impl ProofContext {
    /// `None` when the verification method belongs to another identifier.
    fn new(
        credential: &VerifiableCredential,
        proof: &CredentialProof,
        issuer: EthrDid,
    ) -> Result<Option<Self>> {
        let (method_did, fragment) = split_did_url(&proof.verification_method);
        if EthrDid::parse(method_did).ok().as_ref() != Some(&issuer) {
            return Ok(None);
        }
        // document ids are checksummed; the proof may spell the DID in any case
        let method_id = match fragment {
            Some(fragment) => issuer.method_id(fragment),
            None => issuer.to_string(),
        };
        let embedded = classify_embedded(proof, issuer.address_for_fragment(fragment));
        Ok(Some(Self {
            method_id,
            proof_purpose: proof.proof_purpose.clone(),
            digest: signing_input(credential, proof)?,
            signature: from_base64(&proof.proof_value),
            embedded,
            issuer,
        }))
    }
}

fn foreign_method(proof: &CredentialProof, issuer: &EthrDid) -> VerificationResult {
    VerificationResult::failed(format!(
        "verification method {} does not belong to {}",
        proof.verification_method, issuer
    ))
}

fn classify_embedded(proof: &CredentialProof, expected: Address) -> Embedded {
    let Some(encoded) = proof.public_key.as_deref() else {
        return Embedded::Absent;
    };
    let key = match from_hex(encoded).and_then(|bytes| KeyMaterial::from_bytes(&bytes)) {
        Ok(key) => key,
        Err(e) => return Embedded::Malformed(e.to_string()),
    };
    let derived = key.address();
    if derived == expected {
        Embedded::Matched(key)
    } else {
        Embedded::Mismatch { expected, derived }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    EmbeddedKey,
    OptimisticDocument,
    Ledger,
}

/// Which tiers a run may visit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Tiers 1 and 2, then tier 3 if `ledger` is set.
    Tiered { ledger: bool },
    /// Tier 3 only.
    LedgerOnly,
}

/// Runs the tier state machine for one proof.
struct TieredVerifier<'a> {
    resolver: &'a dyn LedgerResolver,
    proof_verifier: &'a dyn ProofVerifier,
    chain_hint: Option<u64>,
}

impl TieredVerifier<'_> {
    async fn run(&self, ctx: &ProofContext, mode: Mode) -> Result<VerificationResult> {
        let mut result = VerificationResult::default();
        let mut state = Some(match mode {
            Mode::Tiered { .. } => State::EmbeddedKey,
            Mode::LedgerOnly => State::Ledger,
        });
        let ledger_permitted = matches!(mode, Mode::LedgerOnly | Mode::Tiered { ledger: true });

        while let Some(current) = state {
            let (tier, outcome) = match current {
                State::EmbeddedKey => (Tier::EmbeddedKey, self.embedded_key(ctx)),
                State::OptimisticDocument => {
                    let document = default_document(&ctx.issuer, self.chain_hint);
                    (Tier::OptimisticDocument, self.in_document(ctx, &document))
                }
                State::Ledger => (Tier::Ledger, self.ledger(ctx).await?),
            };
            log::debug!("{:?} tier for {}: {:?}", tier, ctx.method_id, outcome);
            let verified = outcome == TierOutcome::Verified;
            result.push(tier, outcome);
            state = match (current, verified) {
                (_, true) => None,
                (State::EmbeddedKey, false) => Some(State::OptimisticDocument),
                (State::OptimisticDocument, false) if ledger_permitted => Some(State::Ledger),
                _ => None,
            };
        }
        Ok(result)
    }

    /// Tier 1: the embedded key, checked against the identifier's own address.
    fn embedded_key(&self, ctx: &ProofContext) -> TierOutcome {
        match &ctx.embedded {
            Embedded::Absent => TierOutcome::Inapplicable {
                reason: "proof embeds no public key".into(),
            },
            Embedded::Malformed(reason) => TierOutcome::Inapplicable {
                reason: reason.clone(),
            },
            Embedded::Mismatch { expected, derived } => TierOutcome::AddressMismatch {
                expected: checksummed(expected),
                derived: checksummed(derived),
            },
            Embedded::Matched(key) => self.check_signature(ctx, key),
        }
    }

    /// Tier 3: the authoritative document. Attempted at most once per run.
    async fn ledger(&self, ctx: &ProofContext) -> Result<TierOutcome> {
        if !self.resolver.supports(&ctx.issuer) {
            return Ok(TierOutcome::Inapplicable {
                reason: format!("no ledger resolver for {}", ctx.issuer),
            });
        }
        log::info!("resolving {} from the ledger", ctx.issuer);
        let document = self.resolver.resolve(&ctx.issuer).await?;
        Ok(self.in_document(ctx, &document))
    }

    /// Tiers 2 and 3: resolve the verification method in `document` and check the signature
    /// with what it publishes.
    fn in_document(&self, ctx: &ProofContext, document: &DidDocument) -> TierOutcome {
        if let Embedded::Mismatch { expected, derived } = &ctx.embedded {
            return TierOutcome::AddressMismatch {
                expected: checksummed(expected),
                derived: checksummed(derived),
            };
        }
        let authorized = match ctx.proof_purpose.as_str() {
            ASSERTION_METHOD => document.is_assertion_method(&ctx.method_id),
            "authentication" => document.is_authentication(&ctx.method_id),
            _ => false,
        };
        if !authorized {
            return TierOutcome::MethodNotFound {
                method: ctx.method_id.clone(),
            };
        }

        if ctx.method_id == document.id.implicit_bbs_id() {
            // the implicit key has no published material; only a matching embedded BBS key
            // can satisfy it
            return match &ctx.embedded {
                Embedded::Matched(key) if key.is_bbs() => self.check_signature(ctx, key),
                _ => TierOutcome::Inapplicable {
                    reason: "implicit BBS key requires a matching embedded key".into(),
                },
            };
        }

        let Some(method) = document.verification_method(&ctx.method_id) else {
            return TierOutcome::MethodNotFound {
                method: ctx.method_id.clone(),
            };
        };
        if let Some(published) = method.public_key_hex.as_deref() {
            return match from_hex(published).and_then(|bytes| KeyMaterial::from_bytes(&bytes)) {
                Ok(key) => self.check_signature(ctx, &key),
                Err(e) => TierOutcome::Inapplicable {
                    reason: format!("published key: {}", e),
                },
            };
        }
        if let Some(account) = method.blockchain_account_id.as_deref() {
            let Some((_, address)) = parse_account_id(account) else {
                return TierOutcome::Inapplicable {
                    reason: format!("unparseable account id {}", account),
                };
            };
            return match ctx.signature.as_deref() {
                Some(signature) if signature.len() == RECOVERABLE_SIGNATURE_LEN => {
                    match recover_signer(&ctx.digest, signature) {
                        Some(signer) if address_matches(&signer, address) => TierOutcome::Verified,
                        _ => TierOutcome::SignatureInvalid,
                    }
                }
                _ => TierOutcome::SignatureInvalid,
            };
        }
        TierOutcome::Inapplicable {
            reason: format!("{} publishes no key material", method.id),
        }
    }

    fn check_signature(&self, ctx: &ProofContext, key: &KeyMaterial) -> TierOutcome {
        match ctx.signature.as_deref() {
            Some(signature) if self.proof_verifier.verify(key, &ctx.digest, signature) => {
                TierOutcome::Verified
            }
            _ => TierOutcome::SignatureInvalid,
        }
    }
}

/// Optimistic credential verifier.
///
/// Holds the injected collaborators: the ledger resolver (required), a staleness cache and the
/// proof verifier. Cloning shares them.
#[derive(Clone)]
pub struct OptimisticVerifier {
    resolver: Option<Arc<dyn LedgerResolver>>,
    cache: Option<Arc<dyn StalenessCache>>,
    proof_verifier: Arc<dyn ProofVerifier>,
    networks: Option<Networks>,
}

impl Default for OptimisticVerifier {
    fn default() -> Self {
        Self {
            resolver: None,
            cache: None,
            proof_verifier: Arc::new(DefaultProofVerifier),
            networks: None,
        }
    }
}

impl OptimisticVerifier {
    /// Creates a verifier backed by `resolver`.
    pub fn new(resolver: Arc<dyn LedgerResolver>) -> Self {
        Self {
            resolver: Some(resolver),
            ..Self::default()
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn StalenessCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_proof_verifier(mut self, proof_verifier: Arc<dyn ProofVerifier>) -> Self {
        self.proof_verifier = proof_verifier;
        self
    }

    /// Networks used as chain id hints for default documents.
    pub fn with_networks(mut self, networks: Networks) -> Self {
        self.networks = Some(networks);
        self
    }

    /// Verifies a credential.
    ///
    /// # Arguments
    /// * `credential` - Credential whose `issuer` is a `did:ethr` identifier
    ///
    /// # Returns
    /// A [`VerificationResult`] listing every tier that ran. A stale issuer (in the cache) goes
    /// straight to the ledger; otherwise tiers 1-2 run and, on failure, the issuer is marked
    /// stale and the ledger tier runs once.
    ///
    /// A proof whose verification method belongs to another identifier fails before any tier
    /// runs: no tier can resolve it, so the issuer is neither marked stale nor fetched from the
    /// ledger.
    ///
    /// # Errors
    /// - `PreconditionError` if no resolver is configured or the issuer is missing or not a
    ///   `did:ethr` identifier; checked before any tier runs
    /// - ledger and cache failures, unchanged
    pub async fn verify(&self, credential: &VerifiableCredential) -> Result<VerificationResult> {
        let resolver = self.resolver.as_deref().ok_or_else(|| {
            Error::PreconditionError("optimistic verification requires a ledger resolver".into())
        })?;
        let issuer = match credential.issuer.as_deref() {
            None => return Err(Error::PreconditionError("credential has no issuer".into())),
            Some(issuer) => EthrDid::parse(issuer).map_err(|e| {
                Error::PreconditionError(format!("issuer {}: {}", issuer, e).into())
            })?,
        };
        let Some(proof) = credential.proof.as_ref() else {
            return Ok(VerificationResult::failed("credential has no proof"));
        };
        let tiers = TieredVerifier {
            resolver,
            proof_verifier: self.proof_verifier.as_ref(),
            chain_hint: self
                .networks
                .as_ref()
                .and_then(|networks| networks.chain_id_hint(&issuer)),
        };
        let Some(ctx) = ProofContext::new(credential, proof, issuer.clone())? else {
            return Ok(foreign_method(proof, &issuer));
        };

        if let Some(cache) = &self.cache {
            if cache.has(&ctx.issuer).await? {
                log::debug!("{} is stale, skipping optimistic tiers", ctx.issuer);
                return tiers.run(&ctx, Mode::LedgerOnly).await;
            }
        }

        let mut result = tiers.run(&ctx, Mode::Tiered { ledger: false }).await?;
        if !result.verified {
            if let Some(cache) = &self.cache {
                cache.set(&ctx.issuer).await?;
            }
            log::debug!("optimistic verification of {} failed, retrying on the ledger", ctx.issuer);
            result.extend(tiers.run(&ctx, Mode::LedgerOnly).await?);
        }
        Ok(result)
    }

    /// Runs the tiers in the given mode without consulting or updating the cache.
    pub async fn verify_with_mode(
        &self,
        credential: &VerifiableCredential,
        mode: Mode,
    ) -> Result<VerificationResult> {
        let resolver = self.resolver.as_deref().ok_or_else(|| {
            Error::PreconditionError("verification requires a ledger resolver".into())
        })?;
        let issuer = credential
            .issuer_did()
            .ok_or_else(|| Error::PreconditionError("credential has no did:ethr issuer".into()))?;
        let Some(proof) = credential.proof.as_ref() else {
            return Ok(VerificationResult::failed("credential has no proof"));
        };
        let tiers = TieredVerifier {
            resolver,
            proof_verifier: self.proof_verifier.as_ref(),
            chain_hint: self
                .networks
                .as_ref()
                .and_then(|networks| networks.chain_id_hint(&issuer)),
        };
        let Some(ctx) = ProofContext::new(credential, proof, issuer.clone())? else {
            return Ok(foreign_method(proof, &issuer));
        };
        tiers.run(&ctx, mode).await
    }

    /// Verifies credentials one after another; one result per credential, in order.
    pub async fn verify_all(
        &self,
        credentials: &[VerifiableCredential],
    ) -> Vec<Result<VerificationResult>> {
        let mut results = Vec::with_capacity(credentials.len());
        for credential in credentials {
            results.push(self.verify(credential).await);
        }
        results
    }
}
