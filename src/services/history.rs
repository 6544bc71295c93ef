// src/services/history.rs
//! Owner history reconstruction.
//!
//! Replays ownership-change records in on-chain order and re-checks each one as the registry
//! would have: the signer is the owner being replaced, the signature covers the change, and every
//! change continues from the previous one. The first violation aborts the replay.

use ethers::types::Address;
use serde::Serialize;

use crate::bls::keys::BbsPublicKey;
use crate::bls::signature::verify;
use crate::config::Network;
use crate::contracts::owner_digest::{owner_change_digest, HashScheme};
use crate::error::{Error, Result};
use crate::models::ownership::{HistoryViolation, OwnedIdentity, OwnershipChangeRecord};
use crate::wallet::address::bbs_address;

/// A validated owner chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerHistory {
    /// `None` for an empty history.
    pub identity: Option<OwnedIdentity>,
    /// The first record's old owner followed by every new owner, in order.
    pub owners: Vec<Address>,
}

impl OwnerHistory {
    pub fn current_owner(&self) -> Option<Address> {
        self.owners.last().copied()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HistoryReconstructor {
    scheme: HashScheme,
    chain_id: u64,
    registry: Address,
}

impl HistoryReconstructor {
    pub fn new(scheme: HashScheme, chain_id: u64, registry: Address) -> Self {
        Self {
            scheme,
            chain_id,
            registry,
        }
    }

    /// # Errors
    /// `ConfigurationError` when neither `scheme` nor the network names a hash scheme.
    pub fn from_network(network: &Network, scheme: Option<HashScheme>) -> Result<Self> {
        let scheme = scheme.or(network.hash_scheme).ok_or_else(|| {
            Error::ConfigurationError(
                format!("no hash scheme configured for network {}", network.name).into(),
            )
        })?;
        Ok(Self::new(scheme, network.chain_id, network.registry))
    }

    /// Validates `records` and returns the owner chain.
    ///
    /// # Errors
    /// `HistoryIntegrityError` with the 0-based index of the first offending record.
    pub fn reconstruct(&self, records: &[OwnershipChangeRecord]) -> Result<OwnerHistory> {
        let mut history = OwnerHistory {
            identity: records.first().map(|record| record.message.identity),
            owners: Vec::with_capacity(records.len() + 1),
        };
        for (index, record) in records.iter().enumerate() {
            self.check(record, history.identity, history.owners.last().copied())
                .map_err(|violation| {
                    log::warn!("owner history broken at record {}: {}", index, violation);
                    Error::HistoryIntegrityError { index, violation }
                })?;
            if index == 0 {
                history.owners.push(record.message.old_owner);
            }
            history.owners.push(record.message.new_owner);
        }
        log::debug!("validated {} ownership changes", records.len());
        Ok(history)
    }

    /// Like [`reconstruct`](Self::reconstruct), additionally requiring the history to belong to
    /// `identity` and to start from its initial owner.
    pub fn reconstruct_for(
        &self,
        identity: OwnedIdentity,
        records: &[OwnershipChangeRecord],
    ) -> Result<OwnerHistory> {
        if let Some(first) = records.first() {
            if first.message.identity != identity {
                return Err(Error::HistoryIntegrityError {
                    index: 0,
                    violation: HistoryViolation::ForeignIdentity,
                });
            }
            if first.message.old_owner != identity.initial_owner() {
                return Err(Error::HistoryIntegrityError {
                    index: 0,
                    violation: HistoryViolation::Discontinuity {
                        expected: identity.initial_owner(),
                        found: first.message.old_owner,
                    },
                });
            }
        }
        let mut history = self.reconstruct(records)?;
        if history.owners.is_empty() {
            history.identity = Some(identity);
            history.owners.push(identity.initial_owner());
        }
        Ok(history)
    }

    fn check(
        &self,
        record: &OwnershipChangeRecord,
        identity: Option<OwnedIdentity>,
        previous_owner: Option<Address>,
    ) -> std::result::Result<(), HistoryViolation> {
        let message = &record.message;
        let public_key = BbsPublicKey::from_bytes(&record.public_key)
            .map_err(|e| HistoryViolation::InvalidPublicKey(e.to_string()))?;
        let derived = bbs_address(&public_key);
        if derived != message.old_owner {
            return Err(HistoryViolation::SignerNotOwner {
                expected: message.old_owner,
                derived,
            });
        }
        if record.pseudo_id != message.identity.pseudo_id() {
            return Err(HistoryViolation::PseudoIdMismatch);
        }
        let digest = owner_change_digest(self.scheme, message, self.chain_id, self.registry);
        if !verify(&record.signature, &digest, &public_key.point()) {
            return Err(HistoryViolation::BadSignature);
        }
        if let Some(expected) = previous_owner {
            if message.old_owner != expected {
                return Err(HistoryViolation::Discontinuity {
                    expected,
                    found: message.old_owner,
                });
            }
        }
        if identity.is_some_and(|identity| identity != message.identity) {
            return Err(HistoryViolation::ForeignIdentity);
        }
        Ok(())
    }
}
