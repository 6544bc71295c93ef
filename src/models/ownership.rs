// src/models/ownership.rs
//! Ownership-change records as emitted by the registry and replayed by the history
//! reconstructor.

use std::fmt;

use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};

use crate::models::did::{pseudo_id, EthrDid};
use crate::utils::crypto::checksummed;

/// The identity whose owner changes: one registry address, or the pair backing a dual DID.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "shape")]
pub enum OwnedIdentity {
    Single { address: Address },
    Dual { primary: Address, secondary: Address },
}

impl OwnedIdentity {
    /// Bytes hashed as the "identity" field: 20 bytes, or the 40-byte concatenation.
    pub fn packed(&self) -> Vec<u8> {
        match self {
            Self::Single { address } => address.as_bytes().to_vec(),
            Self::Dual { primary, secondary } => {
                let mut packed = primary.as_bytes().to_vec();
                packed.extend_from_slice(secondary.as_bytes());
                packed
            }
        }
    }

    pub fn pseudo_id(&self) -> Option<H256> {
        match self {
            Self::Single { .. } => None,
            Self::Dual { primary, secondary } => Some(pseudo_id(primary, secondary)),
        }
    }

    /// The owner an identity starts with before any transfer: its own address, or for a dual
    /// identity the BBS key address, the half able to sign transfers.
    pub fn initial_owner(&self) -> Address {
        match self {
            Self::Single { address } => *address,
            Self::Dual { secondary, .. } => *secondary,
        }
    }
}

impl From<&EthrDid> for OwnedIdentity {
    fn from(did: &EthrDid) -> Self {
        match did.secondary() {
            Some(secondary) => Self::Dual {
                primary: did.primary(),
                secondary,
            },
            None => Self::Single {
                address: did.primary(),
            },
        }
    }
}

/// The signed part of an ownership change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerChangeMessage {
    pub identity: OwnedIdentity,
    pub old_owner: Address,
    pub new_owner: Address,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipChangeRecord {
    pub message: OwnerChangeMessage,
    /// Correlation id of a dual identity; `None` for single identities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pseudo_id: Option<H256>,
    /// Uncompressed (192 byte) G2 public key of the old owner.
    pub public_key: Vec<u8>,
    /// Uncompressed G1 signature over the message digest.
    pub signature: Vec<u8>,
}

/// The invariant a history record broke.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HistoryViolation {
    /// The signer's derived address is not the owner at that point.
    SignerNotOwner { expected: Address, derived: Address },
    /// The public key could not be interpreted.
    InvalidPublicKey(String),
    BadSignature,
    /// `old_owner` does not continue from the previous record's `new_owner`.
    Discontinuity { expected: Address, found: Address },
    PseudoIdMismatch,
    /// The record changes the owner of a different identity than the rest of the history.
    ForeignIdentity,
}

impl fmt::Display for HistoryViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SignerNotOwner { expected, derived } => write!(
                f,
                "signer {} is not the owner {}",
                checksummed(derived),
                checksummed(expected)
            ),
            Self::InvalidPublicKey(reason) => write!(f, "invalid public key: {}", reason),
            Self::BadSignature => f.write_str("signature does not verify"),
            Self::Discontinuity { expected, found } => write!(
                f,
                "old owner {} does not continue from previous new owner {}",
                checksummed(found),
                checksummed(expected)
            ),
            Self::PseudoIdMismatch => f.write_str("pseudo id does not match the dual identity"),
            Self::ForeignIdentity => f.write_str("record belongs to another identity"),
        }
    }
}
