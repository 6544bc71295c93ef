// src/contracts/owner_digest.rs
//! Message hashing for `changeOwnerWithPubkey`.
//!
//! Two generations of registry contracts are deployed and both remain supported:
//! - [`HashScheme::Legacy`]: packed `identity ‖ oldOwner ‖ newOwner ‖ uint256(chainId)`
//! - [`HashScheme::Structured`] / [`HashScheme::StructuredVersioned`]: typed structured data,
//!   `keccak256(0x1901 ‖ domainSeparator ‖ structHash)`, the versioned form adding the protocol
//!   version to the domain (used by the dual-address registry)
//!
//! The scheme is always chosen by configuration; nothing here tries to detect it.

use ethers::abi::{encode, Token};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::models::ownership::{OwnedIdentity, OwnerChangeMessage};
use crate::utils::crypto::hash_data;

pub const REGISTRY_NAME: &str = "EthereumDIDRegistry";
pub const REGISTRY_VERSION: &str = "1";

pub const DOMAIN_TYPE: &str = "EIP712Domain(string name,uint256 chainId,address verifyingContract)";
pub const DOMAIN_TYPE_VERSIONED: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";
pub const CHANGE_OWNER_TYPE: &str =
    "ChangeOwnerWithPubkey(address identity,address oldOwner,address newOwner)";
pub const CHANGE_OWNER_DUAL_TYPE: &str =
    "ChangeOwnerWithPubkey(bytes identity,bytes32 pseudoId,address oldOwner,address newOwner)";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HashScheme {
    Legacy,
    Structured,
    StructuredVersioned,
}

impl std::str::FromStr for HashScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "legacy" => Ok(Self::Legacy),
            "structured" => Ok(Self::Structured),
            "structuredVersioned" | "structured-versioned" => Ok(Self::StructuredVersioned),
            other => Err(format!("unknown hash scheme {:?}", other)),
        }
    }
}

/// The 32-byte digest the old owner signs.
pub fn owner_change_digest(
    scheme: HashScheme,
    message: &OwnerChangeMessage,
    chain_id: u64,
    registry: Address,
) -> [u8; 32] {
    match scheme {
        HashScheme::Legacy => legacy_digest(message, chain_id),
        HashScheme::Structured => {
            structured_digest(&domain_separator(chain_id, registry, false), message)
        }
        HashScheme::StructuredVersioned => {
            structured_digest(&domain_separator(chain_id, registry, true), message)
        }
    }
}

fn legacy_digest(message: &OwnerChangeMessage, chain_id: u64) -> [u8; 32] {
    let mut packed = message.identity.packed();
    packed.extend_from_slice(message.old_owner.as_bytes());
    packed.extend_from_slice(message.new_owner.as_bytes());
    let mut chain = [0u8; 32];
    U256::from(chain_id).to_big_endian(&mut chain);
    packed.extend_from_slice(&chain);
    hash_data(&packed)
}

pub fn domain_separator(chain_id: u64, registry: Address, versioned: bool) -> [u8; 32] {
    let mut tokens = vec![
        Token::FixedBytes(
            hash_data(if versioned { DOMAIN_TYPE_VERSIONED } else { DOMAIN_TYPE }.as_bytes()).to_vec(),
        ),
        Token::FixedBytes(hash_data(REGISTRY_NAME.as_bytes()).to_vec()),
    ];
    if versioned {
        tokens.push(Token::FixedBytes(hash_data(REGISTRY_VERSION.as_bytes()).to_vec()));
    }
    tokens.push(Token::Uint(U256::from(chain_id)));
    tokens.push(Token::Address(registry));
    hash_data(&encode(&tokens))
}

pub fn struct_hash(message: &OwnerChangeMessage) -> [u8; 32] {
    let tokens = match &message.identity {
        OwnedIdentity::Single { address } => vec![
            Token::FixedBytes(hash_data(CHANGE_OWNER_TYPE.as_bytes()).to_vec()),
            Token::Address(*address),
            Token::Address(message.old_owner),
            Token::Address(message.new_owner),
        ],
        identity @ OwnedIdentity::Dual { .. } => vec![
            Token::FixedBytes(hash_data(CHANGE_OWNER_DUAL_TYPE.as_bytes()).to_vec()),
            Token::FixedBytes(hash_data(&identity.packed()).to_vec()),
            Token::FixedBytes(
                identity
                    .pseudo_id()
                    .map(|id| id.as_bytes().to_vec())
                    .unwrap_or_default(),
            ),
            Token::Address(message.old_owner),
            Token::Address(message.new_owner),
        ],
    };
    hash_data(&encode(&tokens))
}

fn structured_digest(domain: &[u8; 32], message: &OwnerChangeMessage) -> [u8; 32] {
    let mut preimage = Vec::with_capacity(66);
    preimage.extend_from_slice(&[0x19, 0x01]);
    preimage.extend_from_slice(domain);
    preimage.extend_from_slice(&struct_hash(message));
    hash_data(&preimage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn address(s: &str) -> Address {
        Address::from_str(s).unwrap()
    }

    fn message(identity: OwnedIdentity) -> OwnerChangeMessage {
        OwnerChangeMessage {
            identity,
            old_owner: address("0x7e575682a8e450e33eb0493f9972821ae333cd7f"),
            new_owner: address("0xfc88f377218e665d8ede610034c4ab2b81e5f9ff"),
        }
    }

    #[test]
    fn test_legacy_digest_is_packed_keccak() {
        let identity = address("0x7e575682a8e450e33eb0493f9972821ae333cd7f");
        let msg = message(OwnedIdentity::Single { address: identity });
        let mut expected = Vec::new();
        expected.extend_from_slice(identity.as_bytes());
        expected.extend_from_slice(msg.old_owner.as_bytes());
        expected.extend_from_slice(msg.new_owner.as_bytes());
        expected.extend_from_slice(&[0u8; 31]);
        expected.push(5);
        assert_eq!(
            owner_change_digest(HashScheme::Legacy, &msg, 5, Address::zero()),
            hash_data(&expected)
        );
    }

    #[test]
    fn test_schemes_disagree() {
        let registry = address("0xdca7ef03e98e0dc2b855be647c39abe984fcf21b");
        let msg = message(OwnedIdentity::Single {
            address: address("0x7e575682a8e450e33eb0493f9972821ae333cd7f"),
        });
        let legacy = owner_change_digest(HashScheme::Legacy, &msg, 1, registry);
        let structured = owner_change_digest(HashScheme::Structured, &msg, 1, registry);
        let versioned = owner_change_digest(HashScheme::StructuredVersioned, &msg, 1, registry);
        assert_ne!(legacy, structured);
        assert_ne!(structured, versioned);
    }

    #[test]
    fn test_structured_digest_binds_chain_and_registry() {
        let registry = address("0xdca7ef03e98e0dc2b855be647c39abe984fcf21b");
        let msg = message(OwnedIdentity::Single {
            address: address("0x7e575682a8e450e33eb0493f9972821ae333cd7f"),
        });
        let base = owner_change_digest(HashScheme::Structured, &msg, 1, registry);
        assert_ne!(base, owner_change_digest(HashScheme::Structured, &msg, 5, registry));
        assert_ne!(
            base,
            owner_change_digest(HashScheme::Structured, &msg, 1, Address::zero())
        );
    }

    #[test]
    fn test_dual_identity_changes_struct_hash() {
        let primary = address("0x7e575682a8e450e33eb0493f9972821ae333cd7f");
        let secondary = address("0xfc88f377218e665d8ede610034c4ab2b81e5f9ff");
        let single = message(OwnedIdentity::Single { address: primary });
        let dual = message(OwnedIdentity::Dual { primary, secondary });
        assert_ne!(struct_hash(&single), struct_hash(&dual));
    }

    #[test]
    fn test_parse_scheme() {
        assert_eq!("legacy".parse::<HashScheme>(), Ok(HashScheme::Legacy));
        assert_eq!(
            "structuredVersioned".parse::<HashScheme>(),
            Ok(HashScheme::StructuredVersioned)
        );
        assert!("eip712".parse::<HashScheme>().is_err());
    }
}
