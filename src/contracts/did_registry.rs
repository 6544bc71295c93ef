// src/contracts/did_registry.rs
//! DID Registry smart contract interface.
//!
//! Function and event signatures of the registry, calldata (de)construction for the two
//! ownership transfer entry points, and [`check_change_owner`], a local mirror of the checks the
//! deployed contract runs before accepting a transfer.

use ethers::abi::Token;
use ethers::types::{Address, H256};
use ethers::utils::{id, keccak256};

use crate::bls::keys::{BbsPublicKey, G2_UNCOMPRESSED_LEN};
use crate::bls::signature::{verify, G1_UNCOMPRESSED_LEN};
use crate::contracts::owner_digest::{owner_change_digest, HashScheme};
use crate::models::ownership::{OwnedIdentity, OwnerChangeMessage};
use crate::wallet::address::bbs_address;

pub const CHANGE_OWNER_WITH_PUBKEY: &str = "changeOwnerWithPubkey(address,address,bytes,bytes)";
pub const CHANGE_OWNER_WITH_PUBKEY_DUAL: &str =
    "changeOwnerWithPubkeyDual(address,address,address,bytes,bytes)";
pub const IDENTITY_OWNER: &str = "identityOwner(address)";
pub const IDENTITY_OWNER_DUAL: &str = "identityOwnerDual(address,address)";
/// Block of the identity's last registry change.
pub const CHANGED: &str = "changed(address)";

pub const DID_OWNER_CHANGED: &str = "DIDOwnerChanged(address,address,uint256)";
pub const DID_DELEGATE_CHANGED: &str = "DIDDelegateChanged(address,bytes32,address,uint256,uint256)";
pub const DID_ATTRIBUTE_CHANGED: &str = "DIDAttributeChanged(address,bytes32,bytes,uint256,uint256)";

pub const REVERT_INVALID_SIGNATURE_LENGTH: &str = "invalid_signature_length";
pub const REVERT_INVALID_PUBLIC_KEY_LENGTH: &str = "invalid_public_key_length";
pub const REVERT_BAD_SIGNATURE: &str = "bad_signature";
pub const REVERT_BAD_ACTOR: &str = "bad_actor";

/// 4-byte function selector.
pub fn selector(function: &str) -> [u8; 4] {
    id(function)
}

/// Topic 0 of a registry event.
pub fn event_topic(event: &str) -> H256 {
    H256::from(keccak256(event))
}

/// A decoded `changeOwnerWithPubkey*` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeOwnerCall {
    pub identity: OwnedIdentity,
    pub new_owner: Address,
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

impl ChangeOwnerCall {
    /// The function signature and arguments to submit.
    pub fn encode(&self) -> (&'static str, Vec<Token>) {
        let tail = [
            Token::Address(self.new_owner),
            Token::Bytes(self.public_key.clone()),
            Token::Bytes(self.signature.clone()),
        ];
        match self.identity {
            OwnedIdentity::Single { address } => (
                CHANGE_OWNER_WITH_PUBKEY,
                std::iter::once(Token::Address(address)).chain(tail).collect(),
            ),
            OwnedIdentity::Dual { primary, secondary } => (
                CHANGE_OWNER_WITH_PUBKEY_DUAL,
                [Token::Address(primary), Token::Address(secondary)]
                    .into_iter()
                    .chain(tail)
                    .collect(),
            ),
        }
    }

    /// Decodes submitted arguments; `None` for any other function or a malformed argument list.
    pub fn decode(function: &str, args: &[Token]) -> Option<Self> {
        let (identity, rest) = match (function, args) {
            (CHANGE_OWNER_WITH_PUBKEY, [Token::Address(address), rest @ ..]) => {
                (OwnedIdentity::Single { address: *address }, rest)
            }
            (
                CHANGE_OWNER_WITH_PUBKEY_DUAL,
                [Token::Address(primary), Token::Address(secondary), rest @ ..],
            ) => (
                OwnedIdentity::Dual {
                    primary: *primary,
                    secondary: *secondary,
                },
                rest,
            ),
            _ => return None,
        };
        match rest {
            [Token::Address(new_owner), Token::Bytes(public_key), Token::Bytes(signature)] => {
                Some(Self {
                    identity,
                    new_owner: *new_owner,
                    public_key: public_key.clone(),
                    signature: signature.clone(),
                })
            }
            _ => None,
        }
    }
}

/// Runs the registry's acceptance checks for a transfer away from `current_owner`.
///
/// # Returns
/// `Err` with the contract's revert string when the call would revert.
pub fn check_change_owner(
    scheme: HashScheme,
    chain_id: u64,
    registry: Address,
    current_owner: Address,
    call: &ChangeOwnerCall,
) -> Result<(), &'static str> {
    if call.signature.len() != G1_UNCOMPRESSED_LEN {
        return Err(REVERT_INVALID_SIGNATURE_LENGTH);
    }
    if call.public_key.len() != G2_UNCOMPRESSED_LEN {
        return Err(REVERT_INVALID_PUBLIC_KEY_LENGTH);
    }
    let public_key = BbsPublicKey::from_bytes(&call.public_key).map_err(|_| REVERT_BAD_SIGNATURE)?;
    if bbs_address(&public_key) != current_owner {
        return Err(REVERT_BAD_ACTOR);
    }
    let message = OwnerChangeMessage {
        identity: call.identity,
        old_owner: current_owner,
        new_owner: call.new_owner,
    };
    let digest = owner_change_digest(scheme, &message, chain_id, registry);
    if !verify(&call.signature, &digest, &public_key.point()) {
        return Err(REVERT_BAD_SIGNATURE);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bls::keys::BbsKeyPair;
    use rand::rngs::OsRng;
    use std::str::FromStr;

    fn registry() -> Address {
        Address::from_str("0xdca7ef03e98e0dc2b855be647c39abe984fcf21b").unwrap()
    }

    fn signed_call(owner: &BbsKeyPair, identity: OwnedIdentity, new_owner: Address) -> ChangeOwnerCall {
        let message = OwnerChangeMessage {
            identity,
            old_owner: bbs_address(owner.public_key()),
            new_owner,
        };
        let digest = owner_change_digest(HashScheme::Structured, &message, 1, registry());
        ChangeOwnerCall {
            identity,
            new_owner,
            public_key: owner.public_key().to_uncompressed(),
            signature: owner.sign(&digest).unwrap(),
        }
    }

    #[test]
    fn test_encode_decode_single_and_dual() {
        let owner = BbsKeyPair::generate(&mut OsRng);
        let address = bbs_address(owner.public_key());
        for identity in [
            OwnedIdentity::Single { address },
            OwnedIdentity::Dual {
                primary: address,
                secondary: Address::repeat_byte(9),
            },
        ] {
            let call = signed_call(&owner, identity, Address::repeat_byte(1));
            let (function, args) = call.encode();
            assert_eq!(ChangeOwnerCall::decode(function, &args), Some(call));
        }
        assert_eq!(ChangeOwnerCall::decode(IDENTITY_OWNER, &[]), None);
    }

    #[test]
    fn test_check_accepts_owner_signature() {
        let owner = BbsKeyPair::generate(&mut OsRng);
        let identity = bbs_address(owner.public_key());
        let call = signed_call(
            &owner,
            OwnedIdentity::Single { address: identity },
            Address::repeat_byte(1),
        );
        assert_eq!(
            check_change_owner(HashScheme::Structured, 1, registry(), identity, &call),
            Ok(())
        );
        // wrong scheme, wrong digest
        assert_eq!(
            check_change_owner(HashScheme::Legacy, 1, registry(), identity, &call),
            Err(REVERT_BAD_SIGNATURE)
        );
    }

    #[test]
    fn test_check_reverts() {
        let owner = BbsKeyPair::generate(&mut OsRng);
        let identity = bbs_address(owner.public_key());
        let call = signed_call(
            &owner,
            OwnedIdentity::Single { address: identity },
            Address::repeat_byte(1),
        );

        let mut short = call.clone();
        short.signature.truncate(48);
        assert_eq!(
            check_change_owner(HashScheme::Structured, 1, registry(), identity, &short),
            Err(REVERT_INVALID_SIGNATURE_LENGTH)
        );

        let mut compressed = call.clone();
        compressed.public_key = owner.public_key().to_compressed();
        assert_eq!(
            check_change_owner(HashScheme::Structured, 1, registry(), identity, &compressed),
            Err(REVERT_INVALID_PUBLIC_KEY_LENGTH)
        );

        assert_eq!(
            check_change_owner(
                HashScheme::Structured,
                1,
                registry(),
                Address::repeat_byte(7),
                &call
            ),
            Err(REVERT_BAD_ACTOR)
        );

        let mut flipped = call;
        flipped.signature[40] ^= 0x01;
        assert!(check_change_owner(HashScheme::Structured, 1, registry(), identity, &flipped).is_err());
    }

    #[test]
    fn test_selector_matches_keccak_prefix() {
        assert_eq!(selector(IDENTITY_OWNER), keccak256(IDENTITY_OWNER)[..4]);
    }
}
