// src/services/ownership.rs
//! Ownership transfer protocol.
//!
//! The current owner of an identity signs the owner-change digest with its BBS key and the
//! registry verifies that signature on-chain before moving ownership. This service builds the
//! digest, signs it, mirrors the verification and submits the transaction exactly once.

use std::sync::Arc;

use ethers::types::Address;

use crate::blockchain::ledger::{Receipt, TransactionSubmitter};
use crate::bls::keys::{
    decompress, BbsKeyPair, BbsPublicKey, G2_COMPRESSED_LEN, G2_UNCOMPRESSED_LEN,
};
use crate::bls::signature::verify;
use crate::config::{Network, DEFAULT_NETWORK};
use crate::contracts::did_registry::ChangeOwnerCall;
use crate::contracts::owner_digest::{owner_change_digest, HashScheme};
use crate::error::{Error, Result};
use crate::models::did::EthrDid;
use crate::models::ownership::{OwnedIdentity, OwnerChangeMessage};
use crate::utils::crypto::checksummed;
use crate::wallet::address::bbs_address;

/// Converts a BBS public key in either encoding to the 192-byte form the registry expects.
///
/// # Errors
/// `UnsupportedKeyLength` for other lengths, `UnknownKeyType` for invalid points.
pub fn registry_public_key(public_key: &[u8]) -> Result<Vec<u8>> {
    match public_key.len() {
        G2_COMPRESSED_LEN => decompress(public_key),
        G2_UNCOMPRESSED_LEN => Ok(BbsPublicKey::from_bytes(public_key)?.to_uncompressed()),
        other => Err(Error::UnsupportedKeyLength(other)),
    }
}

/// Ownership transfers against one network's registry.
pub struct OwnershipTransfer {
    /// Transaction submitter for the network's registry
    submitter: Arc<dyn TransactionSubmitter>,
    /// Network whose registry, chain id and default hash scheme are used
    network: Network,
}

impl OwnershipTransfer {
    pub fn new(submitter: Arc<dyn TransactionSubmitter>, network: Network) -> Self {
        Self { submitter, network }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Picks the hash scheme: the explicit one, else the network's.
    ///
    /// # Errors
    /// `ConfigurationError` when neither is set; the scheme is never guessed.
    pub fn scheme(&self, explicit: Option<HashScheme>) -> Result<HashScheme> {
        explicit.or(self.network.hash_scheme).ok_or_else(|| {
            Error::ConfigurationError(
                format!("no hash scheme configured for network {}", self.network.name).into(),
            )
        })
    }

    /// The digest the old owner signs for `message`.
    pub fn digest(&self, message: &OwnerChangeMessage, scheme: Option<HashScheme>) -> Result<[u8; 32]> {
        Ok(owner_change_digest(
            self.scheme(scheme)?,
            message,
            self.network.chain_id,
            self.network.registry,
        ))
    }

    /// Signs `message` with the owner's BBS key.
    ///
    /// # Returns
    /// The uncompressed 96-byte G1 signature
    pub fn sign_owner_change(
        &self,
        owner: &BbsKeyPair,
        message: &OwnerChangeMessage,
        scheme: Option<HashScheme>,
    ) -> Result<Vec<u8>> {
        owner.sign(&self.digest(message, scheme)?)
    }

    /// Checks a signed owner change the way the registry does.
    ///
    /// # Arguments
    /// * `message` - The change; `old_owner` must be the address of `public_key`
    /// * `public_key` - BBS key of the old owner, compressed or uncompressed
    /// * `signature` - Uncompressed G1 signature
    ///
    /// # Returns
    /// `Ok(false)` when the signer is not the old owner or the signature does not verify
    pub fn verify_owner_change(
        &self,
        message: &OwnerChangeMessage,
        public_key: &[u8],
        signature: &[u8],
        scheme: Option<HashScheme>,
    ) -> Result<bool> {
        let digest = self.digest(message, scheme)?;
        let public_key = BbsPublicKey::from_bytes(public_key)?;
        if bbs_address(&public_key) != message.old_owner {
            log::debug!(
                "signer {} is not old owner {}",
                checksummed(&bbs_address(&public_key)),
                checksummed(&message.old_owner)
            );
            return Ok(false);
        }
        Ok(verify(signature, &digest, &public_key.point()))
    }

    /// Transfers ownership of `identity` from the holder of `owner` to `new_owner`.
    ///
    /// # Arguments
    /// * `identity` - Single or dual identifier on this network
    /// * `owner` - BBS key pair of the current owner
    /// * `new_owner` - Address receiving ownership
    /// * `scheme` - Hash scheme override
    ///
    /// # Returns
    /// The receipt of the accepted transaction
    ///
    /// # Errors
    /// - `ConfigurationError` for an identifier of another network or when no scheme is set
    /// - `OwnershipTransferRejected` when the registry reverts or reports failure
    /// - ledger transport failures, unchanged
    pub async fn change_owner(
        &self,
        identity: &EthrDid,
        owner: &BbsKeyPair,
        new_owner: Address,
        scheme: Option<HashScheme>,
    ) -> Result<Receipt> {
        let message = OwnerChangeMessage {
            identity: OwnedIdentity::from(identity),
            old_owner: bbs_address(owner.public_key()),
            new_owner,
        };
        let signature = self.sign_owner_change(owner, &message, scheme)?;
        self.submit(
            identity,
            new_owner,
            &owner.public_key().to_compressed(),
            signature,
        )
        .await
    }

    /// Submits an already signed owner change. The public key may be in either encoding.
    pub async fn submit(
        &self,
        identity: &EthrDid,
        new_owner: Address,
        public_key: &[u8],
        signature: Vec<u8>,
    ) -> Result<Receipt> {
        let network = identity.network().unwrap_or(DEFAULT_NETWORK);
        if network != self.network.name {
            return Err(Error::ConfigurationError(
                format!("{} is not on network {}", identity, self.network.name).into(),
            ));
        }
        let call = ChangeOwnerCall {
            identity: OwnedIdentity::from(identity),
            new_owner,
            public_key: registry_public_key(public_key)?,
            signature,
        };
        let (function, args) = call.encode();
        log::info!(
            "changing owner of {} to {} via {}",
            identity,
            checksummed(&new_owner),
            function
        );
        match self.submitter.send(self.network.registry, function, args).await {
            Ok(receipt) if receipt.status => Ok(receipt),
            Ok(receipt) => {
                log::warn!("owner change of {} failed: {:?}", identity, receipt.revert_reason);
                Err(Error::OwnershipTransferRejected {
                    reason: receipt.revert_reason,
                })
            }
            Err(Error::Reverted(reason)) => {
                log::warn!("owner change of {} reverted: {}", identity, reason);
                Err(Error::OwnershipTransferRejected {
                    reason: Some(reason),
                })
            }
            Err(other) => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::Token;
    use ethers::types::H256;
    use rand::rngs::OsRng;
    use std::sync::Mutex;
    use url::Url;

    /// Records calls and answers with a fixed result.
    struct RecordingSubmitter {
        calls: Mutex<Vec<(Address, String, Vec<Token>)>>,
        reply: fn() -> Result<Receipt>,
    }

    #[async_trait::async_trait]
    impl TransactionSubmitter for RecordingSubmitter {
        async fn send(&self, contract: Address, function: &str, args: Vec<Token>) -> Result<Receipt> {
            self.calls
                .lock()
                .unwrap()
                .push((contract, function.to_string(), args));
            (self.reply)()
        }
    }

    fn success() -> Result<Receipt> {
        Ok(Receipt {
            status: true,
            tx_hash: H256::repeat_byte(1),
            block_number: Some(1),
            gas_used: None,
            revert_reason: None,
        })
    }

    fn network(scheme: Option<HashScheme>) -> Network {
        Network {
            name: "mainnet".into(),
            rpc_url: Url::parse("http://localhost:8545").unwrap(),
            registry: Address::repeat_byte(0xdc),
            chain_id: 1,
            hash_scheme: scheme,
        }
    }

    fn transfer(
        scheme: Option<HashScheme>,
        reply: fn() -> Result<Receipt>,
    ) -> (Arc<RecordingSubmitter>, OwnershipTransfer) {
        let submitter = Arc::new(RecordingSubmitter {
            calls: Mutex::new(Vec::new()),
            reply,
        });
        let transfer = OwnershipTransfer::new(submitter.clone(), network(scheme));
        (submitter, transfer)
    }

    #[test]
    fn test_missing_scheme_is_configuration_error() {
        let (_, transfer) = transfer(None, success);
        let message = OwnerChangeMessage {
            identity: OwnedIdentity::Single {
                address: Address::repeat_byte(1),
            },
            old_owner: Address::repeat_byte(1),
            new_owner: Address::repeat_byte(2),
        };
        assert!(matches!(
            transfer.digest(&message, None),
            Err(Error::ConfigurationError(_))
        ));
        assert!(transfer.digest(&message, Some(HashScheme::Legacy)).is_ok());
    }

    #[test]
    fn test_sign_and_verify_with_compressed_key() {
        let (_, transfer) = transfer(Some(HashScheme::StructuredVersioned), success);
        let owner = BbsKeyPair::generate(&mut OsRng);
        let message = OwnerChangeMessage {
            identity: OwnedIdentity::Single {
                address: bbs_address(owner.public_key()),
            },
            old_owner: bbs_address(owner.public_key()),
            new_owner: Address::repeat_byte(2),
        };
        let signature = transfer.sign_owner_change(&owner, &message, None).unwrap();
        let compressed = owner.public_key().to_compressed();
        assert!(transfer
            .verify_owner_change(&message, &compressed, &signature, None)
            .unwrap());

        let mut foreign = message.clone();
        foreign.old_owner = Address::repeat_byte(3);
        assert!(!transfer
            .verify_owner_change(&foreign, &compressed, &signature, None)
            .unwrap());
    }

    #[tokio::test]
    async fn test_change_owner_submits_uncompressed_key_once() {
        let (submitter, transfer) = transfer(Some(HashScheme::Structured), success);
        let owner = BbsKeyPair::generate(&mut OsRng);
        let did = EthrDid::new(None, bbs_address(owner.public_key()));
        transfer
            .change_owner(&did, &owner, Address::repeat_byte(9), None)
            .await
            .unwrap();

        let calls = submitter.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (contract, function, args) = &calls[0];
        assert_eq!(*contract, Address::repeat_byte(0xdc));
        let call = ChangeOwnerCall::decode(function, args).unwrap();
        assert_eq!(call.public_key.len(), G2_UNCOMPRESSED_LEN);
        assert_eq!(call.new_owner, Address::repeat_byte(9));
    }

    #[tokio::test]
    async fn test_revert_is_rejection_with_reason() {
        let (_, transfer) = transfer(Some(HashScheme::Structured), || {
            Err(Error::Reverted("bad_signature".into()))
        });
        let owner = BbsKeyPair::generate(&mut OsRng);
        let did = EthrDid::new(None, bbs_address(owner.public_key()));
        let error = transfer
            .change_owner(&did, &owner, Address::repeat_byte(9), None)
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            Error::OwnershipTransferRejected { reason: Some(ref r) } if r == "bad_signature"
        ));
    }

    #[tokio::test]
    async fn test_failed_receipt_is_rejection() {
        let (_, transfer) = transfer(Some(HashScheme::Structured), || {
            Ok(Receipt {
                status: false,
                tx_hash: H256::zero(),
                block_number: None,
                gas_used: None,
                revert_reason: None,
            })
        });
        let owner = BbsKeyPair::generate(&mut OsRng);
        let did = EthrDid::new(None, bbs_address(owner.public_key()));
        assert!(matches!(
            transfer
                .change_owner(&did, &owner, Address::repeat_byte(9), None)
                .await,
            Err(Error::OwnershipTransferRejected { reason: None })
        ));
    }

    #[tokio::test]
    async fn test_other_network_is_rejected_before_submission() {
        let (submitter, transfer) = transfer(Some(HashScheme::Structured), success);
        let owner = BbsKeyPair::generate(&mut OsRng);
        let did = EthrDid::new(Some("sepolia".into()), bbs_address(owner.public_key()));
        assert!(matches!(
            transfer
                .change_owner(&did, &owner, Address::repeat_byte(9), None)
                .await,
            Err(Error::ConfigurationError(_))
        ));
        assert!(submitter.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_registry_public_key_lengths() {
        let owner = BbsKeyPair::generate(&mut OsRng);
        let uncompressed = owner.public_key().to_uncompressed();
        assert_eq!(
            registry_public_key(&owner.public_key().to_compressed()).unwrap(),
            uncompressed
        );
        assert_eq!(registry_public_key(&uncompressed).unwrap(), uncompressed);
        assert!(matches!(
            registry_public_key(&[0u8; 33]),
            Err(Error::UnsupportedKeyLength(33))
        ));
    }
}
