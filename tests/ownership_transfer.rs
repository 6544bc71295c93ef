//! Ownership transfers through the in-memory registry and owner history reconstruction.

use std::sync::Arc;

use ethers::types::Address;
use ethr_did_verifier::blockchain::in_memory::InMemoryRegistry;
use ethr_did_verifier::bls::keys::BbsKeyPair;
use ethr_did_verifier::config::Network;
use ethr_did_verifier::contracts::did_registry::{REVERT_BAD_ACTOR, REVERT_BAD_SIGNATURE};
use ethr_did_verifier::contracts::owner_digest::HashScheme;
use ethr_did_verifier::models::ownership::{HistoryViolation, OwnedIdentity, OwnerChangeMessage};
use ethr_did_verifier::services::history::HistoryReconstructor;
use ethr_did_verifier::services::ownership::OwnershipTransfer;
use ethr_did_verifier::wallet::address::bbs_address;
use ethr_did_verifier::wallet::key_management::KeyManager;
use ethr_did_verifier::{EthrDid, Error};
use rand::rngs::OsRng;
use url::Url;

fn network() -> Network {
    Network {
        name: "mainnet".into(),
        rpc_url: Url::parse("http://localhost:8545").unwrap(),
        registry: Address::repeat_byte(0xdc),
        chain_id: 1,
        hash_scheme: Some(HashScheme::Structured),
    }
}

fn setup() -> (Arc<InMemoryRegistry>, OwnershipTransfer) {
    let registry = Arc::new(InMemoryRegistry::new(network()).unwrap());
    let transfer = OwnershipTransfer::new(registry.clone(), network());
    (registry, transfer)
}

fn keys(n: usize) -> Vec<BbsKeyPair> {
    (0..n).map(|_| BbsKeyPair::generate(&mut OsRng)).collect()
}

/// Hands `did` down the chain `keys[0] -> keys[1] -> ...`.
async fn hand_down(transfer: &OwnershipTransfer, did: &EthrDid, keys: &[BbsKeyPair]) {
    for pair in keys.windows(2) {
        transfer
            .change_owner(did, &pair[0], bbs_address(pair[1].public_key()), None)
            .await
            .unwrap();
    }
}

#[test]
fn structured_digest_signature_covers_every_byte() {
    let (_, transfer) = setup();
    let owner = BbsKeyPair::generate(&mut OsRng);
    let message = OwnerChangeMessage {
        identity: OwnedIdentity::Single {
            address: bbs_address(owner.public_key()),
        },
        old_owner: bbs_address(owner.public_key()),
        new_owner: Address::repeat_byte(0x42),
    };
    let signature = transfer.sign_owner_change(&owner, &message, None).unwrap();
    let public_key = owner.public_key().to_compressed();
    assert!(transfer
        .verify_owner_change(&message, &public_key, &signature, None)
        .unwrap());

    let mut flipped = signature.clone();
    flipped[40] ^= 0x01;
    assert!(!transfer
        .verify_owner_change(&message, &public_key, &flipped, None)
        .unwrap());

    let redirected = OwnerChangeMessage {
        new_owner: Address::repeat_byte(0x43),
        ..message.clone()
    };
    assert!(!transfer
        .verify_owner_change(&redirected, &public_key, &signature, None)
        .unwrap());

    assert!(!transfer
        .verify_owner_change(&message, &public_key, &signature, Some(HashScheme::Legacy))
        .unwrap());
}

#[tokio::test]
async fn consistent_chain_reconstructs_every_owner() {
    let (registry, transfer) = setup();
    let keys = keys(4);
    let did = EthrDid::new(None, bbs_address(keys[0].public_key()));
    hand_down(&transfer, &did, &keys).await;

    let identity = OwnedIdentity::from(&did);
    let history = HistoryReconstructor::from_network(&network(), None)
        .unwrap()
        .reconstruct_for(identity, &registry.history(&identity))
        .unwrap();
    let expected: Vec<Address> = keys.iter().map(|k| bbs_address(k.public_key())).collect();
    assert_eq!(history.owners, expected);
    assert_eq!(history.current_owner(), Some(registry.owner(&identity)));
}

#[tokio::test]
async fn dual_identity_is_transferred_by_its_bbs_key() {
    let (registry, transfer) = setup();
    let holder = KeyManager::new();
    let successor = BbsKeyPair::generate(&mut OsRng);
    let did = holder.dual_did(None);

    transfer
        .change_owner(&did, holder.bbs(), bbs_address(successor.public_key()), None)
        .await
        .unwrap();

    let identity = OwnedIdentity::from(&did);
    let records = registry.history(&identity);
    assert_eq!(records[0].pseudo_id, did.pseudo_id());
    let history = HistoryReconstructor::from_network(&network(), None)
        .unwrap()
        .reconstruct_for(identity, &records)
        .unwrap();
    assert_eq!(
        history.owners,
        vec![holder.bbs_address(), bbs_address(successor.public_key())]
    );
}

#[tokio::test]
async fn tampered_record_breaks_history_at_its_index() {
    let (registry, transfer) = setup();
    let keys = keys(5);
    let did = EthrDid::new(None, bbs_address(keys[0].public_key()));
    hand_down(&transfer, &did, &keys).await;

    let identity = OwnedIdentity::from(&did);
    let mut records = registry.history(&identity);
    records[2].signature[50] ^= 0x01;
    match HistoryReconstructor::from_network(&network(), None)
        .unwrap()
        .reconstruct(&records)
    {
        Err(Error::HistoryIntegrityError { index, violation }) => {
            assert_eq!(index, 2);
            assert_eq!(violation, HistoryViolation::BadSignature);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn registry_rejections_surface_as_transfer_rejected() {
    let (registry, transfer) = setup();
    let keys = keys(2);
    let did = EthrDid::new(None, bbs_address(keys[0].public_key()));

    // not the current owner
    match transfer
        .change_owner(&did, &keys[1], Address::repeat_byte(9), None)
        .await
    {
        Err(Error::OwnershipTransferRejected { reason }) => {
            assert_eq!(reason.as_deref(), Some(REVERT_BAD_ACTOR))
        }
        other => panic!("unexpected {:?}", other),
    }

    // signed over a digest the registry does not use
    match transfer
        .change_owner(&did, &keys[0], Address::repeat_byte(9), Some(HashScheme::Legacy))
        .await
    {
        Err(Error::OwnershipTransferRejected { reason }) => {
            assert_eq!(reason.as_deref(), Some(REVERT_BAD_SIGNATURE))
        }
        other => panic!("unexpected {:?}", other),
    }

    assert_eq!(registry.submission_count(), 2);
    assert!(registry.history(&OwnedIdentity::from(&did)).is_empty());
}

#[tokio::test]
async fn identifier_of_another_network_is_not_submitted() {
    let (registry, transfer) = setup();
    let owner = BbsKeyPair::generate(&mut OsRng);
    let did = EthrDid::new(Some("sepolia".into()), bbs_address(owner.public_key()));
    assert!(matches!(
        transfer
            .change_owner(&did, &owner, Address::repeat_byte(9), None)
            .await,
        Err(Error::ConfigurationError(_))
    ));
    assert_eq!(registry.submission_count(), 0);
}
