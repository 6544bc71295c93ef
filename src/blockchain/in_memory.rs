// src/blockchain/in_memory.rs
//! In-memory DID registry.
//!
//! Behaves like a deployed registry for one network: accepts both owner-change entry points,
//! runs the contract's checks (reverting with the same reasons), keeps owners, registry events
//! and the ownership-change log, and serves ledger documents. Used by tests and local tooling.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use ethers::abi::{encode, Token};
use ethers::types::{Address, H256, U256};

use crate::blockchain::ledger::{LedgerResolver, LedgerState, Receipt, RegistryEvent, TransactionSubmitter};
use crate::config::{Network, DEFAULT_NETWORK};
use crate::contracts::did_registry::{check_change_owner, ChangeOwnerCall};
use crate::contracts::owner_digest::HashScheme;
use crate::error::{Error, Result};
use crate::models::did::EthrDid;
use crate::models::document::DidDocument;
use crate::models::ownership::{OwnedIdentity, OwnerChangeMessage, OwnershipChangeRecord};
use crate::services::resolver::assemble_document;
use crate::utils::crypto::hash_data;

/// Gas reported for an accepted owner change.
const CHANGE_OWNER_GAS: u64 = 50_000;

pub struct InMemoryRegistry {
    network: Network,
    scheme: HashScheme,
    owners: DashMap<OwnedIdentity, Address>,
    events: DashMap<OwnedIdentity, Vec<RegistryEvent>>,
    changed: DashMap<OwnedIdentity, u64>,
    history: DashMap<OwnedIdentity, Vec<OwnershipChangeRecord>>,
    block: AtomicU64,
    resolutions: AtomicUsize,
    submissions: AtomicUsize,
}

impl InMemoryRegistry {
    /// # Errors
    /// `ConfigurationError` if the network names no hash scheme.
    pub fn new(network: Network) -> Result<Self> {
        let scheme = network.hash_scheme.ok_or_else(|| {
            Error::ConfigurationError(
                format!("no hash scheme configured for network {}", network.name).into(),
            )
        })?;
        Ok(Self::with_scheme(network, scheme))
    }

    pub fn with_scheme(network: Network, scheme: HashScheme) -> Self {
        Self {
            network,
            scheme,
            owners: DashMap::new(),
            events: DashMap::new(),
            changed: DashMap::new(),
            history: DashMap::new(),
            block: AtomicU64::new(0),
            resolutions: AtomicUsize::new(0),
            submissions: AtomicUsize::new(0),
        }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    /// `identityOwner`: the recorded owner, or the identity's initial owner.
    pub fn owner(&self, identity: &OwnedIdentity) -> Address {
        self.owners
            .get(identity)
            .map(|owner| *owner)
            .unwrap_or_else(|| identity.initial_owner())
    }

    /// Accepted ownership changes of `identity`, in order.
    pub fn history(&self, identity: &OwnedIdentity) -> Vec<OwnershipChangeRecord> {
        self.history
            .get(identity)
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Appends a delegate or attribute change, as `addDelegate` / `setAttribute` would.
    pub fn push_event(&self, did: &EthrDid, event: RegistryEvent) {
        let identity = OwnedIdentity::from(did);
        let block = self.next_block();
        self.events.entry(identity).or_default().push(event);
        self.changed.insert(identity, block);
    }

    /// Registry state of `did` at the current time.
    pub fn state(&self, did: &EthrDid) -> LedgerState {
        let identity = OwnedIdentity::from(did);
        LedgerState {
            owner: self.owner(&identity),
            events: self
                .events
                .get(&identity)
                .map(|events| events.clone())
                .unwrap_or_default(),
            version: self.changed.get(&identity).map(|b| *b).unwrap_or(0),
            now: Utc::now().timestamp().max(0) as u64,
        }
    }

    /// Number of ledger documents served.
    pub fn resolve_count(&self) -> usize {
        self.resolutions.load(Ordering::SeqCst)
    }

    /// Number of transactions received, accepted or not.
    pub fn submission_count(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    fn next_block(&self) -> u64 {
        self.block.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn change_owner(&self, call: ChangeOwnerCall) -> Result<Receipt> {
        let identity = call.identity;
        // the entry lock serializes concurrent transfers of one identity
        let mut owner = self
            .owners
            .entry(identity)
            .or_insert_with(|| identity.initial_owner());
        let current = *owner;
        check_change_owner(
            self.scheme,
            self.network.chain_id,
            self.network.registry,
            current,
            &call,
        )
        .map_err(|reason| {
            log::debug!("change owner of {:?} reverted: {}", identity, reason);
            Error::Reverted(reason.to_string())
        })?;

        *owner = call.new_owner;
        drop(owner);

        let block = self.next_block();
        let tx_hash = H256::from(hash_data(&encode(&[
            Token::Uint(U256::from(block)),
            Token::Address(current),
            Token::Address(call.new_owner),
        ])));
        self.changed.insert(identity, block);
        self.history
            .entry(identity)
            .or_default()
            .push(OwnershipChangeRecord {
                message: OwnerChangeMessage {
                    identity,
                    old_owner: current,
                    new_owner: call.new_owner,
                },
                pseudo_id: identity.pseudo_id(),
                public_key: call.public_key,
                signature: call.signature,
            });
        Ok(Receipt {
            status: true,
            tx_hash,
            block_number: Some(block),
            gas_used: Some(U256::from(CHANGE_OWNER_GAS)),
            revert_reason: None,
        })
    }
}

#[async_trait::async_trait]
impl TransactionSubmitter for InMemoryRegistry {
    async fn send(&self, contract: Address, function: &str, args: Vec<Token>) -> Result<Receipt> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        if contract != self.network.registry {
            return Err(Error::Ledger(format!("no contract at {:?}", contract)));
        }
        let call = ChangeOwnerCall::decode(function, &args)
            .ok_or_else(|| Error::Reverted(format!("unsupported call {}", function)))?;
        self.change_owner(call)
    }
}

#[async_trait::async_trait]
impl LedgerResolver for InMemoryRegistry {
    fn supports(&self, did: &EthrDid) -> bool {
        did.network().unwrap_or(DEFAULT_NETWORK) == self.network.name
    }

    async fn resolve(&self, did: &EthrDid) -> Result<DidDocument> {
        self.resolutions.fetch_add(1, Ordering::SeqCst);
        Ok(assemble_document(did, self.network.chain_id, &self.state(did)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::ledger::DelegateType;
    use crate::bls::keys::BbsKeyPair;
    use crate::contracts::did_registry::REVERT_BAD_ACTOR;
    use crate::contracts::owner_digest::owner_change_digest;
    use crate::wallet::address::bbs_address;
    use rand::rngs::OsRng;
    use url::Url;

    fn registry() -> InMemoryRegistry {
        InMemoryRegistry::new(Network {
            name: "mainnet".into(),
            rpc_url: Url::parse("http://localhost:8545").unwrap(),
            registry: Address::repeat_byte(0xdc),
            chain_id: 1,
            hash_scheme: Some(HashScheme::Structured),
        })
        .unwrap()
    }

    fn signed(registry: &InMemoryRegistry, owner: &BbsKeyPair, identity: OwnedIdentity, new_owner: Address) -> ChangeOwnerCall {
        let message = OwnerChangeMessage {
            identity,
            old_owner: bbs_address(owner.public_key()),
            new_owner,
        };
        let digest = owner_change_digest(
            HashScheme::Structured,
            &message,
            1,
            registry.network().registry,
        );
        ChangeOwnerCall {
            identity,
            new_owner,
            public_key: owner.public_key().to_uncompressed(),
            signature: owner.sign(&digest).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_accepts_owner_and_records_history() {
        let registry = registry();
        let owner = BbsKeyPair::generate(&mut OsRng);
        let identity = OwnedIdentity::Single {
            address: bbs_address(owner.public_key()),
        };
        let (function, args) = signed(&registry, &owner, identity, Address::repeat_byte(7)).encode();
        let receipt = registry
            .send(Address::repeat_byte(0xdc), function, args)
            .await
            .unwrap();
        assert!(receipt.status);
        assert_eq!(registry.owner(&identity), Address::repeat_byte(7));
        assert_eq!(registry.history(&identity).len(), 1);
    }

    #[tokio::test]
    async fn test_replay_reverts_bad_actor() {
        let registry = registry();
        let owner = BbsKeyPair::generate(&mut OsRng);
        let identity = OwnedIdentity::Single {
            address: bbs_address(owner.public_key()),
        };
        let (function, args) = signed(&registry, &owner, identity, Address::repeat_byte(7)).encode();
        registry
            .send(Address::repeat_byte(0xdc), function, args.clone())
            .await
            .unwrap();
        match registry.send(Address::repeat_byte(0xdc), function, args).await {
            Err(Error::Reverted(reason)) => assert_eq!(reason, REVERT_BAD_ACTOR),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(registry.submission_count(), 2);
        assert_eq!(registry.history(&identity).len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_assembles_from_events() {
        let registry = registry();
        let did = EthrDid::new(None, Address::repeat_byte(1));
        registry.push_event(
            &did,
            RegistryEvent::DelegateChanged {
                delegate_type: DelegateType::VeriKey,
                delegate: Address::repeat_byte(2),
                valid_to: u64::MAX,
            },
        );
        let document = registry.resolve(&did).await.unwrap();
        assert!(document.is_assertion_method(&did.method_id("delegate-1")));
        assert_eq!(registry.resolve_count(), 1);
        assert_eq!(registry.state(&did).version, 1);
    }

    #[test]
    fn test_supports_only_its_network() {
        let registry = registry();
        assert!(registry.supports(&EthrDid::new(None, Address::zero())));
        assert!(!registry.supports(&EthrDid::new(Some("sepolia".into()), Address::zero())));
    }
}
