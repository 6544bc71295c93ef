// src/services/resolver.rs
//! DID document construction.
//!
//! Two kinds of documents are built here:
//! - the *default* document, computable from the identifier alone
//! - the *ledger* document, assembled from registry state the way ERC-1056 resolvers do it
//!
//! Both go through [`with_implicit_key`], which adds the synthetic `#keys-bbs` assertion key
//! unless the document has graduated to an explicitly registered BBS-family key.

use std::collections::HashMap;

use ethers::types::Address;
use ethers::utils::hex;

use crate::blockchain::ledger::{DelegateType, LedgerState, RegistryEvent};
use crate::config::DEFAULT_CHAIN_ID;
use crate::models::did::EthrDid;
use crate::models::document::{DidDocument, Service, VerificationMethod, RECOVERY_METHOD_TYPE};
use crate::models::ownership::OwnedIdentity;
use crate::utils::crypto::checksummed;

/// `eip155:<chain>:<checksummed address>`
pub fn account_id(chain_id: u64, address: &Address) -> String {
    format!("eip155:{}:{}", chain_id, checksummed(address))
}

/// The minimal document of an identifier that has never touched the registry.
///
/// One visible verification method, `#controller`, referencing the primary address, plus the
/// implicit BBS key in `assertionMethod`.
pub fn default_document(did: &EthrDid, chain_hint: Option<u64>) -> DidDocument {
    let chain_id = chain_hint.unwrap_or(DEFAULT_CHAIN_ID);
    let mut document = DidDocument::new(did.clone());
    let controller = controller_method(did, chain_id, &did.primary());
    document.authentication.push(controller.id.clone());
    document.assertion_method.push(controller.id.clone());
    document.verification_method.push(controller);
    with_implicit_key(&document)
}

/// Copy of `document` with the implicit BBS key id appended to `assertionMethod`.
///
/// Suppressed only when an explicit BBS/PS/BBDT16 key type is present; the id is never
/// duplicated.
pub fn with_implicit_key(document: &DidDocument) -> DidDocument {
    let mut extended = document.clone();
    let implicit = document.id.implicit_bbs_id();
    if !document.has_explicit_bbs_key() && !document.is_assertion_method(&implicit) {
        extended.assertion_method.push(implicit);
    }
    extended
}

/// Attribute names understood by the assembler.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum AttributeName {
    /// `did/pub/<algorithm>/<purpose>/<encoding>`
    PublicKey { key_type: String, purpose: String },
    /// `did/svc/<type>`
    Service { service_type: String },
}

fn parse_attribute(name: &str) -> Option<AttributeName> {
    let parts: Vec<&str> = name.split('/').collect();
    match parts.as_slice() {
        ["did", "pub", algorithm, purpose, "hex" | "base64" | "base58"] => {
            Some(AttributeName::PublicKey {
                key_type: key_type_for(algorithm),
                purpose: purpose.to_string(),
            })
        }
        ["did", "pub", algorithm, purpose] => Some(AttributeName::PublicKey {
            key_type: key_type_for(algorithm),
            purpose: purpose.to_string(),
        }),
        ["did", "svc", service_type] => Some(AttributeName::Service {
            service_type: service_type.to_string(),
        }),
        _ => None,
    }
}

fn key_type_for(algorithm: &str) -> String {
    match algorithm {
        "Secp256k1" => "EcdsaSecp256k1VerificationKey2019",
        "Ed25519" => "Ed25519VerificationKey2018",
        "X25519" => "X25519KeyAgreementKey2019",
        "Bls12381G2" => "Bls12381G2VerificationKeyDock2022",
        "Bls12381BBS23" => "Bls12381BBSVerificationKeyDock2023",
        "Bls12381PS23" => "Bls12381PSVerificationKeyDock2023",
        "Bls12381BBDT16" => "Bls12381BBDT16VerificationKeyDock2024",
        // already a full type name, e.g. Bls12381G2Key2020
        other => other,
    }
    .to_string()
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum EntryKey {
    Delegate(DelegateType, Address),
    Attribute(AttributeName, Vec<u8>),
}

/// Builds the ledger document of `did` from its registry state.
///
/// Every delegate and public key event consumes a `#delegate-N` index and every service event a
/// `#service-N` index, expired or not; an expired event removes a live entry with the same key.
pub fn assemble_document(did: &EthrDid, chain_id: u64, state: &LedgerState) -> DidDocument {
    let mut document = DidDocument::new(did.clone());
    if state.is_deactivated() {
        log::debug!("{} is deactivated", did);
        return document;
    }

    let account = if state.owner == OwnedIdentity::from(did).initial_owner() {
        did.primary()
    } else {
        document.controller = Some(EthrDid::new(did.network().map(str::to_string), state.owner));
        state.owner
    };
    let controller = controller_method(did, chain_id, &account);
    document.authentication.push(controller.id.clone());
    document.assertion_method.push(controller.id.clone());
    document.verification_method.push(controller);

    let mut delegate_count = 0usize;
    let mut service_count = 0usize;
    let mut live: HashMap<EntryKey, usize> = HashMap::new();

    for event in &state.events {
        let (key, index, valid_to) = match event {
            RegistryEvent::DelegateChanged {
                delegate_type,
                delegate,
                valid_to,
            } => {
                delegate_count += 1;
                (
                    EntryKey::Delegate(*delegate_type, *delegate),
                    delegate_count,
                    *valid_to,
                )
            }
            RegistryEvent::AttributeChanged {
                name,
                value,
                valid_to,
            } => match parse_attribute(name) {
                Some(attribute @ AttributeName::PublicKey { .. }) => {
                    delegate_count += 1;
                    (
                        EntryKey::Attribute(attribute, value.clone()),
                        delegate_count,
                        *valid_to,
                    )
                }
                Some(attribute @ AttributeName::Service { .. }) => {
                    service_count += 1;
                    (
                        EntryKey::Attribute(attribute, value.clone()),
                        service_count,
                        *valid_to,
                    )
                }
                None => {
                    log::trace!("ignoring attribute {}", name);
                    continue;
                }
            },
        };
        if valid_to <= state.now {
            log::trace!("expired {:?}", key);
            live.remove(&key);
        } else {
            live.insert(key, index);
        }
    }

    let mut entries: Vec<(EntryKey, usize)> = live.into_iter().collect();
    entries.sort_by_key(|(key, index)| {
        let is_service = matches!(key, EntryKey::Attribute(AttributeName::Service { .. }, _));
        (is_service, *index)
    });

    for (key, index) in entries {
        match key {
            EntryKey::Delegate(delegate_type, delegate) => {
                let method = VerificationMethod {
                    id: did.method_id(&format!("delegate-{}", index)),
                    type_: RECOVERY_METHOD_TYPE.to_string(),
                    controller: did.to_string(),
                    blockchain_account_id: Some(account_id(chain_id, &delegate)),
                    public_key_hex: None,
                };
                push_with_purpose(&mut document, method, delegate_type.as_str());
            }
            EntryKey::Attribute(AttributeName::PublicKey { key_type, purpose }, value) => {
                let method = VerificationMethod {
                    id: did.method_id(&format!("delegate-{}", index)),
                    type_: key_type,
                    controller: did.to_string(),
                    blockchain_account_id: None,
                    public_key_hex: Some(hex::encode(&value)),
                };
                push_with_purpose(&mut document, method, &purpose);
            }
            EntryKey::Attribute(AttributeName::Service { service_type }, value) => {
                document.service.push(Service {
                    id: did.method_id(&format!("service-{}", index)),
                    type_: service_type,
                    service_endpoint: String::from_utf8_lossy(&value).into_owned(),
                });
            }
        }
    }

    with_implicit_key(&document)
}

fn controller_method(did: &EthrDid, chain_id: u64, owner: &Address) -> VerificationMethod {
    VerificationMethod {
        id: did.controller_id(),
        type_: RECOVERY_METHOD_TYPE.to_string(),
        controller: did.to_string(),
        blockchain_account_id: Some(account_id(chain_id, owner)),
        public_key_hex: None,
    }
}

fn push_with_purpose(document: &mut DidDocument, method: VerificationMethod, purpose: &str) {
    match purpose {
        "veriKey" => document.assertion_method.push(method.id.clone()),
        "sigAuth" => {
            document.authentication.push(method.id.clone());
            document.assertion_method.push(method.id.clone());
        }
        other => log::trace!("{} has unpublished purpose {}", method.id, other),
    }
    document.verification_method.push(method);
}
