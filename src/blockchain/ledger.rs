// src/blockchain/ledger.rs
//! Ledger-facing collaborator interfaces.
//!
//! The verification pipeline and the ownership-transfer protocol never talk to a node directly;
//! they go through these traits so that an RPC-backed client, an in-memory registry or a caller's
//! own adapter can be injected.

use ethers::abi::Token;
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::did::{split_did_url, EthrDid};
use crate::models::document::{DidDocument, VerificationMethod};

/// Fetches authoritative, ledger-backed DID documents.
#[async_trait::async_trait]
pub trait LedgerResolver: Send + Sync {
    /// Whether this resolver can serve `did` (usually: its network is known).
    fn supports(&self, did: &EthrDid) -> bool;

    /// Resolves the current document, implicit key rule already applied.
    ///
    /// # Errors
    /// Transport failures propagate unchanged as [`Error::Ledger`].
    async fn resolve(&self, did: &EthrDid) -> Result<DidDocument>;

    /// Resolves a DID URL to one verification method of the ledger document.
    async fn resolve_method(&self, did_url: &str) -> Result<Option<VerificationMethod>> {
        let (did, _) = split_did_url(did_url);
        let did = EthrDid::parse(did)?;
        let document = self.resolve(&did).await?;
        Ok(document.verification_method(did_url).cloned())
    }
}

/// Submits registry transactions.
#[async_trait::async_trait]
pub trait TransactionSubmitter: Send + Sync {
    /// Sends one transaction calling `function` (a full signature such as
    /// `changeOwnerWithPubkey(address,address,bytes,bytes)`) on `contract`.
    ///
    /// # Errors
    /// [`Error::Reverted`] when the node reports a revert before a receipt exists,
    /// [`Error::Ledger`] for transport failures.
    async fn send(&self, contract: Address, function: &str, args: Vec<Token>) -> Result<Receipt>;
}

/// Outcome of a submitted transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub status: bool,
    pub tx_hash: H256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revert_reason: Option<String>,
}

/// Delegate kinds the registry publishes in documents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DelegateType {
    /// Assertion (credential signing) key.
    #[serde(rename = "veriKey")]
    VeriKey,
    /// Authentication key; also usable for assertions.
    #[serde(rename = "sigAuth")]
    SigAuth,
}

impl DelegateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VeriKey => "veriKey",
            Self::SigAuth => "sigAuth",
        }
    }

    /// Parses the bytes32 delegate type emitted by the registry (right padded with zeros).
    pub fn from_bytes32(raw: &[u8]) -> Option<Self> {
        let trimmed: Vec<u8> = raw.iter().copied().take_while(|b| *b != 0).collect();
        match trimmed.as_slice() {
            b"veriKey" => Some(Self::VeriKey),
            b"sigAuth" => Some(Self::SigAuth),
            _ => None,
        }
    }
}

/// One registry change affecting the document, in emission order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "event")]
pub enum RegistryEvent {
    DelegateChanged {
        delegate_type: DelegateType,
        delegate: Address,
        valid_to: u64,
    },
    AttributeChanged {
        name: String,
        value: Vec<u8>,
        valid_to: u64,
    },
}

/// Registry state of one identity, the input of ledger document assembly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerState {
    /// `identityOwner(identity)`; the zero address means deactivated.
    pub owner: Address,
    #[serde(default)]
    pub events: Vec<RegistryEvent>,
    /// Block of the last change, 0 if never changed.
    #[serde(default)]
    pub version: u64,
    /// Timestamp validity is evaluated against.
    #[serde(default)]
    pub now: u64,
}

impl LedgerState {
    /// State of an identity the registry has never seen.
    pub fn untouched(owner: Address) -> Self {
        Self {
            owner,
            events: Vec::new(),
            version: 0,
            now: 0,
        }
    }

    pub fn is_deactivated(&self) -> bool {
        self.owner.is_zero()
    }
}

pub(crate) fn ledger_error(context: &str, error: impl std::fmt::Display) -> Error {
    Error::Ledger(format!("{}: {}", context, error))
}
