// src/blockchain/ethers_client.rs
//! JSON-RPC client for a deployed DID registry.
//!
//! Reads owners and replays registry events into a [`LedgerState`] the way ERC-1056 resolvers do
//! (walking the `previousChange` chain backwards from `changed(identity)`), and sends owner change
//! transactions through a local signing wallet.

use std::str::FromStr;
use std::sync::Arc;

use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, MiddlewareError, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{
    transaction::eip2718::TypedTransaction, Address, BlockNumber, Bytes, Filter, Log,
    TransactionRequest, H256, U256, U64,
};
use ethers_core::abi::{decode, encode, ParamType, Token};
use once_cell::sync::Lazy;

use crate::blockchain::ledger::{
    ledger_error, DelegateType, LedgerResolver, LedgerState, Receipt, RegistryEvent,
    TransactionSubmitter,
};
use crate::config::{Network, DEFAULT_NETWORK};
use crate::contracts::did_registry::{
    event_topic, selector, CHANGED, DID_ATTRIBUTE_CHANGED, DID_DELEGATE_CHANGED,
    DID_OWNER_CHANGED, IDENTITY_OWNER, IDENTITY_OWNER_DUAL,
};
use crate::error::{Error, Result};
use crate::models::did::EthrDid;
use crate::models::document::DidDocument;
use crate::models::ownership::OwnedIdentity;
use crate::services::resolver::assemble_document;

static OWNER_CHANGED_TOPIC: Lazy<H256> = Lazy::new(|| event_topic(DID_OWNER_CHANGED));
static DELEGATE_CHANGED_TOPIC: Lazy<H256> = Lazy::new(|| event_topic(DID_DELEGATE_CHANGED));
static ATTRIBUTE_CHANGED_TOPIC: Lazy<H256> = Lazy::new(|| event_topic(DID_ATTRIBUTE_CHANGED));

const REVERT_MARKER: &str = "execution reverted";

type Wallet = SignerMiddleware<Arc<Provider<Http>>, LocalWallet>;

/// Registry client for one network.
///
/// Without a private key the client is read-only and can only act as a [`LedgerResolver`].
#[derive(Clone)]
pub struct EthersRegistryClient {
    /// JSON-RPC provider
    provider: Arc<Provider<Http>>,
    /// Network the registry is deployed on
    network: Network,
    /// Signing middleware for registry transactions
    signer: Option<Arc<Wallet>>,
}

impl EthersRegistryClient {
    /// Creates a read-only client.
    ///
    /// # Arguments
    /// * `network` - Network holding the RPC endpoint and registry address
    ///
    /// # Errors
    /// `ConfigurationError` if the provider cannot be built from the RPC URL.
    pub fn new(network: Network) -> Result<Self> {
        let provider = Provider::<Http>::try_from(network.rpc_url.as_str()).map_err(|e| {
            Error::ConfigurationError(format!("invalid rpc url {}: {}", network.rpc_url, e).into())
        })?;
        Ok(Self {
            provider: Arc::new(provider),
            network,
            signer: None,
        })
    }

    /// Attaches a signing wallet so the client can submit transactions.
    ///
    /// # Arguments
    /// * `private_key` - Hex-encoded secp256k1 key (with or without 0x prefix)
    ///
    /// # Errors
    /// `ConfigurationError` if the key is invalid.
    pub fn with_private_key(mut self, private_key: &str) -> Result<Self> {
        let wallet = LocalWallet::from_str(private_key.trim_start_matches("0x"))
            .map_err(|e| Error::ConfigurationError(format!("invalid private key: {}", e).into()))?
            .with_chain_id(self.network.chain_id);
        self.signer = Some(Arc::new(SignerMiddleware::new(self.provider.clone(), wallet)));
        Ok(self)
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Address paying for submitted transactions, if a wallet is attached.
    pub fn sender(&self) -> Option<Address> {
        self.signer.as_ref().map(|signer| signer.address())
    }

    async fn call(&self, function: &str, args: &[Token], output: &[ParamType]) -> Result<Vec<Token>> {
        let tx: TypedTransaction = TransactionRequest::new()
            .to(self.network.registry)
            .data(calldata(function, args))
            .into();
        let raw = self
            .provider
            .call(&tx, None)
            .await
            .map_err(|e| ledger_error(function, e))?;
        decode(output, &raw).map_err(|e| ledger_error(function, e))
    }

    /// Current owner of `identity` as reported by the registry.
    pub async fn identity_owner(&self, identity: &OwnedIdentity) -> Result<Address> {
        let (function, args) = match *identity {
            OwnedIdentity::Single { address } => (IDENTITY_OWNER, vec![Token::Address(address)]),
            OwnedIdentity::Dual { primary, secondary } => (
                IDENTITY_OWNER_DUAL,
                vec![Token::Address(primary), Token::Address(secondary)],
            ),
        };
        match self.call(function, &args, &[ParamType::Address]).await?.as_slice() {
            [Token::Address(owner)] => Ok(*owner),
            _ => Err(Error::Ledger(format!("{}: unexpected return data", function))),
        }
    }

    /// Block of the last change to `identity`, 0 if it never changed.
    pub async fn changed(&self, identity: Address) -> Result<u64> {
        match self
            .call(CHANGED, &[Token::Address(identity)], &[ParamType::Uint(256)])
            .await?
            .as_slice()
        {
            [Token::Uint(block)] => Ok(saturating_u64(*block)),
            _ => Err(Error::Ledger(format!("{}: unexpected return data", CHANGED))),
        }
    }

    /// Reads the owner and replays every registry event of `did`.
    ///
    /// Events are indexed under the DID's primary address for both identity kinds.
    pub async fn ledger_state(&self, did: &EthrDid) -> Result<LedgerState> {
        let owner = self.identity_owner(&OwnedIdentity::from(did)).await?;
        let version = self.changed(did.primary()).await?;
        let topic = H256::from(did.primary());

        let mut events = Vec::new();
        let mut block = version;
        while block != 0 {
            let filter = Filter::new()
                .address(self.network.registry)
                .topic1(topic)
                .from_block(block)
                .to_block(block);
            let logs = self
                .provider
                .get_logs(&filter)
                .await
                .map_err(|e| ledger_error("eth_getLogs", e))?;
            let mut previous = 0;
            for log in logs.iter().rev() {
                let Some(decoded) = decode_log(log)? else {
                    continue;
                };
                events.extend(decoded.event);
                // same-block changes point at the current block
                if decoded.previous_change < block {
                    previous = decoded.previous_change;
                }
            }
            block = previous;
        }
        events.reverse();

        let now = self
            .provider
            .get_block(BlockNumber::Latest)
            .await
            .map_err(|e| ledger_error("eth_getBlockByNumber", e))?
            .map(|latest| latest.timestamp.low_u64())
            .unwrap_or_default();
        log::debug!(
            "{}: owner {:?}, {} events, last change at block {}",
            did,
            owner,
            events.len(),
            version
        );
        Ok(LedgerState {
            owner,
            events,
            version,
            now,
        })
    }
}

#[async_trait::async_trait]
impl LedgerResolver for EthersRegistryClient {
    fn supports(&self, did: &EthrDid) -> bool {
        did.network().unwrap_or(DEFAULT_NETWORK) == self.network.name
    }

    async fn resolve(&self, did: &EthrDid) -> Result<DidDocument> {
        let state = self.ledger_state(did).await?;
        Ok(assemble_document(did, self.network.chain_id, &state))
    }
}

#[async_trait::async_trait]
impl TransactionSubmitter for EthersRegistryClient {
    async fn send(&self, contract: Address, function: &str, args: Vec<Token>) -> Result<Receipt> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| Error::PreconditionError("no signing key configured".into()))?;
        let tx = TransactionRequest::new()
            .to(contract)
            .data(calldata(function, &args));
        let pending = match signer.send_transaction(tx, None).await {
            Ok(pending) => pending,
            Err(e) => {
                return Err(match e
                    .as_error_response()
                    .and_then(|rpc| revert_reason(&rpc.message))
                {
                    Some(reason) => Error::Reverted(reason.to_string()),
                    None => ledger_error(function, &e),
                })
            }
        };
        let tx_hash = pending.tx_hash();
        log::info!("sent {} in {:?}", function, tx_hash);
        let receipt = pending
            .await
            .map_err(|e| ledger_error(function, e))?
            .ok_or_else(|| Error::Ledger(format!("transaction {:?} dropped", tx_hash)))?;
        Ok(Receipt {
            status: receipt.status == Some(U64::one()),
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number.map(|block| block.as_u64()),
            gas_used: receipt.gas_used,
            revert_reason: None,
        })
    }
}

/// A registry log reduced to what document assembly needs.
#[derive(Debug, PartialEq, Eq)]
struct DecodedLog {
    /// `None` for owner changes and unknown delegate types.
    event: Option<RegistryEvent>,
    previous_change: u64,
}

fn calldata(function: &str, args: &[Token]) -> Bytes {
    let mut data = selector(function).to_vec();
    data.extend(encode(args));
    Bytes::from(data)
}

/// The reason of an `execution reverted` RPC error; `None` for any other error message.
fn revert_reason(message: &str) -> Option<&str> {
    let rest = message.strip_prefix(REVERT_MARKER)?;
    Some(
        rest.strip_prefix(": ")
            .filter(|reason| !reason.is_empty())
            .unwrap_or(message),
    )
}

fn saturating_u64(value: U256) -> u64 {
    if value > U256::from(u64::MAX) {
        u64::MAX
    } else {
        value.as_u64()
    }
}

fn bytes32_string(raw: &[u8]) -> String {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Decodes one registry log; `None` for logs of other events.
fn decode_log(log: &Log) -> Result<Option<DecodedLog>> {
    let Some(topic) = log.topics.first() else {
        return Ok(None);
    };
    let decode_data =
        |types: &[ParamType]| decode(types, &log.data).map_err(|e| ledger_error("log data", e));

    let decoded = if *topic == *OWNER_CHANGED_TOPIC {
        match decode_data(&[ParamType::Address, ParamType::Uint(256)])?.as_slice() {
            [Token::Address(_), Token::Uint(previous)] => DecodedLog {
                event: None,
                previous_change: saturating_u64(*previous),
            },
            _ => return Err(Error::Ledger("malformed DIDOwnerChanged".into())),
        }
    } else if *topic == *DELEGATE_CHANGED_TOPIC {
        match decode_data(&[
            ParamType::FixedBytes(32),
            ParamType::Address,
            ParamType::Uint(256),
            ParamType::Uint(256),
        ])?
        .as_slice()
        {
            [Token::FixedBytes(delegate_type), Token::Address(delegate), Token::Uint(valid_to), Token::Uint(previous)] => {
                DecodedLog {
                    event: DelegateType::from_bytes32(delegate_type).map(|delegate_type| {
                        RegistryEvent::DelegateChanged {
                            delegate_type,
                            delegate: *delegate,
                            valid_to: saturating_u64(*valid_to),
                        }
                    }),
                    previous_change: saturating_u64(*previous),
                }
            }
            _ => return Err(Error::Ledger("malformed DIDDelegateChanged".into())),
        }
    } else if *topic == *ATTRIBUTE_CHANGED_TOPIC {
        match decode_data(&[
            ParamType::FixedBytes(32),
            ParamType::Bytes,
            ParamType::Uint(256),
            ParamType::Uint(256),
        ])?
        .as_slice()
        {
            [Token::FixedBytes(name), Token::Bytes(value), Token::Uint(valid_to), Token::Uint(previous)] => {
                DecodedLog {
                    event: Some(RegistryEvent::AttributeChanged {
                        name: bytes32_string(name),
                        value: value.clone(),
                        valid_to: saturating_u64(*valid_to),
                    }),
                    previous_change: saturating_u64(*previous),
                }
            }
            _ => return Err(Error::Ledger("malformed DIDAttributeChanged".into())),
        }
    } else {
        return Ok(None);
    };
    Ok(Some(decoded))
}
