// src/main.rs

//! Command line entry point.
//!
//! ```text
//! ethr-did-verifier resolve <did>
//! ethr-did-verifier verify <credential.json>
//! ```
//!
//! ## Environment Variables
//! - `ETHR_DID_CONFIG`: (Optional) configuration file without extension (default: config/networks)
//! - `ETHR_DID__*`: overrides of individual configuration values
//! - `RUST_LOG`: log filter

use std::sync::Arc;

use anyhow::{bail, Context};
use dotenv::dotenv;

use ethr_did_verifier::blockchain::ethers_client::EthersRegistryClient;
use ethr_did_verifier::blockchain::ledger::LedgerResolver;
use ethr_did_verifier::config::{Networks, ResolverConfig};
use ethr_did_verifier::storage::staleness_cache::MemoryStalenessCache;
use ethr_did_verifier::{EthrDid, OptimisticVerifier, VerifiableCredential};

const DEFAULT_CONFIG: &str = "config/networks";

/// Loads and validates the configured networks.
///
/// # Errors
/// `ConfigurationError` when the configuration cannot be read or lists no networks.
fn load_networks() -> anyhow::Result<Networks> {
    let path = std::env::var("ETHR_DID_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG.to_string());
    let config = ResolverConfig::load(&path).context("loading configuration")?;
    let networks = config
        .networks()
        .with_context(|| format!("validating networks from {}", path))?;
    Ok(networks)
}

async fn resolve(did: &str, networks: &Networks) -> anyhow::Result<()> {
    let did = EthrDid::parse(did)?;
    let client = EthersRegistryClient::new(networks.for_did(&did)?.clone())?;
    let document = client.resolve(&did).await?;
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}

async fn verify(path: &str, networks: Networks) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
    let credential: VerifiableCredential = serde_json::from_str(&raw)?;
    let issuer = credential
        .issuer_did()
        .context("credential has no did:ethr issuer")?;
    let client = EthersRegistryClient::new(networks.for_did(&issuer)?.clone())?;
    let verifier = OptimisticVerifier::new(Arc::new(client))
        .with_cache(Arc::new(MemoryStalenessCache::new()))
        .with_networks(networks);
    let result = verifier.verify(&credential).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.verified {
        std::process::exit(1);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let networks = load_networks()?;
    match args.as_slice() {
        [command, did] if command == "resolve" => resolve(did, &networks).await,
        [command, path] if command == "verify" => verify(path, networks).await,
        _ => bail!("usage: ethr-did-verifier resolve <did> | verify <credential.json>"),
    }
}
