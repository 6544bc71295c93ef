// src/config.rs
//! Network configuration.
//!
//! Settings are read with the `config` crate from an optional file and `ETHR_DID__*` environment
//! overrides, then validated into an immutable [`Networks`] table that resolvers, submitters and
//! the history reconstructor look networks up in.
//!
//! ```toml
//! [[networks]]
//! name = "sepolia"
//! rpcUrl = "https://rpc.sepolia.org"
//! registryAddress = "0x03d5003bf0e79c5f5223588f347eba39afbc3818"
//! hashScheme = "structured"
//! ```

use std::collections::HashMap;
use std::str::FromStr;

use ethers::types::Address;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::contracts::owner_digest::HashScheme;
use crate::error::{Error, Result};
use crate::models::did::EthrDid;

/// Network an identifier without a network segment belongs to.
pub const DEFAULT_NETWORK: &str = "mainnet";

/// Chain id used by default documents when no hint is available.
pub const DEFAULT_CHAIN_ID: u64 = 1;

/// Prefix of environment overrides, e.g. `ETHR_DID__NETWORKS`.
pub const ENV_PREFIX: &str = "ETHR_DID";

/// One network entry as written in configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    pub name: String,
    pub rpc_url: String,
    pub registry_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_scheme: Option<HashScheme>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default)]
    pub networks: Vec<NetworkConfig>,
}

impl ResolverConfig {
    /// Loads configuration from `path` (any format the `config` crate understands, optional) and
    /// the environment.
    ///
    /// # Errors
    /// Returns `ConfigurationError` if a source cannot be read or does not deserialize.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Validates the configuration into a lookup table.
    pub fn networks(&self) -> Result<Networks> {
        Networks::new(self.networks.clone())
    }
}

/// A validated network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Network {
    pub name: String,
    pub rpc_url: Url,
    pub registry: Address,
    pub chain_id: u64,
    pub hash_scheme: Option<HashScheme>,
}

impl Network {
    fn from_config(config: NetworkConfig) -> Result<Self> {
        let rpc_url = Url::parse(&config.rpc_url).map_err(|e| {
            Error::ConfigurationError(format!("network {}: bad rpcUrl: {}", config.name, e).into())
        })?;
        if !matches!(rpc_url.scheme(), "http" | "https") {
            return Err(Error::ConfigurationError(
                format!("network {}: rpcUrl must be http(s)", config.name).into(),
            ));
        }
        let registry = Address::from_str(&config.registry_address).map_err(|e| {
            Error::ConfigurationError(
                format!("network {}: bad registryAddress: {}", config.name, e).into(),
            )
        })?;
        let chain_id = config
            .chain_id
            .or_else(|| known_chain_id(&config.name))
            .ok_or_else(|| {
                Error::ConfigurationError(
                    format!("network {}: chainId is required", config.name).into(),
                )
            })?;
        Ok(Self {
            name: config.name,
            rpc_url,
            registry,
            chain_id,
            hash_scheme: config.hash_scheme,
        })
    }
}

/// Chain ids of well known network names, including `0x`-prefixed chain id names.
pub fn known_chain_id(name: &str) -> Option<u64> {
    match name {
        "mainnet" => Some(1),
        "goerli" => Some(5),
        "sepolia" => Some(11_155_111),
        "holesky" => Some(17_000),
        "polygon" => Some(137),
        hex => hex
            .strip_prefix("0x")
            .and_then(|digits| u64::from_str_radix(digits, 16).ok()),
    }
}

/// Immutable, validated network table.
#[derive(Clone, Debug)]
pub struct Networks {
    by_name: HashMap<String, Network>,
}

impl Networks {
    /// # Errors
    /// `ConfigurationError` for an empty list, duplicate names or an invalid entry.
    pub fn new(configs: Vec<NetworkConfig>) -> Result<Self> {
        if configs.is_empty() {
            return Err(Error::ConfigurationError(
                "at least one network must be configured".into(),
            ));
        }
        let mut by_name = HashMap::with_capacity(configs.len());
        for config in configs {
            let network = Network::from_config(config)?;
            if by_name.contains_key(&network.name) {
                return Err(Error::ConfigurationError(
                    format!("network {} configured twice", network.name).into(),
                ));
            }
            log::debug!(
                "network {} chain {} registry {:?}",
                network.name,
                network.chain_id,
                network.registry
            );
            by_name.insert(network.name.clone(), network);
        }
        Ok(Self { by_name })
    }

    /// Looks a network up by name; `None` means [`DEFAULT_NETWORK`].
    pub fn get(&self, name: Option<&str>) -> Result<&Network> {
        let name = name.unwrap_or(DEFAULT_NETWORK);
        self.by_name.get(name).ok_or_else(|| {
            Error::ConfigurationError(format!("network {} is not configured", name).into())
        })
    }

    pub fn for_did(&self, did: &EthrDid) -> Result<&Network> {
        self.get(did.network())
    }

    pub fn chain_id_hint(&self, did: &EthrDid) -> Option<u64> {
        self.for_did(did).ok().map(|network| network.chain_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Network> {
        self.by_name.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> NetworkConfig {
        NetworkConfig {
            name: name.to_string(),
            rpc_url: "https://rpc.example.org".to_string(),
            registry_address: "0xdca7ef03e98e0dc2b855be647c39abe984fcf21b".to_string(),
            chain_id: None,
            hash_scheme: Some(HashScheme::Structured),
        }
    }

    #[test]
    fn test_empty_list_is_rejected() {
        assert!(matches!(
            Networks::new(Vec::new()),
            Err(Error::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_lookup_and_default_network() {
        let networks = Networks::new(vec![entry("mainnet"), entry("sepolia")]).unwrap();
        assert_eq!(networks.get(None).unwrap().chain_id, 1);
        assert_eq!(networks.get(Some("sepolia")).unwrap().chain_id, 11_155_111);
        assert!(matches!(
            networks.get(Some("polygon")),
            Err(Error::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_invalid_entries() {
        let mut duplicate = vec![entry("mainnet"), entry("mainnet")];
        assert!(Networks::new(duplicate.clone()).is_err());

        duplicate.pop();
        duplicate[0].rpc_url = "ws://rpc.example.org".into();
        assert!(Networks::new(duplicate.clone()).is_err());

        let mut unknown = entry("private");
        assert!(Networks::new(vec![unknown.clone()]).is_err());
        unknown.chain_id = Some(1337);
        assert_eq!(Networks::new(vec![unknown]).unwrap().get(Some("private")).unwrap().chain_id, 1337);

        let mut registry = entry("mainnet");
        registry.registry_address = "0x1234".into();
        assert!(Networks::new(vec![registry]).is_err());
    }

    #[test]
    fn test_hex_network_names() {
        assert_eq!(known_chain_id("0x5"), Some(5));
        assert_eq!(known_chain_id("0xzz"), None);
    }

    #[test]
    fn test_deserializes_camel_case() {
        let config: ResolverConfig = serde_json::from_str(
            r#"{"networks":[{"name":"goerli","rpcUrl":"http://localhost:8545","registryAddress":"0xdca7ef03e98e0dc2b855be647c39abe984fcf21b","hashScheme":"legacy"}]}"#,
        )
        .unwrap();
        let networks = config.networks().unwrap();
        let goerli = networks.get(Some("goerli")).unwrap();
        assert_eq!(goerli.chain_id, 5);
        assert_eq!(goerli.hash_scheme, Some(HashScheme::Legacy));
    }
}
