// src/models/did.rs
//! `did:ethr` identifier model.
//!
//! Grammar: `did:ethr:[<network>:]0x<40-hex>[:0x<40-hex>]`. The network segment is optional (its
//! absence denotes mainnet); a second address segment turns the identifier into a dual-address
//! identifier, which is treated as one opaque controller.

use std::fmt;
use std::str::FromStr;

use ethers::types::{Address, H256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::utils::crypto::{checksummed, hash_data};

pub const DID_PREFIX: &str = "did:ethr:";

/// Fragment of the account-recovery verification method.
pub const CONTROLLER_FRAGMENT: &str = "controller";

/// Fragment of the synthesized, never materialized BBS assertion key.
pub const IMPLICIT_BBS_FRAGMENT: &str = "keys-bbs";

/// A parsed `did:ethr` identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EthrDid {
    network: Option<String>,
    primary: Address,
    secondary: Option<Address>,
}

impl EthrDid {
    pub fn new(network: Option<String>, primary: Address) -> Self {
        Self {
            network,
            primary,
            secondary: None,
        }
    }

    /// Builds a dual-address identifier from a secp256k1 address and a BBS key address.
    pub fn dual(network: Option<String>, primary: Address, secondary: Address) -> Self {
        Self {
            network,
            primary,
            secondary: Some(secondary),
        }
    }

    pub fn parse(did: &str) -> Result<Self> {
        let rest = did.strip_prefix(DID_PREFIX).ok_or_else(|| {
            Error::MalformedIdentifier(format!("expected {:?} prefix in {:?}", DID_PREFIX, did).into())
        })?;
        if rest.contains('#') || rest.contains('?') || rest.contains('/') {
            return Err(Error::MalformedIdentifier(
                format!("{:?} is a DID URL, not a DID", did).into(),
            ));
        }

        let segments: Vec<&str> = rest.split(':').collect();
        let (network, addresses) = match segments.as_slice() {
            [a] => (None, vec![*a]),
            [a, b] if looks_like_address(a) => (None, vec![*a, *b]),
            [network, a] => (Some(*network), vec![*a]),
            [network, a, b] => (Some(*network), vec![*a, *b]),
            _ => {
                return Err(Error::MalformedIdentifier(
                    format!("too many segments in {:?}", did).into(),
                ))
            }
        };

        if let Some(network) = network {
            if network.is_empty()
                || !network
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            {
                return Err(Error::MalformedIdentifier(
                    format!("invalid network segment {:?}", network).into(),
                ));
            }
        }

        let primary = parse_address(addresses[0])?;
        let secondary = addresses.get(1).map(|a| parse_address(a)).transpose()?;

        Ok(Self {
            network: network.map(str::to_string),
            primary,
            secondary,
        })
    }

    pub fn network(&self) -> Option<&str> {
        self.network.as_deref()
    }

    pub fn primary(&self) -> Address {
        self.primary
    }

    pub fn secondary(&self) -> Option<Address> {
        self.secondary
    }

    pub fn is_dual(&self) -> bool {
        self.secondary.is_some()
    }

    /// The address a verification method fragment is bound to. On dual identifiers the implicit
    /// BBS key belongs to the secondary address and everything else to the primary.
    pub fn address_for_fragment(&self, fragment: Option<&str>) -> Address {
        match (fragment, self.secondary) {
            (Some(IMPLICIT_BBS_FRAGMENT), Some(secondary)) => secondary,
            _ => self.primary,
        }
    }

    /// Correlation id of a dual identifier, `keccak256(primary ‖ secondary)`.
    pub fn pseudo_id(&self) -> Option<H256> {
        self.secondary
            .map(|secondary| pseudo_id(&self.primary, &secondary))
    }

    /// `<did>#<fragment>`
    pub fn method_id(&self, fragment: &str) -> String {
        format!("{}#{}", self, fragment)
    }

    pub fn implicit_bbs_id(&self) -> String {
        self.method_id(IMPLICIT_BBS_FRAGMENT)
    }

    pub fn controller_id(&self) -> String {
        self.method_id(CONTROLLER_FRAGMENT)
    }
}

pub fn pseudo_id(primary: &Address, secondary: &Address) -> H256 {
    let mut packed = Vec::with_capacity(40);
    packed.extend_from_slice(primary.as_bytes());
    packed.extend_from_slice(secondary.as_bytes());
    H256::from(hash_data(&packed))
}

/// Splits a DID URL such as `did:ethr:0x..#controller` into the DID and its fragment.
pub fn split_did_url(did_url: &str) -> (&str, Option<&str>) {
    match did_url.split_once('#') {
        Some((did, fragment)) => (did, Some(fragment)),
        None => (did_url, None),
    }
}

fn looks_like_address(segment: &str) -> bool {
    segment.len() == 42 && (segment.starts_with("0x") || segment.starts_with("0X"))
}

fn parse_address(segment: &str) -> Result<Address> {
    let hex = segment
        .strip_prefix("0x")
        .or_else(|| segment.strip_prefix("0X"))
        .ok_or_else(|| {
            Error::MalformedIdentifier(format!("address {:?} lacks 0x prefix", segment).into())
        })?;
    if hex.len() != 40 {
        return Err(Error::MalformedIdentifier(
            format!("address {:?} must be 20 bytes", segment).into(),
        ));
    }
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::MalformedIdentifier(
            format!("address {:?} is not hex", segment).into(),
        ));
    }
    Address::from_str(hex)
        .map_err(|e| Error::MalformedIdentifier(format!("address {:?}: {}", segment, e).into()))
}

impl fmt::Display for EthrDid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(DID_PREFIX)?;
        if let Some(network) = &self.network {
            write!(f, "{}:", network)?;
        }
        f.write_str(&checksummed(&self.primary))?;
        if let Some(secondary) = &self.secondary {
            write!(f, ":{}", checksummed(secondary))?;
        }
        Ok(())
    }
}

impl FromStr for EthrDid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for EthrDid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EthrDid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
