// src/utils/serialization.rs
//! Serialization utilities for the DID system.
//!
//! Provides:
//! - canonical JSON bytes used as signing input
//! - hex / base64 helpers for key and signature material

use ethers::utils::hex;
use serde::Serialize;

use crate::error::{Error, Result};

/// Serializes a value to canonical JSON bytes.
///
/// The value is routed through `serde_json::Value`, whose object maps are ordered by key, so two
/// structurally equal values always produce identical bytes.
pub fn canonical_json<T: Serialize>(data: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(data)?;
    Ok(serde_json::to_vec(&value)?)
}

/// Lower-case hex with a `0x` prefix.
pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Decodes hex with or without the `0x` prefix.
pub fn from_hex(data: &str) -> Result<Vec<u8>> {
    hex::decode(data.trim_start_matches("0x"))
        .map_err(|e| Error::UnknownKeyType(format!("invalid hex payload: {}", e).into()))
}

/// Encodes signature bytes for a proof value.
pub fn to_base64(bytes: &[u8]) -> String {
    base64::encode(bytes)
}

/// Decodes a proof value.
///
/// # Returns
/// `None` when the payload is not valid base64; callers treat that as an unverifiable proof.
pub fn from_base64(data: &str) -> Option<Vec<u8>> {
    base64::decode(data).ok()
}
