// src/wallet/address.rs
//! Address derivation, one pure function per key variant.
//!
//! Every variant ends in the same hash-and-truncate step: `keccak256(preimage)[12..]`. The
//! variants only differ in what the preimage is.

use ethers::types::Address;
use k256::elliptic_curve::sec1::ToEncodedPoint;

use crate::bls::keys::{decompress, BbsPublicKey, G2_UNCOMPRESSED_LEN};
use crate::error::{Error, Result};
use crate::utils::crypto::address_from_bytes;
use crate::wallet::key_material::KeyMaterial;

/// Secp256k1: hash of the 64-byte uncompressed point without the `0x04` tag.
pub fn secp256k1_address(key: &k256::PublicKey) -> Address {
    let point = key.to_encoded_point(false);
    address_from_bytes(&point.as_bytes()[1..])
}

/// Compressed BBS key: decompress to 192 bytes, then hash.
pub fn bbs_compressed_address(compressed: &[u8]) -> Result<Address> {
    Ok(address_from_bytes(&decompress(compressed)?))
}

/// Uncompressed BBS key: hash the 192 bytes directly.
pub fn bbs_uncompressed_address(uncompressed: &[u8]) -> Result<Address> {
    if uncompressed.len() != G2_UNCOMPRESSED_LEN {
        return Err(Error::UnsupportedKeyLength(uncompressed.len()));
    }
    Ok(address_from_bytes(uncompressed))
}

/// Address of an already validated BBS key.
pub fn bbs_address(key: &BbsPublicKey) -> Address {
    address_from_bytes(&key.to_uncompressed())
}

/// Address of any recognized key material.
pub fn derive_address(key: &KeyMaterial) -> Address {
    match key {
        KeyMaterial::Secp256k1(key) => secp256k1_address(key),
        KeyMaterial::BbsCompressed(key) | KeyMaterial::BbsUncompressed(key) => bbs_address(key),
    }
}

/// Classifies raw bytes and derives their address.
pub fn address_from_public_key(bytes: &[u8]) -> Result<Address> {
    Ok(derive_address(&KeyMaterial::from_bytes(bytes)?))
}
