// src/utils/crypto.rs
//! Hashing and address helpers shared by key derivation and the registry message schemes.
//!
//! Uses Keccak-256 (Ethereum's standard hash function) for all operations.

use ethers::types::Address;
use ethers::utils::{keccak256, to_checksum};

/// Computes a Keccak-256 hash of the input data (Ethereum-compatible).
///
/// # Arguments
/// * `data` - Binary data to hash (as bytes slice)
///
/// # Returns
/// Fixed-size 32-byte array (`[u8; 32]`) containing the hash.
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    keccak256(data)
}

/// Hashes `data` and keeps the low 20 bytes, the ledger's address rule.
pub fn address_from_bytes(data: &[u8]) -> Address {
    let hash = hash_data(data);
    Address::from_slice(&hash[12..])
}

/// EIP-55 mixed-case rendering of an address.
pub fn checksummed(address: &Address) -> String {
    to_checksum(address, None)
}

/// Case-insensitive comparison of an address against its textual form.
pub fn address_matches(address: &Address, other: &str) -> bool {
    let hex = other
        .strip_prefix("0x")
        .or_else(|| other.strip_prefix("0X"))
        .unwrap_or(other);
    hex.eq_ignore_ascii_case(&format!("{:x}", address))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_checksum_is_eip55() {
        let address = Address::from_str("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap();
        assert_eq!(
            checksummed(&address),
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        );
    }

    #[test]
    fn test_address_matches_ignores_case() {
        let address = Address::from_str("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap();
        assert!(address_matches(
            &address,
            "0x5AAEB6053F3E94C9B9A09F33669435E7EF1BEAED"
        ));
        assert!(!address_matches(
            &address,
            "0x0000000000000000000000000000000000000000"
        ));
        assert!(address_matches(
            &address,
            "0X5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        ));
    }

    #[test]
    fn test_address_from_bytes_is_low_twenty_bytes() {
        let hash = hash_data(b"payload");
        assert_eq!(address_from_bytes(b"payload").as_bytes(), &hash[12..]);
    }
}
