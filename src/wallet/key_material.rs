// src/wallet/key_material.rs
//! Structural key-type detection.
//!
//! Public keys reaching a verifier come from untrusted proofs, so the verifier decides how to
//! read them from their shape alone: buffer length for raw bytes, named buffer fields for JSON.
//! A `type` or `kind` hint supplied alongside the key is never consulted.

use ethers::types::Address;
use serde_json::Value;

use crate::bls::keys::{BbsPublicKey, G2_COMPRESSED_LEN, G2_UNCOMPRESSED_LEN};
use crate::error::{Error, Result};
use crate::utils::serialization::from_hex;
use crate::wallet::address::derive_address;

pub const SECP256K1_COMPRESSED_LEN: usize = 33;
pub const SECP256K1_UNCOMPRESSED_LEN: usize = 65;

/// Fields that may carry the key buffer in a duck-typed JSON key, in lookup order.
const BUFFER_FIELDS: &[&str] = &["publicKeyBuffer", "publicKeyHex", "publicKeyBase64", "value"];

/// The closed set of key shapes this crate can derive addresses from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyMaterial {
    /// Recoverable ECDSA key, SEC1 encoded (33 or 65 bytes).
    Secp256k1(k256::PublicKey),
    /// BLS12-381 G2 key supplied in 96-byte compressed form.
    BbsCompressed(BbsPublicKey),
    /// BLS12-381 G2 key supplied in 192-byte uncompressed form.
    BbsUncompressed(BbsPublicKey),
}

impl KeyMaterial {
    /// Classifies a raw public-key buffer by its length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        match bytes.len() {
            SECP256K1_COMPRESSED_LEN | SECP256K1_UNCOMPRESSED_LEN => {
                k256::PublicKey::from_sec1_bytes(bytes)
                    .map(Self::Secp256k1)
                    .map_err(|_| Error::UnknownKeyType("not a secp256k1 point".into()))
            }
            G2_COMPRESSED_LEN => BbsPublicKey::from_bytes(bytes).map(Self::BbsCompressed),
            G2_UNCOMPRESSED_LEN => BbsPublicKey::from_bytes(bytes).map(Self::BbsUncompressed),
            other => Err(Error::UnsupportedKeyLength(other)),
        }
    }

    /// Classifies a duck-typed key: a hex string, a byte array, or an object carrying one of
    /// the known buffer fields.
    pub fn detect(value: &Value) -> Result<Self> {
        match value {
            Value::String(hex) => Self::from_bytes(&from_hex(hex)?),
            Value::Array(_) => Self::from_bytes(&byte_array(value)?),
            Value::Object(map) => {
                let (field, buffer) = BUFFER_FIELDS
                    .iter()
                    .find_map(|field| map.get(*field).map(|v| (*field, v)))
                    .ok_or_else(|| Error::UnknownKeyType("no public key buffer field".into()))?;
                let bytes = match (field, buffer) {
                    ("publicKeyBase64", Value::String(b64)) => base64::decode(b64)
                        .map_err(|e| Error::UnknownKeyType(format!("base64: {}", e).into()))?,
                    (_, Value::String(hex)) => from_hex(hex)?,
                    (_, Value::Array(_)) => byte_array(buffer)?,
                    _ => {
                        return Err(Error::UnknownKeyType(
                            format!("unsupported {} encoding", field).into(),
                        ))
                    }
                };
                Self::from_bytes(&bytes)
            }
            _ => Err(Error::UnknownKeyType("unrecognized key shape".into())),
        }
    }

    pub fn address(&self) -> Address {
        derive_address(self)
    }

    pub fn is_bbs(&self) -> bool {
        matches!(self, Self::BbsCompressed(_) | Self::BbsUncompressed(_))
    }

    pub fn as_bbs(&self) -> Option<&BbsPublicKey> {
        match self {
            Self::BbsCompressed(key) | Self::BbsUncompressed(key) => Some(key),
            Self::Secp256k1(_) => None,
        }
    }
}

impl From<BbsPublicKey> for KeyMaterial {
    fn from(key: BbsPublicKey) -> Self {
        Self::BbsCompressed(key)
    }
}

impl From<k256::PublicKey> for KeyMaterial {
    fn from(key: k256::PublicKey) -> Self {
        Self::Secp256k1(key)
    }
}

fn byte_array(value: &Value) -> Result<Vec<u8>> {
    value
        .as_array()
        .into_iter()
        .flatten()
        .map(|v| {
            v.as_u64()
                .and_then(|n| u8::try_from(n).ok())
                .ok_or_else(|| Error::UnknownKeyType("byte array holds a non-byte".into()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bls::keys::BbsKeyPair;
    use crate::utils::serialization::to_hex;
    use rand::rngs::OsRng;
    use serde_json::json;

    #[test]
    fn test_classifies_by_length() {
        let pair = BbsKeyPair::generate(&mut OsRng);
        let compressed = pair.public_key().to_compressed();
        let uncompressed = pair.public_key().to_uncompressed();
        assert!(matches!(
            KeyMaterial::from_bytes(&compressed).unwrap(),
            KeyMaterial::BbsCompressed(_)
        ));
        assert!(matches!(
            KeyMaterial::from_bytes(&uncompressed).unwrap(),
            KeyMaterial::BbsUncompressed(_)
        ));

        let secp = k256::SecretKey::random(&mut OsRng).public_key();
        let sec1 = k256::elliptic_curve::sec1::ToEncodedPoint::to_encoded_point(&secp, true);
        assert!(matches!(
            KeyMaterial::from_bytes(sec1.as_bytes()).unwrap(),
            KeyMaterial::Secp256k1(_)
        ));
    }

    #[test]
    fn test_detect_ignores_kind_hints() {
        let pair = BbsKeyPair::generate(&mut OsRng);
        let compressed = pair.public_key().to_compressed();
        let value = json!({
            "type": "EcdsaSecp256k1VerificationKey2019",
            "kind": "secp256k1",
            "publicKeyBuffer": compressed,
        });
        let detected = KeyMaterial::detect(&value).unwrap();
        assert!(detected.is_bbs());
        assert_eq!(detected.address(), KeyMaterial::from(*pair.public_key()).address());
    }

    #[test]
    fn test_detect_shapes() {
        let pair = BbsKeyPair::generate(&mut OsRng);
        let bytes = pair.public_key().to_uncompressed();
        let expected = KeyMaterial::from_bytes(&bytes).unwrap();
        for value in [
            json!(to_hex(&bytes)),
            json!(bytes.clone()),
            json!({"publicKeyHex": to_hex(&bytes)}),
            json!({"publicKeyBase64": base64::encode(&bytes)}),
        ] {
            assert_eq!(KeyMaterial::detect(&value).unwrap(), expected);
        }
        assert!(matches!(
            KeyMaterial::detect(&json!({"type": "Bls12381G2Key2020"})),
            Err(Error::UnknownKeyType(_))
        ));
        assert!(matches!(
            KeyMaterial::detect(&json!(42)),
            Err(Error::UnknownKeyType(_))
        ));
        assert!(matches!(
            KeyMaterial::detect(&json!([1, 2, 300])),
            Err(Error::UnknownKeyType(_))
        ));
    }

    #[test]
    fn test_invalid_secp_point_is_unknown_type() {
        assert!(matches!(
            KeyMaterial::from_bytes(&[0x05u8; 33]),
            Err(Error::UnknownKeyType(_))
        ));
    }
}
