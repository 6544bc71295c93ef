// src/bls/keys.rs
//! BLS12-381 G2 key material used both as BBS issuer keys and as registry owner keys.
//!
//! Public keys live in G2 and are exchanged either compressed (96 bytes) or uncompressed
//! (192 bytes), both in the zcash encoding used by `ark-bls12-381`. Secret keys are scalars.

use ark_bls12_381::{Fr, G2Affine};
use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::{BigInteger, PrimeField, Zero};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_std::UniformRand;
use rand::{CryptoRng, Rng};

use crate::bls::signature::{registry_base_point, sign_digest};
use crate::error::{Error, Result};

pub const G2_COMPRESSED_LEN: usize = 96;
pub const G2_UNCOMPRESSED_LEN: usize = 192;
pub const SECRET_KEY_LEN: usize = 32;

/// A validated G2 public key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BbsPublicKey(G2Affine);

impl BbsPublicKey {
    /// Parses a compressed or uncompressed key.
    ///
    /// # Errors
    /// - `UnsupportedKeyLength` for any length other than 96 or 192
    /// - `UnknownKeyType` when the bytes are not a point of the G2 subgroup, or are the identity
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let point = match bytes.len() {
            G2_COMPRESSED_LEN => G2Affine::deserialize_compressed(bytes),
            G2_UNCOMPRESSED_LEN => G2Affine::deserialize_uncompressed(bytes),
            other => return Err(Error::UnsupportedKeyLength(other)),
        }
        .map_err(|e| Error::UnknownKeyType(format!("not a G2 point: {}", e).into()))?;

        if AffineRepr::is_zero(&point) {
            return Err(Error::UnknownKeyType("G2 identity is not a key".into()));
        }
        Ok(Self(point))
    }

    pub fn point(&self) -> G2Affine {
        self.0
    }

    /// 96-byte compressed encoding, the SDK's storage format.
    pub fn to_compressed(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(G2_COMPRESSED_LEN);
        // Writing into a Vec cannot fail.
        self.0
            .serialize_compressed(&mut bytes)
            .expect("G2 serialization into a Vec");
        bytes
    }

    /// 192-byte uncompressed encoding, the registry's wire format and the address preimage.
    pub fn to_uncompressed(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(G2_UNCOMPRESSED_LEN);
        self.0
            .serialize_uncompressed(&mut bytes)
            .expect("G2 serialization into a Vec");
        bytes
    }
}

/// Decompresses a 96-byte G2 key into its 192-byte form.
pub fn decompress(compressed: &[u8]) -> Result<Vec<u8>> {
    if compressed.len() != G2_COMPRESSED_LEN {
        return Err(Error::UnsupportedKeyLength(compressed.len()));
    }
    Ok(BbsPublicKey::from_bytes(compressed)?.to_uncompressed())
}

/// A BLS secret scalar together with its public key on the registry base point.
#[derive(Clone)]
pub struct BbsKeyPair {
    secret: Fr,
    public: BbsPublicKey,
}

impl BbsKeyPair {
    pub fn generate<R: Rng + CryptoRng>(rng: &mut R) -> Self {
        loop {
            let secret = Fr::rand(rng);
            if !secret.is_zero() {
                return Self::from_scalar(secret);
            }
        }
    }

    /// Builds a key pair from a 32-byte big-endian secret.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SECRET_KEY_LEN {
            return Err(Error::UnsupportedKeyLength(bytes.len()));
        }
        let secret = Fr::from_be_bytes_mod_order(bytes);
        if secret.is_zero() {
            return Err(Error::UnknownKeyType("zero secret key".into()));
        }
        Ok(Self::from_scalar(secret))
    }

    fn from_scalar(secret: Fr) -> Self {
        let public = BbsPublicKey((registry_base_point() * secret).into_affine());
        Self { secret, public }
    }

    pub fn public_key(&self) -> &BbsPublicKey {
        &self.public
    }

    pub fn secret_bytes(&self) -> Vec<u8> {
        self.secret.into_bigint().to_bytes_be()
    }

    /// Signs a 32-byte digest, returning the uncompressed G1 signature.
    pub fn sign(&self, digest: &[u8]) -> Result<Vec<u8>> {
        sign_digest(&self.secret, digest)
    }
}

impl std::fmt::Debug for BbsKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BbsKeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}
