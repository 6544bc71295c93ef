// src/bls/signature.rs
//! BLS signatures over 32-byte digests, matching the registry contract's verifier.
//!
//! - message point: `hash_to_G1(digest)` with a fixed domain separation tag
//! - signature: `sk · H(m)` in G1, uncompressed (96 bytes)
//! - public key: `sk · g2` where `g2` is the registry's hard-coded base point
//! - verification: `e(sig, -g2) · e(H(m), pk) == 1`

use ark_bls12_381::{g1, Bls12_381, Fq, Fq2, Fr, G1Affine, G1Projective, G2Affine};
use ark_ec::hashing::curve_maps::wb::WBMap;
use ark_ec::hashing::map_to_curve_hasher::MapToCurveBasedHasher;
use ark_ec::hashing::HashToCurve;
use ark_ec::pairing::Pairing;
use ark_ec::CurveGroup;
use ark_ff::field_hashers::DefaultFieldHasher;
use ark_ff::{PrimeField, Zero};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ethers::utils::hex;
use once_cell::sync::Lazy;
use sha2::Sha256;

use crate::error::{Error, Result};

/// Domain separation tag of the registry's hash-to-curve.
pub const HASH_TO_CURVE_DST: &[u8] = b"BLS_SIG_BLS12381G1_XMD:SHA-256_SSWU_RO_NUL_";

pub const G1_UNCOMPRESSED_LEN: usize = 96;

// Coordinates of the G2 generator deployed in the registry verifier, big-endian hex.
const G2_X_C0: &str = "024aa2b2f08f0a91260805272dc51051c6e47ad4fa403b02b4510b647ae3d1770bac0326a805bbefd48056c8c121bdb8";
const G2_X_C1: &str = "13e02b6052719f607dacd3a088274f65596bd0d09920b61ab5da61bbdc7f5049334cf11213945d57e5ac7d055d042b7e";
const G2_Y_C0: &str = "0ce5d527727d6e118cc9cdc6da2e351aadfd9baa8cbdd3a76d429a695160d12c923ac9cc3baca289e193548608b82801";
const G2_Y_C1: &str = "0606c4a02ea734cc32acd2b02bc28b99cb3e287e85a763af267492ab572e99ab3f370d275cec1da1aaa9075ff05f79be";

/// Registry base point, built once from the hard-coded coordinates.
///
/// # Panics
/// Only if the constants above are edited into something that is not a G2 point.
static REGISTRY_G2: Lazy<G2Affine> = Lazy::new(|| {
    let fq = |h: &str| Fq::from_be_bytes_mod_order(&hex::decode(h).expect("hex coordinate"));
    G2Affine::new(
        Fq2::new(fq(G2_X_C0), fq(G2_X_C1)),
        Fq2::new(fq(G2_Y_C0), fq(G2_Y_C1)),
    )
});

type G1Hasher = MapToCurveBasedHasher<G1Projective, DefaultFieldHasher<Sha256, 128>, WBMap<g1::Config>>;

pub fn registry_base_point() -> G2Affine {
    *REGISTRY_G2
}

/// Maps a digest to a G1 point.
pub fn hash_to_point(digest: &[u8]) -> Result<G1Affine> {
    let hasher = G1Hasher::new(HASH_TO_CURVE_DST)
        .map_err(|e| Error::VerificationFailed(format!("hash to curve setup: {}", e).into()))?;
    hasher
        .hash(digest)
        .map_err(|e| Error::VerificationFailed(format!("hash to curve: {}", e).into()))
}

pub(crate) fn sign_digest(secret: &Fr, digest: &[u8]) -> Result<Vec<u8>> {
    let point = (hash_to_point(digest)? * secret).into_affine();
    let mut bytes = Vec::with_capacity(G1_UNCOMPRESSED_LEN);
    point
        .serialize_uncompressed(&mut bytes)
        .map_err(|e| Error::VerificationFailed(format!("signature encoding: {}", e).into()))?;
    Ok(bytes)
}

/// Decodes an uncompressed G1 signature; any other length or an invalid point yields `None`.
pub fn decode_signature(signature: &[u8]) -> Option<G1Affine> {
    if signature.len() != G1_UNCOMPRESSED_LEN {
        return None;
    }
    G1Affine::deserialize_uncompressed(signature).ok()
}

/// Checks `e(sig, -g2) · e(H(digest), pk) == 1`.
pub fn verify(signature: &[u8], digest: &[u8], public_key: &G2Affine) -> bool {
    let Some(signature) = decode_signature(signature) else {
        return false;
    };
    let Ok(message) = hash_to_point(digest) else {
        return false;
    };
    let base = registry_base_point();
    Bls12_381::multi_pairing([signature, message], [-base, *public_key]).is_zero()
}
