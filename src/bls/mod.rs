// src/bls/mod.rs
//! Pairing-based primitives on BLS12-381.

pub mod keys;
pub mod signature;
