// src/lib.rs

//! # Ethr DID Verifier
//!
//! Resolution of `did:ethr` identifiers, optimistic credential verification and BLS-signed
//! registry ownership transfer.
//!
//! ## Architecture Overview
//! 1. **Models**: identifiers, DID documents, credentials and ownership records
//! 2. **Cryptography**: secp256k1 and BLS12-381 keys, registry digests
//! 3. **Blockchain Layer**: ledger collaborator traits, an RPC client and an in-memory registry
//! 4. **Services Layer**: resolution, tiered verification, issuance, transfers and history
//! 5. **Storage Layer**: staleness cache

pub mod blockchain;    // Registry clients and collaborator traits
pub mod bls;           // BLS12-381 keys and signatures
pub mod config;        // Network configuration
pub mod contracts;     // Registry ABI and owner change digests
pub mod error;         // Crate-wide error type
pub mod models;        // Data structures
pub mod services;      // Resolution, verification, ownership
pub mod storage;       // Staleness cache
pub mod utils;         // Helper functions
pub mod wallet;        // Key material and addresses

pub use error::{Error, Result};
pub use models::credential::{VerifiableCredential, VerificationResult};
pub use models::did::EthrDid;
pub use models::document::DidDocument;
pub use services::verifier::OptimisticVerifier;
