// src/services/mod.rs
pub mod credential_issuer;
pub mod history;
pub mod ownership;
pub mod proof;
pub mod resolver;
pub mod verifier;
