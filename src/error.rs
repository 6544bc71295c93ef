// src/error.rs
//! Error taxonomy shared by every layer of the crate.
//!
//! Parsing and configuration errors are returned synchronously and abort the call that raised
//! them. Signature and address check failures are *not* represented here when they happen inside
//! the verification pipeline; those surface as a structured
//! [`VerificationResult`](crate::models::credential::VerificationResult) instead.

use std::borrow::Cow;

use crate::models::ownership::HistoryViolation;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Malformed identifier: {0}")]
    MalformedIdentifier(Cow<'static, str>),
    #[error("Unsupported key length: {0} bytes")]
    UnsupportedKeyLength(usize),
    #[error("Unknown key type: {0}")]
    UnknownKeyType(Cow<'static, str>),
    #[error("Precondition failed: {0}")]
    PreconditionError(Cow<'static, str>),
    /// Only produced by lower level helpers; the verify entry points fold this into a
    /// `verified: false` result.
    #[error("Verification failed: {0}")]
    VerificationFailed(Cow<'static, str>),
    #[error("Ownership transfer rejected{}", .reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    OwnershipTransferRejected { reason: Option<String> },
    #[error("History integrity error at record {index}: {violation}")]
    HistoryIntegrityError {
        index: usize,
        violation: HistoryViolation,
    },
    #[error("Configuration error: {0}")]
    ConfigurationError(Cow<'static, str>),
    /// Transport or RPC failure reported by a ledger collaborator.
    #[error("Ledger error: {0}")]
    Ledger(String),
    /// A submitter saw the registry revert before a receipt was produced.
    #[error("Transaction reverted: {0}")]
    Reverted(String),
    /// The staleness cache backend failed.
    #[error("Staleness cache error: {0}")]
    Cache(String),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl From<config::ConfigError> for Error {
    fn from(error: config::ConfigError) -> Self {
        Self::ConfigurationError(error.to_string().into())
    }
}
