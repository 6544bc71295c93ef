// src/storage/staleness_cache.rs
//! Staleness cache: the set of identifiers known to need ledger resolution.
//!
//! An identifier lands here when optimistic verification failed for it, typically because its
//! key was rotated on-chain. Marks are idempotent and never expire; un-marking is an explicit
//! operator action ([`MemoryStalenessCache::remove`]).

use dashmap::DashSet;

use crate::error::Result;
use crate::models::did::EthrDid;

/// Async cache capability injected into the optimistic verifier.
#[async_trait::async_trait]
pub trait StalenessCache: Send + Sync {
    async fn has(&self, did: &EthrDid) -> Result<bool>;
    async fn set(&self, did: &EthrDid) -> Result<()>;
}

/// Synchronous cache backends. Every implementation is usable as a [`StalenessCache`].
pub trait SyncStalenessCache: Send + Sync {
    fn contains(&self, did: &EthrDid) -> bool;
    fn insert(&self, did: &EthrDid);
}

#[async_trait::async_trait]
impl<T: SyncStalenessCache> StalenessCache for T {
    async fn has(&self, did: &EthrDid) -> Result<bool> {
        Ok(self.contains(did))
    }

    async fn set(&self, did: &EthrDid) -> Result<()> {
        self.insert(did);
        Ok(())
    }
}

/// Process-local cache backed by a concurrent set.
#[derive(Debug, Default)]
pub struct MemoryStalenessCache {
    marked: DashSet<EthrDid>,
}

impl MemoryStalenessCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manually un-marks an identifier. Returns whether it was marked.
    pub fn remove(&self, did: &EthrDid) -> bool {
        self.marked.remove(did).is_some()
    }

    pub fn len(&self) -> usize {
        self.marked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marked.is_empty()
    }
}

impl SyncStalenessCache for MemoryStalenessCache {
    fn contains(&self, did: &EthrDid) -> bool {
        self.marked.contains(did)
    }

    fn insert(&self, did: &EthrDid) {
        if self.marked.insert(did.clone()) {
            log::debug!("marked {} as stale", did);
        }
    }
}
