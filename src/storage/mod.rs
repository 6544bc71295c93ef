// src/storage/mod.rs
pub mod staleness_cache;
