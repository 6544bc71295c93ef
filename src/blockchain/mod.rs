// src/blockchain/mod.rs
pub mod ethers_client;
pub mod in_memory;
pub mod ledger;
