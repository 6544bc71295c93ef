// src/wallet/mod.rs
pub mod address;
pub mod key_management;
pub mod key_material;
