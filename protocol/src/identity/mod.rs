//! # Identity
//!
//! Every shop participant is an [`Address`]. Externally owned addresses are
//! derived from Ed25519 public keys; contract addresses from their deployer.

pub mod address;

pub use address::{Address, AddressError};
