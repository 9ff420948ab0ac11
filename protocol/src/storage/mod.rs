//! # Storage Module
//!
//! Durable storage for the shop's chain: committed blocks, the append-only
//! event log (the audit trail every operation writes to) and the state
//! snapshot a restarted node resumes from.
//!
//! Bincode on disk, JSON only at the API boundary.

pub mod store;

pub use store::{ChainStore, StoreError, StoreResult};
