//! # Lucky Protocol: Core Library
//!
//! The execution substrate the Lucky Shop runs on. The shop itself lives in
//! the `lucky-contracts` crate; this crate supplies what any contract on an
//! account-based chain takes for granted:
//!
//! - **config**: Default prices, token metadata, ports and limits.
//! - **crypto**: Ed25519 keys and BLAKE3 hashing.
//! - **identity**: 20-byte account and contract addresses.
//! - **bank**: The native currency ledger buyers pay with.
//! - **clock**: Commit-time timestamp sources.
//! - **storage**: sled persistence for blocks, events and state snapshots.
//!
//! ## Design Philosophy
//!
//! 1. Checked arithmetic on every balance. Wrapping and money do not mix.
//! 2. A failed operation leaves state exactly as it found it.
//! 3. If it touches money, it has tests.

pub mod bank;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod identity;
pub mod storage;

pub use bank::{Bank, BankError};
pub use clock::{Clock, ManualClock, SystemClock};
pub use identity::Address;
