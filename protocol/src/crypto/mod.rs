//! # Cryptographic Primitives
//!
//! Thin, type-safe wrappers around audited implementations: Ed25519 for
//! transaction signatures, BLAKE3 for every digest. Nothing here is
//! hand-rolled.

pub mod hash;
pub mod keys;

pub use hash::{blake3_hash, blake3_hash_parts, blake3_hex};
pub use keys::{KeyError, ShopKeypair, ShopPublicKey, ShopSignature};
