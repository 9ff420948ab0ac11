//! # Account Addresses
//!
//! An [`Address`] is 20 bytes, rendered as `0x`-prefixed lowercase hex.
//! Two kinds exist:
//!
//! - **Externally owned**: the first 20 bytes of `BLAKE3(public_key)`.
//!   Whoever can sign with that key acts as that address.
//! - **Contract**: the first 20 bytes of
//!   `BLAKE3("contract" || deployer || nonce_be)`. Deterministic, so a
//!   deployment replayed from genesis lands at the same address.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::ADDRESS_LENGTH;
use crate::crypto::{blake3_hash, blake3_hash_parts, ShopPublicKey};

/// Errors from parsing a textual address.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address is not valid hex: {0}")]
    InvalidHex(String),

    #[error("address must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// A 20-byte account identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    /// The all-zero address. Never derived from a key in practice.
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    pub const fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// Address controlled by the holder of `public_key`.
    pub fn from_public_key(public_key: &ShopPublicKey) -> Self {
        Self::truncate(blake3_hash(public_key.as_bytes()))
    }

    /// Address of the contract created by `deployer` at deployment `nonce`.
    pub fn contract(deployer: &Address, nonce: u64) -> Self {
        Self::truncate(blake3_hash_parts(&[
            b"contract",
            deployer.as_bytes(),
            &nonce.to_be_bytes(),
        ]))
    }

    /// Deterministic address from a free-form label. Used for fixtures and
    /// devnet accounts that never sign anything.
    pub fn from_label(label: &str) -> Self {
        Self::truncate(blake3_hash_parts(&[b"label", label.as_bytes()]))
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    fn truncate(digest: [u8; 32]) -> Self {
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes.copy_from_slice(&digest[..ADDRESS_LENGTH]);
        Self(bytes)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    /// Accepts hex with or without the `0x` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw).map_err(|_| AddressError::InvalidHex(s.to_string()))?;
        let arr: [u8; ADDRESS_LENGTH] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| AddressError::InvalidLength {
                    expected: ADDRESS_LENGTH,
                    actual: bytes.len(),
                })?;
        Ok(Self(arr))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
