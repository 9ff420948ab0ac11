//! # Hashing Utilities
//!
//! BLAKE3 is the only hash function the shop uses: transaction hashes,
//! address derivation and contract-address derivation all go through here.

/// Compute the BLAKE3 digest of `data`.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// BLAKE3 over the concatenation of several byte slices, without
/// allocating the concatenation.
pub fn blake3_hash_parts(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// Hex-encoded BLAKE3 digest.
pub fn blake3_hex(data: &[u8]) -> String {
    hex::encode(blake3_hash(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts_match_concatenation() {
        let whole = blake3_hash(b"lucky-number");
        let parts = blake3_hash_parts(&[b"lucky", b"-", b"number"]);
        assert_eq!(whole, parts);
    }

    #[test]
    fn hex_is_64_chars() {
        assert_eq!(blake3_hex(b"shop").len(), 64);
    }
}
