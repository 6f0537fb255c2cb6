//! Keccak-256 helpers.
//!
//! Every consensus-visible digest in the bridge (producer draw seeds, fee
//! ledger leaves and interior nodes) is Keccak-256, the hash the base chain
//! uses natively.

use sha3::{Digest, Keccak256};
use crate::types::Hash;

/// Keccak-256 of a single byte slice.
pub fn keccak256(data: &[u8]) -> Hash {
    keccak256_concat(&[data])
}

/// Keccak-256 over the concatenation of `parts`, without allocating the
/// concatenated buffer.
pub fn keccak256_concat(parts: &[&[u8]]) -> Hash {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    let result = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&result);
    Hash(out)
}
