//! Keyspace layout.
//!
//! Single-byte prefixes partition the store by module. Numeric suffixes are
//! big-endian so lexicographic key order equals numeric order.

use bridge_common::Address;

// params
pub const PARAMS_KEY: &[u8] = &[0x10];

// validator registry
pub const VALIDATOR_PREFIX: &[u8] = &[0x21];
pub const VALIDATOR_SET_KEY: &[u8] = &[0x22];
pub const ACK_COUNT_KEY: &[u8] = &[0x23];

// spans
pub const LAST_SPAN_ID_KEY: &[u8] = &[0x35];
pub const SPAN_PREFIX: &[u8] = &[0x36];
pub const LAST_BASE_BLOCK_KEY: &[u8] = &[0x38];

// checkpoints
pub const BUFFERED_CHECKPOINT_KEY: &[u8] = &[0x40];
pub const CHECKPOINT_PREFIX: &[u8] = &[0x41];
pub const LAST_NO_ACK_KEY: &[u8] = &[0x42];

// fee ledger
pub const DIVIDEND_ACCOUNT_PREFIX: &[u8] = &[0x50];
pub const FEE_COMMITMENT_KEY: &[u8] = &[0x51];
pub const TOPUP_SEQUENCE_PREFIX: &[u8] = &[0x52];

fn prefixed(prefix: &[u8], suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + suffix.len());
    key.extend_from_slice(prefix);
    key.extend_from_slice(suffix);
    key
}

pub fn validator_key(addr: &Address) -> Vec<u8> {
    prefixed(VALIDATOR_PREFIX, addr.as_bytes())
}

pub fn span_key(id: u64) -> Vec<u8> {
    prefixed(SPAN_PREFIX, &id.to_be_bytes())
}

pub fn checkpoint_key(index: u64) -> Vec<u8> {
    prefixed(CHECKPOINT_PREFIX, &index.to_be_bytes())
}

pub fn dividend_account_key(addr: &Address) -> Vec<u8> {
    prefixed(DIVIDEND_ACCOUNT_PREFIX, addr.as_bytes())
}

pub fn topup_sequence_key(sequence: &str) -> Vec<u8> {
    prefixed(TOPUP_SEQUENCE_PREFIX, sequence.as_bytes())
}
