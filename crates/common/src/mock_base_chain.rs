//! In-memory base chain for tests.
//!
//! `MockBaseChain` serves headers that tests insert explicitly, and can be
//! told to fail the next N requests or every request, with optional latency.
//! No network calls are made.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::base_chain::{BaseBlockHeader, BaseChainError, BaseChainSource};
use crate::crypto::keccak256;
use crate::types::Hash;

// ════════════════════════════════════════════════════════════════════════════
// MOCK BASE CHAIN
// ════════════════════════════════════════════════════════════════════════════

pub struct MockBaseChain {
    headers: RwLock<BTreeMap<u64, BaseBlockHeader>>,
    latency_ms: u64,
    /// Remaining requests that fail with `Unavailable`
    fail_next: AtomicU32,
    /// When set, every request fails with `Unavailable`
    always_fail: AtomicBool,
    /// Total requests served (including failed ones)
    calls: AtomicU64,
}

impl std::fmt::Debug for MockBaseChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBaseChain")
            .field("headers", &self.headers.read().len())
            .field("latency_ms", &self.latency_ms)
            .field("fail_next", &self.fail_next.load(Ordering::SeqCst))
            .field("always_fail", &self.always_fail.load(Ordering::SeqCst))
            .finish()
    }
}

impl Default for MockBaseChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBaseChain {
    pub fn new() -> Self {
        Self::with_latency(0)
    }

    /// Mock that sleeps `ms` milliseconds before answering each request.
    pub fn with_latency(ms: u64) -> Self {
        Self {
            headers: RwLock::new(BTreeMap::new()),
            latency_ms: ms,
            fail_next: AtomicU32::new(0),
            always_fail: AtomicBool::new(false),
            calls: AtomicU64::new(0),
        }
    }

    /// Insert a header with an explicit hash.
    pub fn insert_block(&self, number: u64, hash: Hash) {
        let header = BaseBlockHeader { number, hash, timestamp: number * 12 };
        self.headers.write().insert(number, header);
        debug!(number, hash = %hash, "MockBaseChain: inserted block");
    }

    /// Insert blocks `from..=to`, each hashed deterministically from its number.
    pub fn insert_range(&self, from: u64, to: u64) {
        for n in from..=to {
            self.insert_block(n, Self::synthetic_hash(n));
        }
    }

    /// Deterministic header hash used by `insert_range`.
    pub fn synthetic_hash(number: u64) -> Hash {
        keccak256(&number.to_be_bytes())
    }

    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn set_always_fail(&self, on: bool) {
        self.always_fail.store(on, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn should_fail(&self) -> bool {
        if self.always_fail.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl BaseChainSource for MockBaseChain {
    async fn get_block_by_number(&self, number: u64) -> Result<BaseBlockHeader, BaseChainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.latency_ms)).await;
        }

        if self.should_fail() {
            warn!(number, "MockBaseChain: simulated failure");
            return Err(BaseChainError::Unavailable);
        }

        self.headers
            .read()
            .get(&number)
            .copied()
            .ok_or(BaseChainError::NotFound(number))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inserted_block_is_served() {
        let mock = MockBaseChain::new();
        mock.insert_block(10, Hash::from_bytes([7u8; 32]));
        let h = mock.get_block_by_number(10).await.unwrap();
        assert_eq!(h.number, 10);
        assert_eq!(h.hash, Hash::from_bytes([7u8; 32]));
        assert_eq!(
            mock.get_block_by_number(11).await,
            Err(BaseChainError::NotFound(11))
        );
    }

    #[tokio::test]
    async fn test_fail_next_counts_down() {
        let mock = MockBaseChain::new();
        mock.insert_range(1, 3);
        mock.fail_next(2);
        assert_eq!(mock.get_block_by_number(1).await, Err(BaseChainError::Unavailable));
        assert_eq!(mock.get_block_by_number(1).await, Err(BaseChainError::Unavailable));
        assert!(mock.get_block_by_number(1).await.is_ok());
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_always_fail_toggle() {
        let mock = MockBaseChain::new();
        mock.insert_range(1, 1);
        mock.set_always_fail(true);
        assert!(mock.get_block_by_number(1).await.is_err());
        mock.set_always_fail(false);
        assert!(mock.get_block_by_number(1).await.is_ok());
    }
}
