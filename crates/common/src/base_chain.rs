//! Base Chain Source Abstraction
//!
//! The bridge never talks to the base chain directly from state-transition
//! code. It goes through `BaseChainSource`, which only needs to answer one
//! question: "what is the header at height N?". The header hash at a
//! reserved height seeds producer selection for the next span.

use serde::Deserialize;
use thiserror::Error;

use crate::types::Hash;

// ════════════════════════════════════════════════════════════════════════════
// SUPPORTING TYPES
// ════════════════════════════════════════════════════════════════════════════

/// Minimal view of a base-chain block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseBlockHeader {
    /// Block number on the base chain
    pub number: u64,
    /// Keccak-256 block hash
    pub hash: Hash,
    /// Unix timestamp (seconds) from the header
    pub timestamp: u64,
}

/// Client-side policy for base-chain requests.
///
/// Read from the `[base_chain]` table of the node config, or from the
/// environment via [`BaseChainConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BaseChainConfig {
    /// Per-attempt timeout in milliseconds
    pub timeout_ms: u64,
    /// Number of retries after the first attempt
    pub retry_count: u8,
    /// Initial delay between retries in milliseconds (doubled each retry)
    pub retry_delay_ms: u64,
}

impl Default for BaseChainConfig {
    /// Defaults:
    /// - `timeout_ms`: 30000
    /// - `retry_count`: 3
    /// - `retry_delay_ms`: 1000
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            retry_count: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl BaseChainConfig {
    /// Build a config from environment variables.
    ///
    /// Variables read (all optional, defaults as in [`Default`]):
    /// - `BASE_CHAIN_TIMEOUT_MS`
    /// - `BASE_CHAIN_RETRY_COUNT`
    /// - `BASE_CHAIN_RETRY_DELAY_MS`
    ///
    /// # Errors
    ///
    /// `BaseChainError::Other` when a numeric value does not parse.
    pub fn from_env() -> Result<Self, BaseChainError> {
        let defaults = Self::default();
        let timeout_ms = env_or("BASE_CHAIN_TIMEOUT_MS", defaults.timeout_ms)?;
        let retry_count = env_or("BASE_CHAIN_RETRY_COUNT", defaults.retry_count)?;
        let retry_delay_ms = env_or("BASE_CHAIN_RETRY_DELAY_MS", defaults.retry_delay_ms)?;

        Ok(Self {
            timeout_ms,
            retry_count,
            retry_delay_ms,
        })
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, BaseChainError> {
    match std::env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|_| BaseChainError::Other(format!("{} invalid: '{}'", key, val))),
        Err(_) => Ok(default),
    }
}

/// Errors returned by a base-chain source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BaseChainError {
    /// The requested block does not exist (yet)
    #[error("block {0} not found on base chain")]
    NotFound(u64),
    /// The request did not complete in time
    #[error("base chain request timed out")]
    Timeout,
    /// Transport-level failure
    #[error("network error: {0}")]
    NetworkError(String),
    /// Endpoint unreachable
    #[error("base chain unavailable")]
    Unavailable,
    #[error("{0}")]
    Other(String),
}

impl BaseChainError {
    /// Transient errors are worth retrying; a missing block is not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BaseChainError::Timeout | BaseChainError::NetworkError(_) | BaseChainError::Unavailable
        )
    }
}

// ════════════════════════════════════════════════════════════════════════════
// BASE CHAIN TRAIT
// ════════════════════════════════════════════════════════════════════════════

/// Read access to base-chain headers.
///
/// Implementors must be `Send + Sync` so a single source can be shared
/// between the block processor and the query service. Implementations
/// should not retry internally; the caller owns the retry policy.
pub trait BaseChainSource: Send + Sync {
    /// Fetch the header at `number`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the block is not yet produced
    /// - `Timeout` / `NetworkError` / `Unavailable` for transport failures
    fn get_block_by_number(
        &self,
        number: u64,
    ) -> impl std::future::Future<Output = Result<BaseBlockHeader, BaseChainError>> + Send;
}
