//! Error taxonomy for the bridge state machine.
//!
//! Every failure is one of three classes. Validation errors reject the
//! single message that caused them. Transient errors defer work to a later
//! block. Fatal errors abort the whole block and leave committed state
//! untouched.

use thiserror::Error;

use crate::store::StoreError;

/// How the block processor reacts to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Reject the offending message; no state change.
    Validation,
    /// Retry on a later block.
    Transient,
    /// Abort the block.
    Fatal,
}

#[derive(Debug, Error)]
pub enum ChainError {
    // ════════════════════════════════════════════════════════════════════════
    // VALIDATION
    // ════════════════════════════════════════════════════════════════════════

    #[error("invalid proposer: expected {expected}, got {got}")]
    InvalidProposer { expected: String, got: String },

    #[error("checkpoint range mismatch: {0}")]
    RangeMismatch(String),

    #[error("checkpoint buffer occupied (buffered {start}..={end})")]
    BufferOccupied { start: u64, end: u64 },

    #[error("no matching buffered checkpoint: {0}")]
    NoMatchingBuffer(String),

    #[error("checkpoint buffer timeout not elapsed: {elapsed}s of {required}s")]
    TimeoutNotElapsed { elapsed: u64, required: u64 },

    #[error("negative fee amount: {0}")]
    NegativeAmount(String),

    #[error("invalid fee amount: {0}")]
    InvalidAmount(String),

    #[error("fee balance overflow for {0}")]
    AmountOverflow(String),

    #[error("insufficient fee balance for {account}: {balance} < {requested}")]
    InsufficientBalance { account: String, balance: String, requested: String },

    #[error("top-up sequence already processed: {0}")]
    DuplicateTopupSequence(String),

    #[error("account not found in latest fee commitment: {0}")]
    AccountNotFound(String),

    #[error("producer selection failed: {0}")]
    SelectionError(String),

    #[error("validator already exists: {0}")]
    ValidatorExists(String),

    #[error("validator not found: {0}")]
    ValidatorNotFound(String),

    #[error("invalid voting power: {0}")]
    InvalidVotingPower(i64),

    #[error("span not found: {0}")]
    SpanNotFound(u64),

    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(u64),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    // ════════════════════════════════════════════════════════════════════════
    // TRANSIENT
    // ════════════════════════════════════════════════════════════════════════

    #[error("span seed unavailable: {0}")]
    SeedUnavailable(String),

    // ════════════════════════════════════════════════════════════════════════
    // FATAL
    // ════════════════════════════════════════════════════════════════════════

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("codec error: {0}")]
    Codec(String),
}

impl From<bincode::Error> for ChainError {
    fn from(e: bincode::Error) -> Self {
        ChainError::Codec(e.to_string())
    }
}

impl ChainError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ChainError::SeedUnavailable(_) => ErrorClass::Transient,
            ChainError::Store(_) | ChainError::Codec(_) => ErrorClass::Fatal,
            _ => ErrorClass::Validation,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Fatal
    }

    /// Stable kind name reported in transaction results.
    pub fn kind(&self) -> &'static str {
        match self {
            ChainError::InvalidProposer { .. } => "InvalidProposer",
            ChainError::RangeMismatch(_) => "RangeMismatch",
            ChainError::BufferOccupied { .. } => "BufferOccupied",
            ChainError::NoMatchingBuffer(_) => "NoMatchingBuffer",
            ChainError::TimeoutNotElapsed { .. } => "TimeoutNotElapsed",
            ChainError::NegativeAmount(_) => "NegativeAmount",
            ChainError::InvalidAmount(_) => "InvalidAmount",
            ChainError::AmountOverflow(_) => "AmountOverflow",
            ChainError::InsufficientBalance { .. } => "InsufficientBalance",
            ChainError::DuplicateTopupSequence(_) => "DuplicateTopupSequence",
            ChainError::AccountNotFound(_) => "AccountNotFound",
            ChainError::SelectionError(_) => "SelectionError",
            ChainError::ValidatorExists(_) => "ValidatorExists",
            ChainError::ValidatorNotFound(_) => "ValidatorNotFound",
            ChainError::InvalidVotingPower(_) => "InvalidVotingPower",
            ChainError::SpanNotFound(_) => "SpanNotFound",
            ChainError::CheckpointNotFound(_) => "CheckpointNotFound",
            ChainError::InvalidTimestamp(_) => "InvalidTimestamp",
            ChainError::InvalidParams(_) => "InvalidParams",
            ChainError::SeedUnavailable(_) => "SeedUnavailable",
            ChainError::Store(_) => "Store",
            ChainError::Codec(_) => "Codec",
        }
    }

    /// True for lookups that found nothing (mapped to 404 by the query API).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ChainError::AccountNotFound(_)
                | ChainError::ValidatorNotFound(_)
                | ChainError::SpanNotFound(_)
                | ChainError::CheckpointNotFound(_)
        )
    }
}

pub type ChainResult<T> = Result<T, ChainError>;
