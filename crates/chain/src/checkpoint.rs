//! Checkpoint lifecycle.
//!
//! ```text
//!   ∅ ──propose──▶ Buffered ──ack──▶ Acked (appended to log, terminal)
//!                     │
//!                     └──no-ack (after timeout)──▶ ∅  (proposer rotates)
//! ```
//!
//! The buffer is a single slot. ACKed checkpoints go to an append-only log
//! keyed by a 1-based header index; the buffered checkpoint's header index
//! is therefore `ack_count + 1`.
//!
//! All liveness timing runs on block time. Message timestamps are checked
//! against it but never used as the clock.

use serde::{Deserialize, Serialize};
use tracing::info;

use bridge_common::{Address, Hash};

use crate::error::{ChainError, ChainResult};
use crate::keys::{checkpoint_key, BUFFERED_CHECKPOINT_KEY, CHECKPOINT_PREFIX, LAST_NO_ACK_KEY};
use crate::params::Params;
use crate::registry::ValidatorRegistry;
use crate::span::page_window;
use crate::store::{decode, get_record, get_u64, put_record, put_u64, ReadStore, WriteStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckpointStatus {
    Buffered,
    Acked,
    /// Cleared from the buffer by a no-ack. Never persisted.
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub proposer: Address,
    pub start_block: u64,
    pub end_block: u64,
    pub root_hash: Hash,
    /// Proposer-supplied time (unix seconds)
    pub timestamp: u64,
    /// Block time at which the checkpoint entered the buffer
    pub buffered_at: u64,
    pub status: CheckpointStatus,
    /// Block time of the ACK, once acknowledged
    pub ack_timestamp: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CheckpointLifecycle {
    registry: ValidatorRegistry,
}

impl CheckpointLifecycle {
    pub fn new(registry: ValidatorRegistry) -> Self {
        Self { registry }
    }

    // ════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ════════════════════════════════════════════════════════════════════════

    pub fn get_buffered<S: ReadStore + ?Sized>(&self, store: &S) -> ChainResult<Option<Checkpoint>> {
        get_record(store, BUFFERED_CHECKPOINT_KEY)
    }

    /// ACKed checkpoint by 1-based header index.
    pub fn get_checkpoint<S: ReadStore + ?Sized>(&self, store: &S, index: u64) -> ChainResult<Checkpoint> {
        get_record(store, &checkpoint_key(index))?.ok_or(ChainError::CheckpointNotFound(index))
    }

    pub fn get_last_acked<S: ReadStore + ?Sized>(&self, store: &S) -> ChainResult<Option<Checkpoint>> {
        match self.registry.get_ack_count(store)? {
            0 => Ok(None),
            n => Ok(Some(self.get_checkpoint(store, n)?)),
        }
    }

    pub fn get_checkpoint_list<S: ReadStore>(&self, store: &S, page: u64, limit: u64) -> ChainResult<Vec<Checkpoint>> {
        let (skip, take) = page_window(page, limit);
        store
            .prefix_iter(CHECKPOINT_PREFIX)
            .skip(skip)
            .take(take)
            .map(|r| decode(&r?.1))
            .collect()
    }

    pub fn get_ack_count<S: ReadStore + ?Sized>(&self, store: &S) -> ChainResult<u64> {
        self.registry.get_ack_count(store)
    }

    /// End block of the last ACKed checkpoint, if any.
    pub fn last_acked_end_block<S: ReadStore + ?Sized>(&self, store: &S) -> ChainResult<Option<u64>> {
        Ok(self.get_last_acked(store)?.map(|c| c.end_block))
    }

    pub fn get_last_no_ack<S: ReadStore + ?Sized>(&self, store: &S) -> ChainResult<u64> {
        Ok(get_u64(store, LAST_NO_ACK_KEY)?.unwrap_or(0))
    }

    /// Start block the next proposal must use.
    pub fn expected_start<S: ReadStore + ?Sized>(&self, store: &S, params: &Params) -> ChainResult<u64> {
        Ok(match self.last_acked_end_block(store)? {
            Some(end) => end
                .checked_add(1)
                .ok_or_else(|| ChainError::RangeMismatch("last acked checkpoint ends at u64::MAX".into()))?,
            None => params.genesis_checkpoint_start,
        })
    }

    fn check_timestamp(what: &str, timestamp: u64, block_time: u64) -> ChainResult<()> {
        if timestamp > block_time {
            return Err(ChainError::InvalidTimestamp(format!(
                "{} time {} is ahead of block time {}",
                what, timestamp, block_time
            )));
        }
        Ok(())
    }

    // ════════════════════════════════════════════════════════════════════════
    // TRANSITIONS
    // ════════════════════════════════════════════════════════════════════════

    /// Put a new checkpoint into the empty buffer.
    ///
    /// # Errors
    ///
    /// - `BufferOccupied` while another checkpoint is buffered
    /// - `InvalidProposer` unless `proposer` is the current designated proposer
    /// - `RangeMismatch` for a non-contiguous, empty or over-long range
    /// - `InvalidTimestamp` if `timestamp` is ahead of `block_time`
    #[allow(clippy::too_many_arguments)]
    pub fn propose<S: WriteStore + ?Sized>(
        &self,
        store: &mut S,
        params: &Params,
        proposer: Address,
        start_block: u64,
        end_block: u64,
        root_hash: Hash,
        timestamp: u64,
        block_time: u64,
    ) -> ChainResult<()> {
        Self::check_timestamp("proposal", timestamp, block_time)?;
        if let Some(buffered) = self.get_buffered(store)? {
            return Err(ChainError::BufferOccupied {
                start: buffered.start_block,
                end: buffered.end_block,
            });
        }

        let set = self.registry.get_validator_set(store)?;
        let expected = set.proposer().map(|v| v.address);
        if expected != Some(proposer) {
            return Err(ChainError::InvalidProposer {
                expected: expected.map(|a| a.to_hex()).unwrap_or_else(|| "none".into()),
                got: proposer.to_hex(),
            });
        }

        let expected_start = self.expected_start(store, params)?;
        if start_block != expected_start {
            return Err(ChainError::RangeMismatch(format!(
                "start block {} does not follow last acked checkpoint (expected {})",
                start_block, expected_start
            )));
        }
        if end_block <= start_block {
            return Err(ChainError::RangeMismatch(format!(
                "end block {} must be greater than start block {}",
                end_block, start_block
            )));
        }
        match (end_block - start_block).checked_add(1) {
            Some(length) if length <= params.max_checkpoint_length => {}
            _ => {
                return Err(ChainError::RangeMismatch(format!(
                    "checkpoint {}..={} exceeds maximum length {}",
                    start_block, end_block, params.max_checkpoint_length
                )))
            }
        }

        let checkpoint = Checkpoint {
            proposer,
            start_block,
            end_block,
            root_hash,
            timestamp,
            buffered_at: block_time,
            status: CheckpointStatus::Buffered,
            ack_timestamp: None,
        };
        put_record(store, BUFFERED_CHECKPOINT_KEY, &checkpoint)?;
        info!(proposer = %proposer, start_block, end_block, root = %root_hash, "checkpoint buffered");
        Ok(())
    }

    /// Move the buffered checkpoint into the ACK log.
    ///
    /// Also advances proposer priority by one round, so duty rotates on
    /// healthy progress as well as on no-acks.
    pub fn acknowledge<S: WriteStore + ?Sized>(
        &self,
        store: &mut S,
        header_index: u64,
        timestamp: u64,
        block_time: u64,
    ) -> ChainResult<Checkpoint> {
        Self::check_timestamp("ack", timestamp, block_time)?;
        let mut checkpoint = self
            .get_buffered(store)?
            .ok_or_else(|| ChainError::NoMatchingBuffer("buffer is empty".into()))?;
        let expected = self.registry.get_ack_count(store)? + 1;
        if header_index != expected {
            return Err(ChainError::NoMatchingBuffer(format!(
                "header index {} does not match buffered checkpoint {}",
                header_index, expected
            )));
        }

        checkpoint.status = CheckpointStatus::Acked;
        checkpoint.ack_timestamp = Some(block_time);
        put_record(store, &checkpoint_key(expected), &checkpoint)?;
        store.delete(BUFFERED_CHECKPOINT_KEY);
        self.registry.increment_ack_count(store)?;
        self.registry.increment_proposer_priority(store, 1)?;

        info!(
            header_index,
            start_block = checkpoint.start_block,
            end_block = checkpoint.end_block,
            "checkpoint acknowledged"
        );
        Ok(checkpoint)
    }

    /// Declare the buffered (or missing) checkpoint timed out.
    ///
    /// Elapsed time is `block_time` minus the block time at which the
    /// checkpoint was buffered, or minus the later of the last ACK and the
    /// last no-ack when the buffer is empty. `timestamp` may not be ahead
    /// of `block_time`.
    pub fn no_ack<S: WriteStore + ?Sized>(
        &self,
        store: &mut S,
        params: &Params,
        timestamp: u64,
        block_time: u64,
    ) -> ChainResult<Option<Checkpoint>> {
        Self::check_timestamp("no-ack", timestamp, block_time)?;

        let buffered = self.get_buffered(store)?;
        let since = match &buffered {
            Some(c) => c.buffered_at,
            None => {
                let last_ack = self
                    .get_last_acked(store)?
                    .map(|c| c.ack_timestamp.unwrap_or(c.buffered_at))
                    .unwrap_or(0);
                last_ack.max(self.get_last_no_ack(store)?)
            }
        };
        let elapsed = block_time.saturating_sub(since);
        if elapsed < params.checkpoint_buffer_time {
            return Err(ChainError::TimeoutNotElapsed {
                elapsed,
                required: params.checkpoint_buffer_time,
            });
        }

        put_u64(store, LAST_NO_ACK_KEY, block_time);
        store.delete(BUFFERED_CHECKPOINT_KEY);
        let proposer = self.registry.rotate_proposer(store)?;

        info!(elapsed, next_proposer = ?proposer, cleared = buffered.is_some(), "checkpoint no-ack accepted");
        Ok(buffered.map(|mut c| {
            c.status = CheckpointStatus::TimedOut;
            c
        }))
    }
}
