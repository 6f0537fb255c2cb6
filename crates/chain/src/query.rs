//! Read-only query facade over one committed snapshot.

use bridge_common::{Address, Hash};

use crate::checkpoint::{Checkpoint, CheckpointLifecycle};
use crate::error::ChainResult;
use crate::fee::{AccountProof, FeeLedger};
use crate::params::{get_params, Params};
use crate::registry::ValidatorRegistry;
use crate::selection::ProducerSelector;
use crate::span::{Span, SpanManager};
use crate::store::{CommitStore, ReadStore};
use crate::validator::{Validator, ValidatorSet};

/// Queries against the last committed version of `store`.
pub fn snapshot_query<S: CommitStore>(store: &S) -> ChainResult<QueryService<S::Snapshot<'_>>> {
    Ok(QueryService::new(store.snapshot()?))
}

/// Every call reads the same snapshot, so a multi-call response is
/// consistent even while blocks are being committed.
pub struct QueryService<R: ReadStore> {
    store: R,
    registry: ValidatorRegistry,
    spans: SpanManager,
    checkpoints: CheckpointLifecycle,
    ledger: FeeLedger,
}

impl<R: ReadStore> QueryService<R> {
    pub fn new(store: R) -> Self {
        let registry = ValidatorRegistry::new();
        Self {
            store,
            registry,
            spans: SpanManager::new(registry, ProducerSelector::new()),
            checkpoints: CheckpointLifecycle::new(registry),
            ledger: FeeLedger::new(),
        }
    }

    pub fn span(&self, id: u64) -> ChainResult<Span> {
        self.spans.get_span(&self.store, id)
    }

    pub fn latest_span(&self) -> ChainResult<Option<Span>> {
        self.spans.get_last_span(&self.store)
    }

    pub fn spans(&self, page: u64, limit: u64) -> ChainResult<Vec<Span>> {
        self.spans.get_span_list(&self.store, page, limit)
    }

    /// ACKed checkpoint by header index.
    pub fn checkpoint(&self, index: u64) -> ChainResult<Checkpoint> {
        self.checkpoints.get_checkpoint(&self.store, index)
    }

    pub fn latest_checkpoint(&self) -> ChainResult<Option<Checkpoint>> {
        self.checkpoints.get_last_acked(&self.store)
    }

    pub fn buffered_checkpoint(&self) -> ChainResult<Option<Checkpoint>> {
        self.checkpoints.get_buffered(&self.store)
    }

    pub fn checkpoints(&self, page: u64, limit: u64) -> ChainResult<Vec<Checkpoint>> {
        self.checkpoints.get_checkpoint_list(&self.store, page, limit)
    }

    pub fn ack_count(&self) -> ChainResult<u64> {
        self.checkpoints.get_ack_count(&self.store)
    }

    pub fn validator_set(&self) -> ChainResult<ValidatorSet> {
        self.registry.get_validator_set(&self.store)
    }

    pub fn validator(&self, address: &Address) -> ChainResult<Option<Validator>> {
        self.registry.get_by_id(&self.store, address)
    }

    pub fn eligible_producers(&self, start: u64, end: u64) -> ChainResult<Vec<Validator>> {
        self.registry.get_eligible(&self.store, start, end)
    }

    /// Producer on duty at an execution block, from the span covering it.
    pub fn block_producer(&self, block: u64) -> ChainResult<Option<Validator>> {
        let params = get_params(&self.store)?;
        self.spans.block_producer(&self.store, &params, block)
    }

    pub fn params(&self) -> ChainResult<Params> {
        get_params(&self.store)
    }

    pub fn fee_root(&self) -> ChainResult<Hash> {
        self.ledger.fee_root(&self.store)
    }

    pub fn account_proof(&self, account: &Address) -> ChainResult<AccountProof> {
        self.ledger.prove_inclusion(&self.store, account)
    }
}
