//! Block processor.
//!
//! ```text
//!   committed ──snapshot──▶ block overlay ──▶ msg overlay (one per message)
//!                               ▲                 │ ok: apply batch
//!                               └─────────────────┘ err: drop
//!   block overlay ──prune / span freeze / fee snapshot──▶ commit (once)
//! ```
//!
//! The base-chain seed is fetched before the block overlay is opened.
//! Messages never touch the span pointers, so a seed fetched against the
//! committed state is still the right one after they run, and the state
//! transition itself stays synchronous.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use bridge_common::{BaseChainConfig, BaseChainSource, Hash};

use crate::checkpoint::CheckpointLifecycle;
use crate::error::{ChainError, ChainResult};
use crate::fee::{parse_fee_amount, FeeLedger};
use crate::msg::Msg;
use crate::params::{get_params, set_params, Params};
use crate::query::{snapshot_query, QueryService};
use crate::registry::ValidatorRegistry;
use crate::selection::ProducerSelector;
use crate::span::{SeedFetcher, Span, SpanManager};
use crate::store::{CacheStore, CommitStore, WriteStore};
use crate::validator::{Validator, ValidatorSet};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisState {
    pub params: Params,
    pub validators: Vec<Validator>,
    pub genesis_span_start: u64,
    /// Spans carried over from an exported chain. When present they are
    /// imported as-is and replace the generated span 0.
    #[serde(default)]
    pub spans: Vec<Span>,
}

/// Block metadata supplied by consensus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockContext {
    /// Side-chain height
    pub height: u64,
    /// Block time, unix seconds
    pub time: u64,
    /// Latest execution-chain height known to the side chain
    pub execution_height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxResult {
    pub route: &'static str,
    /// `(error kind, message)` when the message was rejected
    pub error: Option<(String, String)>,
}

impl TxResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockOutcome {
    pub height: u64,
    pub results: Vec<TxResult>,
    pub span_frozen: Option<u64>,
    pub span_deferred: bool,
    pub fee_root: Option<Hash>,
}

pub struct BridgeApp<S: CommitStore, B: BaseChainSource> {
    store: S,
    registry: ValidatorRegistry,
    spans: SpanManager,
    checkpoints: CheckpointLifecycle,
    ledger: FeeLedger,
    fetcher: SeedFetcher<B>,
    chain_id: String,
}

impl<S: CommitStore, B: BaseChainSource> BridgeApp<S, B> {
    pub fn new(store: S, source: B, base_chain: BaseChainConfig, chain_id: impl Into<String>) -> Self {
        let registry = ValidatorRegistry::new();
        Self {
            store,
            registry,
            spans: SpanManager::new(registry, ProducerSelector::new()),
            checkpoints: CheckpointLifecycle::new(registry),
            ledger: FeeLedger::new(),
            fetcher: SeedFetcher::new(source, base_chain),
            chain_id: chain_id.into(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn base_chain(&self) -> &B {
        self.fetcher.source()
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// Queries against the last committed block.
    pub fn query(&self) -> ChainResult<QueryService<S::Snapshot<'_>>> {
        snapshot_query(&self.store)
    }

    /// Write params, the initial validator set and span 0 (or the imported
    /// spans) in one commit. Returns the last span.
    pub fn init_genesis(&self, genesis: GenesisState) -> ChainResult<Span> {
        genesis.params.validate()?;
        let set = ValidatorSet::new(genesis.validators)?;

        let snapshot = self.store.snapshot()?;
        if self.spans.get_last_span(&snapshot)?.is_some() {
            return Err(ChainError::InvalidParams("genesis already applied".into()));
        }
        let mut block = CacheStore::new(&snapshot);
        set_params(&mut block, &genesis.params)?;
        self.registry.set_validator_set(&mut block, &set)?;
        let span = if genesis.spans.is_empty() {
            self.spans
                .add_genesis_span(&mut block, &genesis.params, &self.chain_id, genesis.genesis_span_start)?
        } else {
            self.spans.import_spans(&mut block, &genesis.spans)?;
            self.spans
                .get_last_span(&block)?
                .ok_or_else(|| ChainError::InvalidParams("imported spans are missing".into()))?
        };

        let batch = block.into_batch();
        drop(snapshot);
        self.store.commit(batch)?;
        info!(
            chain_id = %self.chain_id,
            validators = set.len(),
            total_power = set.total_voting_power(),
            "genesis committed"
        );
        Ok(span)
    }

    /// Apply one block of messages and commit it.
    ///
    /// A rejected message leaves no trace and is reported in its
    /// [`TxResult`]. A fatal error aborts the block with nothing committed.
    pub async fn process_block(&self, ctx: BlockContext, msgs: Vec<Msg>) -> ChainResult<BlockOutcome> {
        let seed = self.prefetch_seed(&ctx).await?;

        let snapshot = self.store.snapshot()?;
        let mut block = CacheStore::new(&snapshot);
        let params = get_params(&block)?;

        let mut results = Vec::with_capacity(msgs.len());
        let mut acked = false;
        for msg in &msgs {
            let route = msg.route();
            let mut tx = CacheStore::new(&block);
            match self.apply_msg(&mut tx, &params, &ctx, msg) {
                Ok(()) => {
                    let batch = tx.into_batch();
                    block.apply(batch);
                    acked |= matches!(msg, Msg::AcknowledgeCheckpoint { .. });
                    debug!(height = ctx.height, msg = msg.name(), "message applied");
                    results.push(TxResult { route, error: None });
                }
                Err(e) if e.is_fatal() => {
                    error!(height = ctx.height, msg = msg.name(), error = %e, "fatal error, block aborted");
                    return Err(e);
                }
                Err(e) => {
                    debug!(height = ctx.height, msg = msg.name(), kind = e.kind(), error = %e, "message rejected");
                    results.push(TxResult {
                        route,
                        error: Some((e.kind().to_string(), e.to_string())),
                    });
                }
            }
        }

        self.registry.prune_inactive(&mut block, ctx.execution_height)?;

        let mut span_frozen = None;
        let mut span_deferred = false;
        if self.spans.needs_next_span(&block, ctx.execution_height)? {
            if let Some((id, start, end)) = self.spans.next_span_bounds(&block, &params)? {
                let frozen = match seed {
                    Some(seed) => seed.and_then(|seed| {
                        self.spans
                            .freeze_span_with_seed(&mut block, &params, id, start, end, &self.chain_id, &seed)
                    }),
                    None => Err(ChainError::SeedUnavailable("seed was not fetched for this block".into())),
                };
                match frozen {
                    Ok(span) => span_frozen = Some(span.id),
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!(height = ctx.height, span_id = id, error = %e, "span rollover deferred");
                        span_deferred = true;
                    }
                }
            }
        }

        let fee_root = if acked {
            Some(self.ledger.commit_snapshot(&mut block, ctx.height)?)
        } else {
            None
        };

        let batch = block.into_batch();
        let writes = batch.len();
        drop(snapshot);
        self.store.commit(batch)?;

        let failed = results.iter().filter(|r| !r.is_ok()).count();
        info!(
            height = ctx.height,
            msgs = results.len(),
            failed,
            writes,
            span_frozen = ?span_frozen,
            span_deferred,
            "block committed"
        );
        Ok(BlockOutcome {
            height: ctx.height,
            results,
            span_frozen,
            span_deferred,
            fee_root,
        })
    }

    /// `None` when no rollover is due; `Some(Err(SeedUnavailable))` when
    /// the base chain could not deliver. Only store failures propagate.
    async fn prefetch_seed(&self, ctx: &BlockContext) -> ChainResult<Option<ChainResult<Hash>>> {
        let number = {
            let snapshot = self.store.snapshot()?;
            let due = self.spans.needs_next_span(&snapshot, ctx.execution_height)?
                && self.spans.get_last_span(&snapshot)?.is_some();
            if !due {
                return Ok(None);
            }
            self.spans.next_seed_block(&snapshot)?
        };
        Ok(Some(self.fetcher.fetch_block_hash(number).await))
    }

    fn apply_msg<W: WriteStore + ?Sized>(&self, store: &mut W, params: &Params, ctx: &BlockContext, msg: &Msg) -> ChainResult<()> {
        match msg {
            Msg::ProposeCheckpoint {
                proposer,
                start_block,
                end_block,
                root_hash,
                timestamp,
            } => self.checkpoints.propose(
                store,
                params,
                *proposer,
                *start_block,
                *end_block,
                *root_hash,
                *timestamp,
                ctx.time,
            ),
            Msg::AcknowledgeCheckpoint { header_index, timestamp } => self
                .checkpoints
                .acknowledge(store, *header_index, *timestamp, ctx.time)
                .map(|_| ()),
            Msg::NoAckCheckpoint { timestamp } => self.checkpoints.no_ack(store, params, *timestamp, ctx.time).map(|_| ()),
            Msg::ValidatorJoin {
                address,
                signer_pubkey,
                voting_power,
                start_epoch,
                end_epoch,
            } => self.registry.add_validator(
                store,
                Validator::new(*address, signer_pubkey.clone(), *voting_power, *start_epoch, *end_epoch),
            ),
            Msg::ValidatorExit { address, end_epoch } => self.registry.exit_validator(store, address, *end_epoch),
            Msg::ValidatorUpdateSigner { address, signer_pubkey } => {
                self.registry.update_signer(store, address, signer_pubkey.clone())
            }
            Msg::AddFee { account, amount, sequence } => {
                let amount = parse_fee_amount(amount)?;
                self.ledger
                    .add_fee(store, *account, amount, sequence.as_deref())
                    .map(|_| ())
            }
            Msg::WithdrawFee { account, amount } => {
                let amount = parse_fee_amount(amount)?;
                self.ledger.withdraw_fee(store, *account, amount).map(|_| ())
            }
        }
    }
}
