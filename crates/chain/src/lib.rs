//! # Bridge Chain Core Library
//!
//! Checkpoint bridge state machine: validator rotation, span producer
//! selection, the checkpoint buffer and the fee ledger commitment.
//!
//! ## Module Overview
//!
//! | Module | Function |
//! |--------|----------|
//! | `error` | `ChainError`, error classes |
//! | `store` | `ReadStore` / `WriteStore` / `CommitStore`, overlays, LMDB and in-memory backends |
//! | `keys` | Persisted keyspace |
//! | `params` | Module parameters |
//! | `validator` | `Validator`, `ValidatorSet`, proposer priority rotation |
//! | `registry` | Persisted validator set, join/exit/update, ACK counter |
//! | `selection` | Seeded stake-weighted producer draws |
//! | `span` | Span storage, rollover, base-chain seed fetch |
//! | `checkpoint` | Propose / ACK / no-ack lifecycle |
//! | `fee` | Dividend accounts and their Merkle commitment |
//! | `msg` | Messages applied per block |
//! | `app` | Block processor |
//! | `query` | Read-only snapshot queries |
//! | `rpc` | HTTP query routes |
//!
//! ## Block Flow
//!
//! ```text
//! consensus ──msgs──▶ BridgeApp::process_block
//!                        │  prefetch seed (base chain, async, retried)
//!                        │  per-message overlay: checkpoint / staking / fee
//!                        │  prune exited validators
//!                        │  freeze next span (or defer)
//!                        │  fee snapshot if a checkpoint was ACKed
//!                        ▼
//!                   CommitStore::commit (one atomic batch)
//! ```
//!
//! ## Checkpoint Buffer
//!
//! ```text
//! ∅ ──propose──▶ Buffered ──ack──▶ ACKed log (header index = ack_count)
//!                   │
//!                   └──no-ack after checkpoint_buffer_time──▶ ∅, proposer rotates
//! ```

pub mod error;
pub mod store;
pub mod keys;
pub mod params;
pub mod validator;
pub mod registry;
pub mod selection;
pub mod span;
pub mod checkpoint;
pub mod fee;
pub mod msg;
pub mod app;
pub mod query;
pub mod rpc;

pub use app::{BlockContext, BlockOutcome, BridgeApp, GenesisState, TxResult};
pub use checkpoint::{Checkpoint, CheckpointLifecycle, CheckpointStatus};
pub use error::{ChainError, ChainResult, ErrorClass};
pub use fee::{verify_inclusion, AccountProof, DividendAccount, FeeCommitment, FeeLedger};
pub use msg::Msg;
pub use params::Params;
pub use query::QueryService;
pub use registry::ValidatorRegistry;
pub use selection::ProducerSelector;
pub use span::{SeedFetcher, Span, SpanManager};
pub use store::{CacheStore, CommitStore, LmdbStore, MemStore, ReadStore, WriteStore};
pub use validator::{Validator, ValidatorSet};
