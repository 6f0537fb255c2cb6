//! HTTP query surface.
//!
//! | Endpoint | Description |
//! |----------|-------------|
//! | `GET /spans/latest` | Last stored span |
//! | `GET /spans/:id` | Span by id |
//! | `GET /spans?page=&limit=` | Span listing (1-based pages) |
//! | `GET /checkpoints/buffer` | Checkpoint awaiting ACK |
//! | `GET /checkpoints/latest` | Last ACKed checkpoint |
//! | `GET /checkpoints/:index` | ACKed checkpoint by header index |
//! | `GET /checkpoints?page=&limit=` | ACKed checkpoint listing |
//! | `GET /validators` | Current validator set |
//! | `GET /producers?start=&end=` | Validators eligible for a block window |
//! | `GET /producers/:block` | Producer on duty at an execution block |
//! | `GET /fees/root` | Latest fee ledger root |
//! | `GET /fees/proof/:account` | Inclusion proof against that root |
//!
//! Every request reads its own snapshot of the committed state.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::error;

use bridge_common::Address;

use crate::error::{ChainError, ChainResult, ErrorClass};
use crate::query::snapshot_query;
use crate::span::MAX_PAGE_LIMIT;
use crate::store::CommitStore;

// ════════════════════════════════════════════════════════════════════════════
// REQUEST TYPES
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct PageReq {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 { 1 }
fn default_limit() -> u64 { MAX_PAGE_LIMIT }

#[derive(Debug, Clone, Deserialize)]
pub struct WindowReq {
    pub start: u64,
    pub end: u64,
}

// ════════════════════════════════════════════════════════════════════════════
// RESPONSE MAPPING
// ════════════════════════════════════════════════════════════════════════════

fn status_for(e: &ChainError) -> StatusCode {
    if e.is_not_found() {
        return StatusCode::NOT_FOUND;
    }
    match e.class() {
        ErrorClass::Validation => StatusCode::BAD_REQUEST,
        ErrorClass::Transient | ErrorClass::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn respond<T: Serialize>(result: ChainResult<T>) -> (StatusCode, Json<Value>) {
    match result {
        Ok(value) => match serde_json::to_value(&value) {
            Ok(v) => (StatusCode::OK, Json(v)),
            Err(e) => {
                error!(error = %e, "response serialization failed");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": e.to_string()})))
            }
        },
        Err(e) => {
            let status = status_for(&e);
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                error!(error = %e, "query failed");
            }
            (status, Json(json!({"error": e.to_string(), "kind": e.kind()})))
        }
    }
}

/// `Option` results: `None` becomes 404 with `what` in the message.
fn respond_opt<T: Serialize>(result: ChainResult<Option<T>>, what: &str) -> (StatusCode, Json<Value>) {
    match result {
        Ok(None) => (StatusCode::NOT_FOUND, Json(json!({"error": format!("no {}", what)}))),
        Ok(Some(v)) => respond(Ok(v)),
        Err(e) => respond::<T>(Err(e)),
    }
}

// ════════════════════════════════════════════════════════════════════════════
// HANDLERS
// ════════════════════════════════════════════════════════════════════════════

/// GET /spans/latest
pub async fn latest_span_handler<S: CommitStore>(State(store): State<Arc<S>>) -> (StatusCode, Json<Value>) {
    respond_opt(snapshot_query(&*store).and_then(|q| q.latest_span()), "span")
}

/// GET /spans/:id
pub async fn span_handler<S: CommitStore>(Path(id): Path<u64>, State(store): State<Arc<S>>) -> (StatusCode, Json<Value>) {
    respond(snapshot_query(&*store).and_then(|q| q.span(id)))
}

/// GET /spans
pub async fn span_list_handler<S: CommitStore>(
    Query(req): Query<PageReq>,
    State(store): State<Arc<S>>,
) -> (StatusCode, Json<Value>) {
    respond(snapshot_query(&*store).and_then(|q| q.spans(req.page, req.limit)))
}

/// GET /checkpoints/buffer
pub async fn buffered_checkpoint_handler<S: CommitStore>(State(store): State<Arc<S>>) -> (StatusCode, Json<Value>) {
    respond_opt(snapshot_query(&*store).and_then(|q| q.buffered_checkpoint()), "buffered checkpoint")
}

/// GET /checkpoints/latest
pub async fn latest_checkpoint_handler<S: CommitStore>(State(store): State<Arc<S>>) -> (StatusCode, Json<Value>) {
    respond_opt(snapshot_query(&*store).and_then(|q| q.latest_checkpoint()), "acknowledged checkpoint")
}

/// GET /checkpoints/:index
pub async fn checkpoint_handler<S: CommitStore>(
    Path(index): Path<u64>,
    State(store): State<Arc<S>>,
) -> (StatusCode, Json<Value>) {
    respond(snapshot_query(&*store).and_then(|q| q.checkpoint(index)))
}

/// GET /checkpoints
pub async fn checkpoint_list_handler<S: CommitStore>(
    Query(req): Query<PageReq>,
    State(store): State<Arc<S>>,
) -> (StatusCode, Json<Value>) {
    respond(snapshot_query(&*store).and_then(|q| q.checkpoints(req.page, req.limit)))
}

/// GET /validators
pub async fn validators_handler<S: CommitStore>(State(store): State<Arc<S>>) -> (StatusCode, Json<Value>) {
    respond(snapshot_query(&*store).and_then(|q| q.validator_set()))
}

/// GET /producers
pub async fn producers_handler<S: CommitStore>(
    Query(req): Query<WindowReq>,
    State(store): State<Arc<S>>,
) -> (StatusCode, Json<Value>) {
    if req.start > req.end {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("window start {} is after end {}", req.start, req.end)})),
        );
    }
    respond(snapshot_query(&*store).and_then(|q| q.eligible_producers(req.start, req.end)))
}

/// GET /producers/:block
pub async fn block_producer_handler<S: CommitStore>(
    Path(block): Path<u64>,
    State(store): State<Arc<S>>,
) -> (StatusCode, Json<Value>) {
    respond_opt(
        snapshot_query(&*store).and_then(|q| q.block_producer(block)),
        &format!("span covering block {}", block),
    )
}

/// GET /fees/root
pub async fn fee_root_handler<S: CommitStore>(State(store): State<Arc<S>>) -> (StatusCode, Json<Value>) {
    respond(snapshot_query(&*store).and_then(|q| q.fee_root()).map(|root| json!({ "root": root })))
}

/// GET /fees/proof/:account
pub async fn fee_proof_handler<S: CommitStore>(
    Path(account): Path<String>,
    State(store): State<Arc<S>>,
) -> (StatusCode, Json<Value>) {
    let account = match Address::from_hex(&account) {
        Ok(a) => a,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(json!({"error": format!("invalid account: {}", e)}))),
    };
    respond(snapshot_query(&*store).and_then(|q| q.account_proof(&account)))
}

/// Query router over a committed store.
pub fn router<S: CommitStore + 'static>(store: Arc<S>) -> Router {
    Router::new()
        .route("/spans", get(span_list_handler::<S>))
        .route("/spans/latest", get(latest_span_handler::<S>))
        .route("/spans/:id", get(span_handler::<S>))
        .route("/checkpoints", get(checkpoint_list_handler::<S>))
        .route("/checkpoints/buffer", get(buffered_checkpoint_handler::<S>))
        .route("/checkpoints/latest", get(latest_checkpoint_handler::<S>))
        .route("/checkpoints/:index", get(checkpoint_handler::<S>))
        .route("/validators", get(validators_handler::<S>))
        .route("/producers", get(producers_handler::<S>))
        .route("/producers/:block", get(block_producer_handler::<S>))
        .route("/fees/root", get(fee_root_handler::<S>))
        .route("/fees/proof/:account", get(fee_proof_handler::<S>))
        .with_state(store)
}
