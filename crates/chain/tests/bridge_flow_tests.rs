//! End-to-end block processing over both store backends.

use bridge_chain::keys::dividend_account_key;
use bridge_chain::query::snapshot_query;
use bridge_chain::store::WriteBatch;
use bridge_chain::{
    verify_inclusion, BlockContext, BridgeApp, ChainError, CommitStore, GenesisState, LmdbStore, MemStore, Msg,
    Params, ProducerSelector, Validator,
};
use bridge_common::crypto::keccak256_concat;
use bridge_common::{Address, BaseChainConfig, BaseChainSource, Hash, MockBaseChain};

fn addr(b: u8) -> Address {
    Address::from_bytes([b; 20])
}

fn fast_config() -> BaseChainConfig {
    BaseChainConfig {
        timeout_ms: 200,
        retry_count: 2,
        retry_delay_ms: 1,
        ..BaseChainConfig::default()
    }
}

fn params() -> Params {
    Params {
        producer_count: 4,
        span_duration: 100,
        sprint_duration: 10,
        checkpoint_buffer_time: 100,
        genesis_checkpoint_start: 1,
        max_checkpoint_length: 1024,
    }
}

fn genesis(n: u8) -> GenesisState {
    GenesisState {
        params: params(),
        validators: (1..=n).map(|b| Validator::new(addr(b), vec![b], 1, 0, 0)).collect(),
        genesis_span_start: 0,
        spans: vec![],
    }
}

fn mem_app(validators: u8) -> BridgeApp<MemStore, MockBaseChain> {
    let chain = MockBaseChain::new();
    chain.insert_range(1, 50);
    let app = BridgeApp::new(MemStore::new(), chain, fast_config(), "15001");
    app.init_genesis(genesis(validators)).unwrap();
    app
}

fn block(height: u64, time: u64, execution_height: u64) -> BlockContext {
    BlockContext { height, time, execution_height }
}

fn proposer<S: CommitStore, B: BaseChainSource>(app: &BridgeApp<S, B>) -> Address {
    app.query().unwrap().validator_set().unwrap().proposer().unwrap().address
}

fn propose(proposer: Address, start: u64, end: u64, timestamp: u64) -> Msg {
    Msg::ProposeCheckpoint {
        proposer,
        start_block: start,
        end_block: end,
        root_hash: Hash::from_bytes([7; 32]),
        timestamp,
    }
}

fn error_kind(outcome: &bridge_chain::BlockOutcome, i: usize) -> Option<&str> {
    outcome.results[i].error.as_ref().map(|(k, _)| k.as_str())
}

#[test]
fn test_scenario_select_four_of_five() {
    let selector = ProducerSelector::new();
    let validators: Vec<Validator> = (1..=5).map(|b| Validator::new(addr(b), vec![b], 1, 0, 0)).collect();
    let seed = Hash::from_bytes([0x5a; 32]);

    let first = selector.select_producers(&seed, &validators, 4).unwrap();
    for _ in 0..5 {
        assert_eq!(selector.select_producers(&seed, &validators, 4).unwrap(), first);
    }
    assert_eq!(first.iter().map(|v| v.voting_power).sum::<i64>(), 4);
    assert!(first.len() <= 4);
    assert!(first.iter().all(|v| validators.iter().any(|o| o.address == v.address)));
}

#[tokio::test]
async fn test_scenario_checkpoint_propose_ack_propose() {
    let app = mem_app(3);
    let p = proposer(&app);

    let out = app
        .process_block(block(1, 1_000, 0), vec![propose(p, 1, 100, 1_000), propose(p, 1, 50, 1_000)])
        .await
        .unwrap();
    assert!(out.results[0].is_ok());
    assert_eq!(error_kind(&out, 1), Some("BufferOccupied"));

    let out = app
        .process_block(block(2, 1_010, 0), vec![Msg::AcknowledgeCheckpoint { header_index: 1, timestamp: 1_010 }])
        .await
        .unwrap();
    assert!(out.results[0].is_ok());
    assert!(out.fee_root.is_some());

    let q = app.query().unwrap();
    assert!(q.buffered_checkpoint().unwrap().is_none());
    assert_eq!(q.latest_checkpoint().unwrap().unwrap().end_block, 100);
    assert_eq!(q.ack_count().unwrap(), 1);
    drop(q);

    let p = proposer(&app);
    let out = app
        .process_block(block(3, 1_020, 0), vec![propose(p, 1, 100, 1_020), propose(p, 101, 200, 1_020)])
        .await
        .unwrap();
    assert_eq!(error_kind(&out, 0), Some("RangeMismatch"));
    assert!(out.results[1].is_ok());
}

#[tokio::test]
async fn test_ack_with_wrong_index_or_empty_buffer() {
    let app = mem_app(2);
    let out = app
        .process_block(block(1, 1_000, 0), vec![Msg::AcknowledgeCheckpoint { header_index: 1, timestamp: 1_000 }])
        .await
        .unwrap();
    assert_eq!(error_kind(&out, 0), Some("NoMatchingBuffer"));
    assert!(out.fee_root.is_none());

    let p = proposer(&app);
    let out = app
        .process_block(
            block(2, 1_000, 0),
            vec![propose(p, 1, 10, 1_000), Msg::AcknowledgeCheckpoint { header_index: 2, timestamp: 1_000 }],
        )
        .await
        .unwrap();
    assert_eq!(error_kind(&out, 1), Some("NoMatchingBuffer"));
    assert!(app.query().unwrap().buffered_checkpoint().unwrap().is_some());
}

#[tokio::test]
async fn test_no_ack_timeout_rotates_proposer() {
    let app = mem_app(3);
    let p0 = proposer(&app);
    app.process_block(block(1, 1_000, 0), vec![propose(p0, 1, 100, 1_000)]).await.unwrap();

    let out = app
        .process_block(block(2, 1_050, 0), vec![Msg::NoAckCheckpoint { timestamp: 1_050 }])
        .await
        .unwrap();
    assert_eq!(error_kind(&out, 0), Some("TimeoutNotElapsed"));

    let out = app
        .process_block(block(3, 1_090, 0), vec![Msg::NoAckCheckpoint { timestamp: 1_200 }])
        .await
        .unwrap();
    assert_eq!(error_kind(&out, 0), Some("InvalidTimestamp"));

    let out = app
        .process_block(block(4, 1_100, 0), vec![Msg::NoAckCheckpoint { timestamp: 1_100 }])
        .await
        .unwrap();
    assert!(out.results[0].is_ok());

    let p1 = proposer(&app);
    assert_ne!(p0, p1);
    assert!(app.query().unwrap().buffered_checkpoint().unwrap().is_none());

    // the same range is free again, but only for the new proposer
    let out = app
        .process_block(block(5, 1_110, 0), vec![propose(p0, 1, 100, 1_110), propose(p1, 1, 100, 1_110)])
        .await
        .unwrap();
    assert_eq!(error_kind(&out, 0), Some("InvalidProposer"));
    assert!(out.results[1].is_ok());
}

#[tokio::test]
async fn test_future_timestamp_cannot_pin_the_buffer() {
    let app = mem_app(3);
    let p0 = proposer(&app);

    let out = app
        .process_block(block(1, 1_000, 0), vec![propose(p0, 1, 100, u64::MAX), propose(p0, 1, 100, 0)])
        .await
        .unwrap();
    assert_eq!(error_kind(&out, 0), Some("InvalidTimestamp"));
    assert!(out.results[1].is_ok());
    assert_eq!(app.query().unwrap().buffered_checkpoint().unwrap().unwrap().buffered_at, 1_000);

    let out = app
        .process_block(block(2, 1_000_000_000, 0), vec![Msg::NoAckCheckpoint { timestamp: 1_000_000_000 }])
        .await
        .unwrap();
    assert!(out.results[0].is_ok());
    assert!(app.query().unwrap().buffered_checkpoint().unwrap().is_none());
    assert_ne!(proposer(&app), p0);
}

#[tokio::test]
async fn test_spans_contiguous_and_increasing() {
    let app = mem_app(6);
    let mut exec = 0;
    for h in 1..=8 {
        app.process_block(block(h, 1_000 + h, exec), vec![]).await.unwrap();
        exec += 60;
    }
    let spans = app.query().unwrap().spans(1, 20).unwrap();
    assert!(spans.len() >= 5);
    for pair in spans.windows(2) {
        assert_eq!(pair[1].id, pair[0].id + 1);
        assert_eq!(pair[1].start_block, pair[0].end_block + 1);
    }
    for span in &spans[1..] {
        let power: i64 = span.selected_producers.iter().map(|v| v.voting_power).sum();
        assert_eq!(power, 4);
        assert_eq!(span.validator_set.len(), 6);
    }
}

#[tokio::test]
async fn test_independent_nodes_agree() {
    let a = mem_app(6);
    let b = mem_app(6);
    for h in 1..=4 {
        a.process_block(block(h, 1_000, h * 100), vec![]).await.unwrap();
        b.process_block(block(h, 1_000, h * 100), vec![]).await.unwrap();
    }
    let sa = a.query().unwrap().spans(1, 20).unwrap();
    let sb = b.query().unwrap().spans(1, 20).unwrap();
    assert_eq!(sa, sb);
}

#[tokio::test]
async fn test_seed_retry_then_success() {
    let app = mem_app(3);
    app.base_chain().fail_next(1);
    let out = app.process_block(block(1, 1_000, 0), vec![]).await.unwrap();
    assert_eq!(out.span_frozen, Some(1));
    assert_eq!(app.base_chain().call_count(), 2);
}

#[tokio::test]
async fn test_missing_base_block_defers_without_retry() {
    let chain = MockBaseChain::new();
    let app = BridgeApp::new(MemStore::new(), chain, fast_config(), "15001");
    app.init_genesis(genesis(3)).unwrap();

    let out = app
        .process_block(
            block(1, 1_000, 0),
            vec![Msg::AddFee { account: addr(5), amount: "3".into(), sequence: None }],
        )
        .await
        .unwrap();
    assert!(out.span_deferred);
    assert!(out.results[0].is_ok());
    assert_eq!(app.base_chain().call_count(), 1);

    app.base_chain().insert_range(1, 1);
    let out = app.process_block(block(2, 1_000, 0), vec![]).await.unwrap();
    assert_eq!(out.span_frozen, Some(1));
}

#[tokio::test]
async fn test_scenario_fee_proof() {
    let app = mem_app(2);
    let account = addr(0xaa);
    let p = proposer(&app);
    app.process_block(
        block(1, 1_000, 0),
        vec![
            Msg::AddFee { account, amount: "100".into(), sequence: Some("0xdead:0".into()) },
            Msg::AddFee { account, amount: "50".into(), sequence: Some("0xdead:1".into()) },
            propose(p, 1, 10, 1_000),
        ],
    )
    .await
    .unwrap();

    let out = app
        .process_block(block(2, 1_000, 0), vec![Msg::AcknowledgeCheckpoint { header_index: 1, timestamp: 1_000 }])
        .await
        .unwrap();
    let root = out.fee_root.unwrap();

    let q = app.query().unwrap();
    assert_eq!(q.fee_root().unwrap(), root);
    let proof = q.account_proof(&account).unwrap();
    assert_eq!(proof.fee_amount, "150");
    assert_eq!(proof.leaf, keccak256_concat(&[&account.0[..], &b"150"[..]]));
    assert!(verify_inclusion(&proof.leaf, &proof.proof, proof.index, &root));
    assert!(matches!(q.account_proof(&addr(0xbb)), Err(ChainError::AccountNotFound(_))));
}

#[tokio::test]
async fn test_validator_join_exit_prune() {
    let app = mem_app(2);
    let out = app
        .process_block(
            block(1, 1_000, 0),
            vec![
                Msg::ValidatorJoin {
                    address: addr(9),
                    signer_pubkey: vec![9],
                    voting_power: 5,
                    start_epoch: 0,
                    end_epoch: 0,
                },
                Msg::ValidatorJoin {
                    address: addr(8),
                    signer_pubkey: vec![8],
                    voting_power: 0,
                    start_epoch: 0,
                    end_epoch: 0,
                },
                Msg::ValidatorUpdateSigner { address: addr(7), signer_pubkey: vec![1] },
            ],
        )
        .await
        .unwrap();
    assert!(out.results[0].is_ok());
    assert_eq!(error_kind(&out, 1), Some("InvalidVotingPower"));
    assert_eq!(error_kind(&out, 2), Some("ValidatorNotFound"));
    assert_eq!(out.results[0].route, "staking");
    assert_eq!(app.query().unwrap().validator_set().unwrap().len(), 3);

    app.process_block(block(2, 1_000, 0), vec![Msg::ValidatorExit { address: addr(9), end_epoch: 5 }])
        .await
        .unwrap();
    assert_eq!(app.query().unwrap().validator_set().unwrap().len(), 3);

    // the window is in execution heights; side-chain height alone does not end it
    app.process_block(block(5, 1_000, 4), vec![]).await.unwrap();
    assert_eq!(app.query().unwrap().validator_set().unwrap().len(), 3);
    app.process_block(block(6, 1_000, 5), vec![]).await.unwrap();
    let q = app.query().unwrap();
    assert_eq!(q.validator_set().unwrap().len(), 2);
    assert_eq!(q.validator(&addr(9)).unwrap().unwrap().end_epoch, 5);
}

#[tokio::test]
async fn test_fatal_error_aborts_block() {
    let app = mem_app(2);
    let mut corrupt = WriteBatch::new();
    corrupt.set(&dividend_account_key(&addr(5)), vec![0xff]);
    app.store().commit(corrupt).unwrap();

    let result = app
        .process_block(
            block(1, 1_000, 0),
            vec![
                Msg::AddFee { account: addr(7), amount: "10".into(), sequence: None },
                Msg::AddFee { account: addr(5), amount: "10".into(), sequence: None },
            ],
        )
        .await;
    let err = result.unwrap_err();
    assert!(err.is_fatal());

    // nothing from the aborted block was committed, the span rollover included
    let q = app.query().unwrap();
    assert_eq!(q.latest_span().unwrap().map(|s| s.id), Some(0));
    let snap = app.store().snapshot().unwrap();
    assert!(bridge_chain::FeeLedger::new().get_dividend_account(&snap, &addr(7)).unwrap().is_none());
}

#[tokio::test]
async fn test_lmdb_backend_matches_memory_and_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();

    let mem = mem_app(5);
    let lmdb_spans = {
        let chain = MockBaseChain::new();
        chain.insert_range(1, 50);
        let app = BridgeApp::new(LmdbStore::open(dir.path()).unwrap(), chain, fast_config(), "15001");
        app.init_genesis(genesis(5)).unwrap();

        for h in 1..=3 {
            let msgs = vec![Msg::AddFee { account: addr(1), amount: "7".into(), sequence: None }];
            app.process_block(block(h, 1_000, h * 100), msgs.clone()).await.unwrap();
            mem.process_block(block(h, 1_000, h * 100), msgs).await.unwrap();
        }
        let spans = app.query().unwrap().spans(1, 20).unwrap();
        spans
    };
    assert_eq!(lmdb_spans, mem.query().unwrap().spans(1, 20).unwrap());

    let reopened = LmdbStore::open(dir.path()).unwrap();
    let q = snapshot_query(&reopened).unwrap();
    assert_eq!(q.spans(1, 20).unwrap(), lmdb_spans);
    assert_eq!(q.validator_set().unwrap().len(), 5);
}
