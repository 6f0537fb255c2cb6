//! Span Manager
//!
//! A span assigns producer duty on the execution chain for a contiguous
//! block range. Spans are immutable once stored: each one carries a copy of
//! the validator set at freeze time next to the selected producers.
//!
//! The seed for span `n+1` is the hash of base-chain block
//! `last_base_block + 1`. Fetching it is the only I/O in the state machine;
//! [`SeedFetcher`] bounds it with a per-attempt timeout and retries, and
//! reports exhaustion as the transient `SeedUnavailable`.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use bridge_common::{BaseChainConfig, BaseChainError, BaseChainSource, Hash};

use crate::error::{ChainError, ChainResult};
use crate::keys::{span_key, LAST_BASE_BLOCK_KEY, LAST_SPAN_ID_KEY, SPAN_PREFIX};
use crate::params::Params;
use crate::registry::ValidatorRegistry;
use crate::selection::ProducerSelector;
use crate::store::{decode, get_record, get_u64, put_record, put_u64, ReadStore, WriteStore};
use crate::validator::{Validator, ValidatorSet};

/// Maximum page size for span and checkpoint listings.
pub const MAX_PAGE_LIMIT: u64 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub id: u64,
    pub start_block: u64,
    pub end_block: u64,
    pub chain_id: String,
    pub validator_set: ValidatorSet,
    pub selected_producers: Vec<Validator>,
}

impl Span {
    pub fn contains(&self, block: u64) -> bool {
        self.start_block <= block && block <= self.end_block
    }

    /// Producer on duty at `block`.
    ///
    /// The span is cut into sprints of `sprint_duration` blocks. Sprints
    /// cycle through the selected producers in address order, each holding
    /// as many consecutive sprints as its span voting power.
    pub fn producer_for_block(&self, block: u64, sprint_duration: u64) -> Option<&Validator> {
        if !self.contains(block) || sprint_duration == 0 {
            return None;
        }
        let slots: u64 = self
            .selected_producers
            .iter()
            .map(|v| u64::try_from(v.voting_power).unwrap_or(0))
            .sum();
        if slots == 0 {
            return None;
        }
        let mut slot = ((block - self.start_block) / sprint_duration) % slots;
        for v in &self.selected_producers {
            let power = u64::try_from(v.voting_power).unwrap_or(0);
            if slot < power {
                return Some(v);
            }
            slot -= power;
        }
        None
    }
}

/// Skip/take for 1-based pages with the limit capped at [`MAX_PAGE_LIMIT`].
pub(crate) fn page_window(page: u64, limit: u64) -> (usize, usize) {
    let limit = limit.min(MAX_PAGE_LIMIT);
    let page = page.max(1);
    let skip = (page - 1).saturating_mul(limit);
    (usize::try_from(skip).unwrap_or(usize::MAX), limit as usize)
}

// ════════════════════════════════════════════════════════════════════════════
// SEED FETCHER
// ════════════════════════════════════════════════════════════════════════════

/// Base-chain header fetch with timeout, retry and exponential backoff.
pub struct SeedFetcher<B> {
    source: B,
    config: BaseChainConfig,
}

impl<B: BaseChainSource> SeedFetcher<B> {
    pub fn new(source: B, config: BaseChainConfig) -> Self {
        Self { source, config }
    }

    pub fn source(&self) -> &B {
        &self.source
    }

    /// Hash of base-chain block `number`.
    ///
    /// `NotFound` is returned immediately (the block does not exist yet);
    /// transport errors are retried up to `retry_count` times. Every
    /// failure surfaces as `SeedUnavailable`.
    pub async fn fetch_block_hash(&self, number: u64) -> ChainResult<Hash> {
        let timeout = Duration::from_millis(self.config.timeout_ms);
        let mut last_error = BaseChainError::Unavailable;
        let mut retry_delay = self.config.retry_delay_ms;

        for attempt in 0..=self.config.retry_count {
            if attempt > 0 {
                warn!(attempt, retry_count = self.config.retry_count, number, "retrying base chain fetch");
                tokio::time::sleep(Duration::from_millis(retry_delay)).await;
                retry_delay = retry_delay.saturating_mul(2);
            }

            let result = match tokio::time::timeout(timeout, self.source.get_block_by_number(number)).await {
                Ok(r) => r,
                Err(_) => Err(BaseChainError::Timeout),
            };

            match result {
                Ok(header) => {
                    debug!(number, hash = %header.hash, "base chain block fetched");
                    return Ok(header.hash);
                }
                Err(e) if !e.is_retryable() => {
                    debug!(number, error = %e, "non-retryable base chain error");
                    return Err(ChainError::SeedUnavailable(e.to_string()));
                }
                Err(e) => {
                    warn!(attempt, number, error = %e, "retryable base chain error");
                    last_error = e;
                }
            }
        }

        error!(number, error = %last_error, "base chain fetch retries exhausted");
        Err(ChainError::SeedUnavailable(last_error.to_string()))
    }
}

// ════════════════════════════════════════════════════════════════════════════
// SPAN MANAGER
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default)]
pub struct SpanManager {
    registry: ValidatorRegistry,
    selector: ProducerSelector,
}

impl SpanManager {
    pub fn new(registry: ValidatorRegistry, selector: ProducerSelector) -> Self {
        Self { registry, selector }
    }

    /// Store `span` and make it the last span.
    pub fn add_new_span<S: WriteStore + ?Sized>(&self, store: &mut S, span: &Span) -> ChainResult<()> {
        put_record(store, &span_key(span.id), span)?;
        put_u64(store, LAST_SPAN_ID_KEY, span.id);
        Ok(())
    }

    /// Store `span` without moving the last-span pointer.
    pub fn add_raw_span<S: WriteStore + ?Sized>(&self, store: &mut S, span: &Span) -> ChainResult<()> {
        put_record(store, &span_key(span.id), span)
    }

    /// Import spans with their ids unchanged, then point the last-span
    /// pointer at the highest one. Ids must be consecutive and ranges
    /// contiguous.
    pub fn import_spans<S: WriteStore + ?Sized>(&self, store: &mut S, spans: &[Span]) -> ChainResult<Option<u64>> {
        let mut sorted: Vec<&Span> = spans.iter().collect();
        sorted.sort_by_key(|s| s.id);
        for pair in sorted.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            if Some(next.id) != prev.id.checked_add(1) || Some(next.start_block) != prev.end_block.checked_add(1) {
                return Err(ChainError::InvalidParams(format!(
                    "span {} does not follow span {}",
                    next.id, prev.id
                )));
            }
        }
        for span in &sorted {
            if span.end_block < span.start_block {
                return Err(ChainError::InvalidParams(format!("span {} has an empty range", span.id)));
            }
            self.add_raw_span(store, span)?;
        }
        let last = sorted.last().map(|s| s.id);
        if let Some(id) = last {
            put_u64(store, LAST_SPAN_ID_KEY, id);
            info!(spans = sorted.len(), last_span = id, "spans imported");
        }
        Ok(last)
    }

    pub fn get_span<S: ReadStore + ?Sized>(&self, store: &S, id: u64) -> ChainResult<Span> {
        get_record(store, &span_key(id))?.ok_or(ChainError::SpanNotFound(id))
    }

    pub fn has_span<S: ReadStore + ?Sized>(&self, store: &S, id: u64) -> ChainResult<bool> {
        Ok(store.has(&span_key(id))?)
    }

    pub fn get_last_span<S: ReadStore + ?Sized>(&self, store: &S) -> ChainResult<Option<Span>> {
        match get_u64(store, LAST_SPAN_ID_KEY)? {
            Some(id) => Ok(Some(self.get_span(store, id)?)),
            None => Ok(None),
        }
    }

    pub fn get_all_spans<S: ReadStore>(&self, store: &S) -> ChainResult<Vec<Span>> {
        let mut spans = Vec::new();
        self.iterate_spans(store, |s| {
            spans.push(s.clone());
            Ok(())
        })?;
        Ok(spans)
    }

    /// Page `page` (1-based) of spans in id order, at most 20 per page.
    pub fn get_span_list<S: ReadStore>(&self, store: &S, page: u64, limit: u64) -> ChainResult<Vec<Span>> {
        let (skip, take) = page_window(page, limit);
        store
            .prefix_iter(SPAN_PREFIX)
            .skip(skip)
            .take(take)
            .map(|r| decode(&r?.1))
            .collect()
    }

    /// Apply `f` to every span in id order, stopping at the first error.
    pub fn iterate_spans<S, F>(&self, store: &S, mut f: F) -> ChainResult<()>
    where
        S: ReadStore,
        F: FnMut(&Span) -> ChainResult<()>,
    {
        for entry in store.prefix_iter(SPAN_PREFIX) {
            let (_, bytes) = entry?;
            let span: Span = decode(&bytes)?;
            f(&span)?;
        }
        Ok(())
    }

    /// Span covering execution block `block`. Spans are contiguous and
    /// ordered by id, so this is a binary search over ids.
    pub fn find_span_for_block<S: ReadStore + ?Sized>(&self, store: &S, block: u64) -> ChainResult<Option<Span>> {
        let last = match self.get_last_span(store)? {
            Some(last) => last,
            None => return Ok(None),
        };
        let (mut lo, mut hi) = (0u64, last.id);
        while lo <= hi {
            let mid = lo + (hi - lo) / 2;
            let span = match get_record::<Span, _>(store, &span_key(mid))? {
                Some(span) => span,
                None => {
                    lo = mid + 1;
                    continue;
                }
            };
            if block < span.start_block {
                match mid.checked_sub(1) {
                    Some(h) => hi = h,
                    None => break,
                }
            } else if block > span.end_block {
                lo = mid + 1;
            } else {
                return Ok(Some(span));
            }
        }
        Ok(None)
    }

    /// Producer on duty at execution block `block`, if a stored span covers it.
    pub fn block_producer<S: ReadStore + ?Sized>(&self, store: &S, params: &Params, block: u64) -> ChainResult<Option<Validator>> {
        Ok(self
            .find_span_for_block(store, block)?
            .and_then(|span| span.producer_for_block(block, params.sprint_duration).cloned()))
    }

    pub fn get_last_base_block<S: ReadStore + ?Sized>(&self, store: &S) -> ChainResult<u64> {
        Ok(get_u64(store, LAST_BASE_BLOCK_KEY)?.unwrap_or(0))
    }

    pub fn set_last_base_block<S: WriteStore + ?Sized>(&self, store: &mut S, number: u64) {
        put_u64(store, LAST_BASE_BLOCK_KEY, number);
    }

    /// True when no span exists or the execution chain has entered the
    /// last span, so one span of lookahead is always kept.
    pub fn needs_next_span<S: ReadStore + ?Sized>(&self, store: &S, execution_height: u64) -> ChainResult<bool> {
        Ok(match self.get_last_span(store)? {
            Some(last) => execution_height >= last.start_block,
            None => true,
        })
    }

    /// `(id, start_block, end_block)` of the span following the last one.
    pub fn next_span_bounds<S: ReadStore + ?Sized>(&self, store: &S, params: &Params) -> ChainResult<Option<(u64, u64, u64)>> {
        Ok(self.get_last_span(store)?.map(|last| {
            let start = last.end_block + 1;
            (last.id + 1, start, last.end_block + params.span_duration)
        }))
    }

    /// Base-chain block whose hash seeds the next span.
    pub fn next_seed_block<S: ReadStore + ?Sized>(&self, store: &S) -> ChainResult<u64> {
        Ok(self.get_last_base_block(store)? + 1)
    }

    /// Fetch the seed for the next span from the base chain.
    pub async fn compute_next_seed<S, B>(&self, store: &S, fetcher: &SeedFetcher<B>) -> ChainResult<Hash>
    where
        S: ReadStore + ?Sized,
        B: BaseChainSource,
    {
        let number = self.next_seed_block(store)?;
        fetcher.fetch_block_hash(number).await
    }

    /// Span 0: every eligible validator produces, no seed is consumed.
    pub fn add_genesis_span<S: WriteStore + ?Sized>(
        &self,
        store: &mut S,
        params: &Params,
        chain_id: &str,
        start_block: u64,
    ) -> ChainResult<Span> {
        let end_block = start_block + params.span_duration - 1;
        let validator_set = self.registry.get_validator_set(store)?;
        let producers = self.registry.get_eligible(store, start_block, end_block)?;
        let span = Span {
            id: 0,
            start_block,
            end_block,
            chain_id: chain_id.to_string(),
            validator_set,
            selected_producers: producers,
        };
        self.add_new_span(store, &span)?;
        info!(span_id = 0, start_block, end_block, producers = span.selected_producers.len(), "genesis span stored");
        Ok(span)
    }

    /// Select producers with an already fetched `seed` and persist the span.
    ///
    /// Selection runs before any write, so a failure leaves the store
    /// untouched. On success the base-block pointer advances by one.
    pub fn freeze_span_with_seed<S: WriteStore + ?Sized>(
        &self,
        store: &mut S,
        params: &Params,
        id: u64,
        start_block: u64,
        end_block: u64,
        chain_id: &str,
        seed: &Hash,
    ) -> ChainResult<Span> {
        let validator_set = self.registry.get_validator_set(store)?;
        let eligible = self.registry.get_eligible(store, start_block, end_block)?;
        let producers = self.selector.select_producers(seed, &eligible, params.producer_count)?;
        let last_base = self.get_last_base_block(store)?;

        let span = Span {
            id,
            start_block,
            end_block,
            chain_id: chain_id.to_string(),
            validator_set,
            selected_producers: producers,
        };
        self.add_new_span(store, &span)?;
        self.set_last_base_block(store, last_base + 1);

        info!(
            span_id = id,
            start_block,
            end_block,
            seed = %seed,
            producers = span.selected_producers.len(),
            "span frozen"
        );
        Ok(span)
    }

    /// Fetch the seed and freeze in one call.
    pub async fn freeze_next_span<S, B>(
        &self,
        store: &mut S,
        fetcher: &SeedFetcher<B>,
        params: &Params,
        id: u64,
        start_block: u64,
        end_block: u64,
        chain_id: &str,
    ) -> ChainResult<Span>
    where
        S: WriteStore + ?Sized,
        B: BaseChainSource,
    {
        let seed = self.compute_next_seed(store, fetcher).await?;
        self.freeze_span_with_seed(store, params, id, start_block, end_block, chain_id, &seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_common::{Address, MockBaseChain};
    use crate::store::{CacheStore, CommitStore, MemStore};

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

    fn seed_validators<S: WriteStore>(store: &mut S, n: u8) {
        let vals = (1..=n).map(|b| Validator::new(addr(b), vec![b], 1, 0, 0)).collect();
        let set = ValidatorSet::new(vals).unwrap();
        ValidatorRegistry::new().set_validator_set(store, &set).unwrap();
    }

    #[test]
    fn test_page_window() {
        assert_eq!(page_window(1, 10), (0, 10));
        assert_eq!(page_window(3, 10), (20, 10));
        assert_eq!(page_window(0, 50), (0, 20));
        assert_eq!(page_window(2, 100), (20, 20));
    }

    #[tokio::test]
    async fn test_fetch_retries_then_succeeds() {
        let mock = MockBaseChain::new();
        mock.insert_block(5, Hash::from_bytes([5; 32]));
        mock.fail_next(2);
        let fetcher = SeedFetcher::new(mock, fast_config());
        let h = fetcher.fetch_block_hash(5).await.unwrap();
        assert_eq!(h, Hash::from_bytes([5; 32]));
        assert_eq!(fetcher.source().call_count(), 3);
    }

    #[tokio::test]
    async fn test_fetch_exhausted_is_seed_unavailable() {
        let mock = MockBaseChain::new();
        mock.set_always_fail(true);
        let fetcher = SeedFetcher::new(mock, fast_config());
        let r = fetcher.fetch_block_hash(1).await;
        assert!(matches!(r, Err(ChainError::SeedUnavailable(_))));
        assert_eq!(fetcher.source().call_count(), 3);
    }

    #[tokio::test]
    async fn test_fetch_not_found_not_retried() {
        let fetcher = SeedFetcher::new(MockBaseChain::new(), fast_config());
        assert!(matches!(fetcher.fetch_block_hash(9).await, Err(ChainError::SeedUnavailable(_))));
        assert_eq!(fetcher.source().call_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let mock = MockBaseChain::with_latency(100);
        mock.insert_range(1, 1);
        let cfg = BaseChainConfig { timeout_ms: 10, retry_count: 1, retry_delay_ms: 1, ..BaseChainConfig::default() };
        let fetcher = SeedFetcher::new(mock, cfg);
        assert!(matches!(fetcher.fetch_block_hash(1).await, Err(ChainError::SeedUnavailable(_))));
    }

    #[tokio::test]
    async fn test_spans_are_contiguous() {
        let store = MemStore::new();
        let snap = store.snapshot().unwrap();
        let mut cache = CacheStore::new(&snap);
        seed_validators(&mut cache, 6);
        let params = Params { span_duration: 100, ..Params::default() };
        let mgr = SpanManager::default();

        mgr.add_genesis_span(&mut cache, &params, "15001", 0).unwrap();
        let mock = MockBaseChain::new();
        mock.insert_range(1, 10);
        let fetcher = SeedFetcher::new(mock, fast_config());

        for _ in 0..3 {
            let (id, start, end) = mgr.next_span_bounds(&cache, &params).unwrap().unwrap();
            mgr.freeze_next_span(&mut cache, &fetcher, &params, id, start, end, "15001").await.unwrap();
        }

        let spans = mgr.get_all_spans(&cache).unwrap();
        assert_eq!(spans.len(), 4);
        for w in spans.windows(2) {
            assert_eq!(w[1].id, w[0].id + 1);
            assert_eq!(w[1].start_block, w[0].end_block + 1);
        }
        assert_eq!(mgr.get_last_base_block(&cache).unwrap(), 3);
        assert_eq!(mgr.get_last_span(&cache).unwrap().unwrap().id, 3);
        assert!(spans[1..].iter().all(|s| s.selected_producers.iter().map(|v| v.voting_power).sum::<i64>() == 4));
    }

    #[tokio::test]
    async fn test_failed_freeze_writes_nothing() {
        let store = MemStore::new();
        let snap = store.snapshot().unwrap();
        let mut cache = CacheStore::new(&snap);
        seed_validators(&mut cache, 3);
        let params = Params::default();
        let mgr = SpanManager::default();
        mgr.add_genesis_span(&mut cache, &params, "15001", 0).unwrap();

        let fetcher = SeedFetcher::new(MockBaseChain::new(), fast_config());
        let (id, start, end) = mgr.next_span_bounds(&cache, &params).unwrap().unwrap();
        let r = mgr.freeze_next_span(&mut cache, &fetcher, &params, id, start, end, "15001").await;
        assert!(matches!(r, Err(ChainError::SeedUnavailable(_))));
        assert!(!mgr.has_span(&cache, 1).unwrap());
        assert_eq!(mgr.get_last_base_block(&cache).unwrap(), 0);

        let empty = Params { producer_count: 0, ..Params::default() };
        let r = mgr.freeze_span_with_seed(&mut cache, &empty, id, start, end, "15001", &Hash::ZERO);
        assert!(matches!(r, Err(ChainError::SelectionError(_))));
        assert!(!mgr.has_span(&cache, 1).unwrap());
    }

    #[test]
    fn test_needs_next_span_and_listing() {
        let store = MemStore::new();
        let snap = store.snapshot().unwrap();
        let mut cache = CacheStore::new(&snap);
        let mgr = SpanManager::default();
        assert!(mgr.needs_next_span(&cache, 0).unwrap());

        seed_validators(&mut cache, 2);
        let params = Params { span_duration: 10, sprint_duration: 2, ..Params::default() };
        mgr.add_genesis_span(&mut cache, &params, "c", 1).unwrap();
        assert!(mgr.needs_next_span(&cache, 1).unwrap());
        for id in 1..=30u64 {
            let seed = Hash::from_bytes([id as u8; 32]);
            let (nid, s, e) = mgr.next_span_bounds(&cache, &params).unwrap().unwrap();
            assert_eq!(nid, id);
            mgr.freeze_span_with_seed(&mut cache, &params, nid, s, e, "c", &seed).unwrap();
        }
        let last = mgr.get_last_span(&cache).unwrap().unwrap();
        assert!(!mgr.needs_next_span(&cache, last.start_block - 1).unwrap());
        assert!(mgr.needs_next_span(&cache, last.start_block).unwrap());

        let page1 = mgr.get_span_list(&cache, 1, 100).unwrap();
        assert_eq!(page1.len(), 20);
        assert_eq!(page1[0].id, 0);
        let page2 = mgr.get_span_list(&cache, 2, 20).unwrap();
        assert_eq!(page2.len(), 11);
        assert_eq!(page2[0].id, 20);
    }

    fn raw_span(id: u64, start: u64, end: u64, producers: Vec<Validator>) -> Span {
        Span {
            id,
            start_block: start,
            end_block: end,
            chain_id: "c".into(),
            validator_set: ValidatorSet::default(),
            selected_producers: producers,
        }
    }

    #[test]
    fn test_sprint_producer_rotation() {
        let a = Validator::new(addr(1), vec![], 1, 0, 0);
        let b = Validator::new(addr(2), vec![], 2, 0, 0);
        let span = raw_span(1, 100, 199, vec![a.clone(), b.clone()]);

        let duty: Vec<Address> = (0..4u64)
            .map(|sprint| span.producer_for_block(100 + sprint * 10, 10).unwrap().address)
            .collect();
        assert_eq!(duty, vec![a.address, b.address, b.address, a.address]);
        assert_eq!(span.producer_for_block(109, 10).unwrap().address, a.address);
        assert_eq!(span.producer_for_block(110, 10).unwrap().address, b.address);
        assert!(span.producer_for_block(99, 10).is_none());
        assert!(span.producer_for_block(200, 10).is_none());
        assert!(span.producer_for_block(150, 0).is_none());
        assert!(raw_span(2, 0, 9, vec![]).producer_for_block(5, 1).is_none());
    }

    #[test]
    fn test_find_span_for_block() {
        let store = MemStore::new();
        let snap = store.snapshot().unwrap();
        let mut cache = CacheStore::new(&snap);
        seed_validators(&mut cache, 3);
        let params = Params { span_duration: 10, sprint_duration: 5, ..Params::default() };
        let mgr = SpanManager::default();
        assert!(mgr.find_span_for_block(&cache, 0).unwrap().is_none());

        mgr.add_genesis_span(&mut cache, &params, "c", 0).unwrap();
        for id in 1..=6u64 {
            let (nid, s, e) = mgr.next_span_bounds(&cache, &params).unwrap().unwrap();
            mgr.freeze_span_with_seed(&mut cache, &params, nid, s, e, "c", &Hash::from_bytes([id as u8; 32]))
                .unwrap();
        }
        for block in [0u64, 9, 10, 35, 69] {
            let span = mgr.find_span_for_block(&cache, block).unwrap().unwrap();
            assert!(span.contains(block));
            assert_eq!(span.id, block / 10);
        }
        assert!(mgr.find_span_for_block(&cache, 70).unwrap().is_none());

        // genesis span: all three validators produce, one sprint each
        let p0 = mgr.block_producer(&cache, &params, 0).unwrap().unwrap();
        let p1 = mgr.block_producer(&cache, &params, 5).unwrap().unwrap();
        assert_eq!((p0.address, p1.address), (addr(1), addr(2)));
        assert!(mgr.block_producer(&cache, &params, 70).unwrap().is_none());
    }

    #[test]
    fn test_import_spans() {
        let store = MemStore::new();
        let snap = store.snapshot().unwrap();
        let mut cache = CacheStore::new(&snap);
        let mgr = SpanManager::default();
        let v = Validator::new(addr(1), vec![], 1, 0, 0);

        let gap = vec![raw_span(3, 0, 9, vec![v.clone()]), raw_span(5, 10, 19, vec![v.clone()])];
        assert!(matches!(mgr.import_spans(&mut cache, &gap), Err(ChainError::InvalidParams(_))));
        assert!(!mgr.has_span(&cache, 3).unwrap());

        let spans = vec![raw_span(4, 10, 19, vec![v.clone()]), raw_span(3, 0, 9, vec![v])];
        assert_eq!(mgr.import_spans(&mut cache, &spans).unwrap(), Some(4));
        assert_eq!(mgr.get_last_span(&cache).unwrap().unwrap().id, 4);
        assert_eq!(mgr.find_span_for_block(&cache, 5).unwrap().unwrap().id, 3);
        assert_eq!(mgr.import_spans(&mut cache, &[]).unwrap(), None);
    }
}
