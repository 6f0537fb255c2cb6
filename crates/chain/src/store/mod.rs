//! Key-value store abstraction.
//!
//! Three layers:
//! - [`CommitStore`]: the durable backend. Hands out read-only snapshots of
//!   the last committed version and applies a whole [`WriteBatch`]
//!   atomically. This is the only write path to disk.
//! - [`CacheStore`]: a write overlay on top of any [`ReadStore`]. Blocks
//!   and individual messages run inside overlays; dropping an overlay
//!   discards its writes.
//! - [`ReadStore`] / [`WriteStore`]: what the modules program against.
//!
//! Prefix iteration is lazy and restartable. [`PrefixIter`] pulls pages
//! from [`ReadStore::scan`] on demand, so no backend cursor has to outlive
//! a single call.

mod lmdb_store;

pub use self::lmdb_store::{LmdbSnapshot, LmdbStore};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;
use std::sync::Arc;
use thiserror::Error;

use crate::error::{ChainError, ChainResult};

pub type KvPair = (Vec<u8>, Vec<u8>);

/// Entries fetched per page by [`PrefixIter`].
const ITER_PAGE_SIZE: usize = 64;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ════════════════════════════════════════════════════════════════════════════
// TRAITS
// ════════════════════════════════════════════════════════════════════════════

pub trait ReadStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    fn has(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }

    /// Up to `limit` entries under `prefix`, ascending by key.
    ///
    /// With `after = Some(k)` the scan starts strictly after `k`; otherwise
    /// at the first key under `prefix`.
    fn scan(&self, prefix: &[u8], after: Option<&[u8]>, limit: usize) -> Result<Vec<KvPair>, StoreError>;

    /// Lazy ascending iterator over every entry under `prefix`.
    fn prefix_iter(&self, prefix: &[u8]) -> PrefixIter<'_, Self>
    where
        Self: Sized,
    {
        PrefixIter::new(self, prefix)
    }
}

pub trait WriteStore: ReadStore {
    fn set(&mut self, key: &[u8], value: Vec<u8>);

    fn delete(&mut self, key: &[u8]);

    /// Replay a batch produced by a nested overlay.
    fn apply(&mut self, batch: WriteBatch) {
        for (key, op) in batch.ops {
            match op {
                Some(value) => self.set(&key, value),
                None => self.delete(&key),
            }
        }
    }
}

/// Durable backend with snapshot reads and atomic batch commits.
pub trait CommitStore: Send + Sync {
    type Snapshot<'a>: ReadStore
    where
        Self: 'a;

    /// Read view of the last committed version. Later commits are not
    /// visible through it.
    fn snapshot(&self) -> Result<Self::Snapshot<'_>, StoreError>;

    /// Apply every write in `batch` or none of them.
    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;
}

impl<T: ReadStore + ?Sized> ReadStore for &T {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key)
    }

    fn scan(&self, prefix: &[u8], after: Option<&[u8]>, limit: usize) -> Result<Vec<KvPair>, StoreError> {
        (**self).scan(prefix, after, limit)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// RECORD HELPERS
// ════════════════════════════════════════════════════════════════════════════

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> ChainResult<T> {
    bincode::deserialize(bytes).map_err(|e| ChainError::Codec(e.to_string()))
}

pub fn encode<T: Serialize>(value: &T) -> ChainResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| ChainError::Codec(e.to_string()))
}

/// Read and decode a record. Missing keys are `Ok(None)`; undecodable
/// bytes are a fatal codec error.
pub fn get_record<T, S>(store: &S, key: &[u8]) -> ChainResult<Option<T>>
where
    T: DeserializeOwned,
    S: ReadStore + ?Sized,
{
    match store.get(key)? {
        Some(bytes) => Ok(Some(decode(&bytes)?)),
        None => Ok(None),
    }
}

pub fn put_record<T, S>(store: &mut S, key: &[u8], value: &T) -> ChainResult<()>
where
    T: Serialize,
    S: WriteStore + ?Sized,
{
    let bytes = encode(value)?;
    store.set(key, bytes);
    Ok(())
}

pub fn get_u64<S: ReadStore + ?Sized>(store: &S, key: &[u8]) -> ChainResult<Option<u64>> {
    match store.get(key)? {
        Some(bytes) => {
            let arr: [u8; 8] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| ChainError::Codec(format!("expected 8-byte counter, got {} bytes", bytes.len())))?;
            Ok(Some(u64::from_be_bytes(arr)))
        }
        None => Ok(None),
    }
}

pub fn put_u64<S: WriteStore + ?Sized>(store: &mut S, key: &[u8], value: u64) {
    store.set(key, value.to_be_bytes().to_vec());
}

// ════════════════════════════════════════════════════════════════════════════
// PREFIX ITERATOR
// ════════════════════════════════════════════════════════════════════════════

/// Paged, lazy iterator over one prefix. Cloning yields an independent
/// iterator at the same position; [`PrefixIter::restart`] rewinds.
pub struct PrefixIter<'a, S: ReadStore + ?Sized> {
    store: &'a S,
    prefix: Vec<u8>,
    last: Option<Vec<u8>>,
    buf: VecDeque<KvPair>,
    exhausted: bool,
    failed: bool,
}

impl<'a, S: ReadStore + ?Sized> PrefixIter<'a, S> {
    pub fn new(store: &'a S, prefix: &[u8]) -> Self {
        Self {
            store,
            prefix: prefix.to_vec(),
            last: None,
            buf: VecDeque::new(),
            exhausted: false,
            failed: false,
        }
    }

    pub fn restart(&mut self) {
        self.last = None;
        self.buf.clear();
        self.exhausted = false;
        self.failed = false;
    }
}

impl<S: ReadStore + ?Sized> Clone for PrefixIter<'_, S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store,
            prefix: self.prefix.clone(),
            last: self.last.clone(),
            buf: self.buf.clone(),
            exhausted: self.exhausted,
            failed: self.failed,
        }
    }
}

impl<S: ReadStore + ?Sized> Iterator for PrefixIter<'_, S> {
    type Item = Result<KvPair, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.is_empty() {
            if self.exhausted || self.failed {
                return None;
            }
            match self.store.scan(&self.prefix, self.last.as_deref(), ITER_PAGE_SIZE) {
                Ok(page) => {
                    if page.len() < ITER_PAGE_SIZE {
                        self.exhausted = true;
                    }
                    self.buf.extend(page);
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
        let (key, value) = self.buf.pop_front()?;
        self.last = Some(key.clone());
        Some(Ok((key, value)))
    }
}

/// Keys under `prefix` strictly after `after` (or from the prefix start).
fn range_after<'m, V>(
    map: &'m BTreeMap<Vec<u8>, V>,
    prefix: &[u8],
    after: Option<&[u8]>,
) -> impl Iterator<Item = (&'m Vec<u8>, &'m V)> + 'm {
    let lower = match after {
        Some(a) => Bound::Excluded(a.to_vec()),
        None => Bound::Included(prefix.to_vec()),
    };
    let prefix = prefix.to_vec();
    map.range((lower, Bound::Unbounded))
        .take_while(move |(k, _)| k.starts_with(&prefix))
}

// ════════════════════════════════════════════════════════════════════════════
// WRITE BATCH + OVERLAY
// ════════════════════════════════════════════════════════════════════════════

/// Ordered set of pending writes; `None` marks a delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &[u8], value: Vec<u8>) {
        self.ops.insert(key.to_vec(), Some(value));
    }

    pub fn delete(&mut self, key: &[u8]) {
        self.ops.insert(key.to_vec(), None);
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &Option<Vec<u8>>)> {
        self.ops.iter()
    }
}

impl IntoIterator for WriteBatch {
    type Item = (Vec<u8>, Option<Vec<u8>>);
    type IntoIter = std::collections::btree_map::IntoIter<Vec<u8>, Option<Vec<u8>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

/// Write overlay over a parent store. Reads fall through to the parent
/// unless the key was written (or deleted) in the overlay.
pub struct CacheStore<'a, P: ReadStore + ?Sized> {
    parent: &'a P,
    writes: WriteBatch,
}

impl<'a, P: ReadStore + ?Sized> CacheStore<'a, P> {
    pub fn new(parent: &'a P) -> Self {
        Self { parent, writes: WriteBatch::new() }
    }

    pub fn is_dirty(&self) -> bool {
        !self.writes.is_empty()
    }

    pub fn into_batch(self) -> WriteBatch {
        self.writes
    }
}

impl<P: ReadStore + ?Sized> ReadStore for CacheStore<'_, P> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        match self.writes.ops.get(key) {
            Some(Some(v)) => Ok(Some(v.clone())),
            Some(None) => Ok(None),
            None => self.parent.get(key),
        }
    }

    fn scan(&self, prefix: &[u8], after: Option<&[u8]>, limit: usize) -> Result<Vec<KvPair>, StoreError> {
        let mut out = Vec::with_capacity(limit.min(ITER_PAGE_SIZE));
        if limit == 0 {
            return Ok(out);
        }
        let mut cursor: Option<Vec<u8>> = after.map(|a| a.to_vec());

        loop {
            let parent_page = self.parent.scan(prefix, cursor.as_deref(), limit)?;
            let parent_done = parent_page.len() < limit;
            // Overlay keys are merged only up to the last parent key of this
            // page; anything beyond belongs to the next round.
            let upper: Option<Vec<u8>> = if parent_done {
                None
            } else {
                parent_page.last().map(|(k, _)| k.clone())
            };
            let bound = upper.clone();

            let mut overlay = range_after(&self.writes.ops, prefix, cursor.as_deref())
                .take_while(move |(k, _)| bound.as_ref().map_or(true, |u| k.as_slice() <= u.as_slice()))
                .peekable();
            let mut parent_iter = parent_page.into_iter().peekable();

            loop {
                let overlay_first = match (overlay.peek(), parent_iter.peek()) {
                    (None, None) => break,
                    (Some(_), None) => true,
                    (None, Some(_)) => false,
                    (Some((ok, _)), Some((pk, _))) => ok.as_slice() <= pk.as_slice(),
                };

                if overlay_first {
                    if let Some((key, op)) = overlay.next() {
                        if parent_iter.peek().map_or(false, |(pk, _)| pk == key) {
                            parent_iter.next();
                        }
                        if let Some(value) = op {
                            out.push((key.clone(), value.clone()));
                        }
                    }
                } else if let Some(kv) = parent_iter.next() {
                    out.push(kv);
                }

                if out.len() == limit {
                    return Ok(out);
                }
            }

            if parent_done {
                return Ok(out);
            }
            cursor = upper;
        }
    }
}

impl<P: ReadStore + ?Sized> WriteStore for CacheStore<'_, P> {
    fn set(&mut self, key: &[u8], value: Vec<u8>) {
        self.writes.set(key, value);
    }

    fn delete(&mut self, key: &[u8]) {
        self.writes.delete(key);
    }
}

// ════════════════════════════════════════════════════════════════════════════
// IN-MEMORY BACKEND
// ════════════════════════════════════════════════════════════════════════════

type Map = BTreeMap<Vec<u8>, Vec<u8>>;

/// Copy-on-write in-memory backend. Snapshots share the map until the
/// next commit clones it.
#[derive(Debug, Default)]
pub struct MemStore {
    data: RwLock<Arc<Map>>,
}

#[derive(Debug, Clone)]
pub struct MemSnapshot {
    data: Arc<Map>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReadStore for MemSnapshot {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.data.get(key).cloned())
    }

    fn scan(&self, prefix: &[u8], after: Option<&[u8]>, limit: usize) -> Result<Vec<KvPair>, StoreError> {
        Ok(range_after(&self.data, prefix, after)
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

impl CommitStore for MemStore {
    type Snapshot<'a> = MemSnapshot;

    fn snapshot(&self) -> Result<Self::Snapshot<'_>, StoreError> {
        Ok(MemSnapshot { data: Arc::clone(&self.data.read()) })
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut guard = self.data.write();
        let map = Arc::make_mut(&mut guard);
        for (key, op) in batch {
            match op {
                Some(value) => {
                    map.insert(key, value);
                }
                None => {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }
}
