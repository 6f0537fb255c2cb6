//! LMDB backend.
//!
//! One environment, one named database holding the whole prefix-partitioned
//! keyspace. A block commit is a single RW transaction, so a crash leaves
//! either the previous block or the new one on disk. Snapshots are read
//! transactions; the environment is opened with `NO_TLS` so a snapshot is
//! not pinned to the thread that created it.

use lmdb::{
    Cursor,
    Database,
    DatabaseFlags,
    Environment,
    EnvironmentFlags,
    RoTransaction,
    Transaction as LmdbTxn,
    WriteFlags,
};
use parking_lot::Mutex;
use std::path::Path;
use tracing::debug;

use super::{CommitStore, KvPair, ReadStore, StoreError, WriteBatch};

const STATE_DB: &str = "bridge_state";
const MAP_SIZE: usize = 1_000_000_000;

impl From<lmdb::Error> for StoreError {
    fn from(e: lmdb::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

pub struct LmdbStore {
    env: Environment,
    db: Database,
    /// Serializes commits; LMDB would block a second writer anyway.
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for LmdbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbStore").finish_non_exhaustive()
    }
}

impl LmdbStore {
    /// Open (or create) the store under `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let p = path.as_ref();
        std::fs::create_dir_all(p)?;

        let env = Environment::new()
            .set_flags(EnvironmentFlags::NO_TLS)
            .set_max_dbs(2)
            .set_map_size(MAP_SIZE)
            .open(p)?;
        let db = env.create_db(Some(STATE_DB), DatabaseFlags::empty())?;

        debug!(path = %p.display(), "lmdb store opened");
        Ok(Self {
            env,
            db,
            write_lock: Mutex::new(()),
        })
    }
}

/// Read transaction over the committed state.
pub struct LmdbSnapshot<'env> {
    txn: RoTransaction<'env>,
    db: Database,
}

impl ReadStore for LmdbSnapshot<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        match self.txn.get(self.db, &key) {
            Ok(v) => Ok(Some(v.to_vec())),
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn scan(&self, prefix: &[u8], after: Option<&[u8]>, limit: usize) -> Result<Vec<KvPair>, StoreError> {
        let mut out = Vec::new();
        if limit == 0 {
            return Ok(out);
        }
        let mut cursor = self.txn.open_ro_cursor(self.db)?;
        let start = after.unwrap_or(prefix);
        for (key, val) in cursor.iter_from(start) {
            if !key.starts_with(prefix) {
                break;
            }
            if after == Some(key) {
                continue;
            }
            out.push((key.to_vec(), val.to_vec()));
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }
}

impl CommitStore for LmdbStore {
    type Snapshot<'a> = LmdbSnapshot<'a>;

    fn snapshot(&self) -> Result<Self::Snapshot<'_>, StoreError> {
        let txn = self.env.begin_ro_txn()?;
        Ok(LmdbSnapshot { txn, db: self.db })
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let writes = batch.len();
        let mut wtxn = self.env.begin_rw_txn()?;
        for (key, op) in batch {
            match op {
                Some(value) => wtxn.put(self.db, &key, &value, WriteFlags::empty())?,
                None => match wtxn.del(self.db, &key, None) {
                    Ok(()) | Err(lmdb::Error::NotFound) => {}
                    Err(e) => return Err(e.into()),
                },
            }
        }
        wtxn.commit()?;
        debug!(writes, "lmdb batch committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_commit_and_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = LmdbStore::open(dir.path()).unwrap();
            let mut batch = WriteBatch::new();
            batch.set(b"\x01a", b"1".to_vec());
            batch.set(b"\x01b", b"2".to_vec());
            batch.set(b"\x02a", b"3".to_vec());
            store.commit(batch).unwrap();
        }
        let store = LmdbStore::open(dir.path()).unwrap();
        let snap = store.snapshot().unwrap();
        assert_eq!(snap.get(b"\x01b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(snap.get(b"\x01z").unwrap(), None);
        let keys: Vec<Vec<u8>> = snap.prefix_iter(b"\x01").map(|r| r.unwrap().0).collect();
        assert_eq!(keys, vec![b"\x01a".to_vec(), b"\x01b".to_vec()]);
    }

    #[test]
    fn test_snapshot_survives_commit() {
        let dir = tempdir().unwrap();
        let store = LmdbStore::open(dir.path()).unwrap();
        let mut batch = WriteBatch::new();
        batch.set(b"\x05k", b"old".to_vec());
        store.commit(batch).unwrap();

        let snap = store.snapshot().unwrap();
        let mut batch = WriteBatch::new();
        batch.set(b"\x05k", b"new".to_vec());
        batch.delete(b"\x05missing");
        store.commit(batch).unwrap();

        assert_eq!(snap.get(b"\x05k").unwrap(), Some(b"old".to_vec()));
        drop(snap);
        assert_eq!(store.snapshot().unwrap().get(b"\x05k").unwrap(), Some(b"new".to_vec()));
    }

    #[test]
    fn test_scan_after_last_key_is_empty() {
        let dir = tempdir().unwrap();
        let store = LmdbStore::open(dir.path()).unwrap();
        let mut batch = WriteBatch::new();
        batch.set(b"\x07a", b"1".to_vec());
        store.commit(batch).unwrap();
        let snap = store.snapshot().unwrap();
        assert!(snap.scan(b"\x07", Some(b"\x07a"), 10).unwrap().is_empty());
        assert!(snap.scan(b"\x09", None, 10).unwrap().is_empty());
    }
}
