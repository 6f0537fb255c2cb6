//! Module parameters stored under the params key.

use serde::{Deserialize, Serialize};

use bridge_common::GenesisParams;

use crate::error::{ChainError, ChainResult};
use crate::keys::PARAMS_KEY;
use crate::store::{get_record, put_record, ReadStore, WriteStore};

/// Consensus-relevant parameters. Changing any of them changes state
/// transitions, so they live in chain state rather than the node config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    /// Producers drawn per span
    pub producer_count: u32,
    /// Execution blocks per span
    pub span_duration: u64,
    /// Execution blocks per sprint (a producer's consecutive turn)
    pub sprint_duration: u64,
    /// Seconds before a buffered checkpoint may be no-acked
    pub checkpoint_buffer_time: u64,
    /// Start block of the very first checkpoint
    pub genesis_checkpoint_start: u64,
    /// Maximum number of blocks in one checkpoint
    pub max_checkpoint_length: u64,
}

impl Default for Params {
    fn default() -> Self {
        Self::from(&GenesisParams::default())
    }
}

impl From<&GenesisParams> for Params {
    fn from(g: &GenesisParams) -> Self {
        Self {
            producer_count: g.producer_count,
            span_duration: g.span_duration,
            sprint_duration: g.sprint_duration,
            checkpoint_buffer_time: g.checkpoint_buffer_time,
            genesis_checkpoint_start: g.genesis_checkpoint_start,
            max_checkpoint_length: g.max_checkpoint_length,
        }
    }
}

impl Params {
    pub fn validate(&self) -> ChainResult<()> {
        if self.producer_count == 0 {
            return Err(ChainError::InvalidParams("producer_count must be > 0".into()));
        }
        if self.span_duration == 0 {
            return Err(ChainError::InvalidParams("span_duration must be > 0".into()));
        }
        if self.sprint_duration == 0 || self.sprint_duration > self.span_duration {
            return Err(ChainError::InvalidParams(format!(
                "sprint_duration {} must be in 1..={}",
                self.sprint_duration, self.span_duration
            )));
        }
        if self.max_checkpoint_length == 0 {
            return Err(ChainError::InvalidParams("max_checkpoint_length must be > 0".into()));
        }
        Ok(())
    }
}

/// Stored params, or defaults when none were written.
pub fn get_params<S: ReadStore + ?Sized>(store: &S) -> ChainResult<Params> {
    Ok(get_record(store, PARAMS_KEY)?.unwrap_or_default())
}

pub fn set_params<S: WriteStore + ?Sized>(store: &mut S, params: &Params) -> ChainResult<()> {
    params.validate()?;
    put_record(store, PARAMS_KEY, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CacheStore, MemStore, CommitStore};

    #[test]
    fn test_defaults_when_absent() {
        let store = MemStore::new();
        let snap = store.snapshot().unwrap();
        let p = get_params(&snap).unwrap();
        assert_eq!(p.producer_count, 4);
        assert_eq!(p.span_duration, 6400);
        assert_eq!(p.checkpoint_buffer_time, 1000);
    }

    #[test]
    fn test_set_rejects_invalid() {
        let store = MemStore::new();
        let snap = store.snapshot().unwrap();
        let mut cache = CacheStore::new(&snap);

        let mut p = Params::default();
        p.sprint_duration = p.span_duration + 1;
        assert!(matches!(set_params(&mut cache, &p), Err(ChainError::InvalidParams(_))));
        p = Params { producer_count: 0, ..Params::default() };
        assert!(set_params(&mut cache, &p).is_err());
        assert!(!cache.is_dirty());

        let good = Params { producer_count: 7, ..Params::default() };
        set_params(&mut cache, &good).unwrap();
        assert_eq!(get_params(&cache).unwrap().producer_count, 7);
    }
}
