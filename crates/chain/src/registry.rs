//! Validator registry: persisted validator set, per-address history and the
//! checkpoint ACK counter.
//!
//! A validator's `[start_epoch, end_epoch)` window is measured in
//! execution-chain block heights, both for span eligibility and for
//! pruning.

use tracing::{debug, info};

use bridge_common::Address;

use crate::error::{ChainError, ChainResult};
use crate::keys::{validator_key, ACK_COUNT_KEY, VALIDATOR_SET_KEY};
use crate::store::{get_record, get_u64, put_record, put_u64, ReadStore, WriteStore};
use crate::validator::{Validator, ValidatorSet};

#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatorRegistry;

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self
    }

    pub fn get_validator_set<S: ReadStore + ?Sized>(&self, store: &S) -> ChainResult<ValidatorSet> {
        Ok(get_record(store, VALIDATOR_SET_KEY)?.unwrap_or_default())
    }

    /// Persist the set and refresh each member's per-address record.
    pub fn set_validator_set<S: WriteStore + ?Sized>(&self, store: &mut S, set: &ValidatorSet) -> ChainResult<()> {
        for v in set.validators() {
            put_record(store, &validator_key(&v.address), v)?;
        }
        put_record(store, VALIDATOR_SET_KEY, set)
    }

    /// Lookup by address. Also finds validators already pruned from the
    /// live set.
    pub fn get_by_id<S: ReadStore + ?Sized>(&self, store: &S, address: &Address) -> ChainResult<Option<Validator>> {
        get_record(store, &validator_key(address))
    }

    /// Validators active for the whole window `[start, end]`, in address order.
    pub fn get_eligible<S: ReadStore + ?Sized>(&self, store: &S, start: u64, end: u64) -> ChainResult<Vec<Validator>> {
        let set = self.get_validator_set(store)?;
        Ok(set
            .validators()
            .iter()
            .filter(|v| v.voting_power > 0 && v.covers(start, end))
            .cloned()
            .collect())
    }

    /// Join.
    pub fn add_validator<S: WriteStore + ?Sized>(&self, store: &mut S, validator: Validator) -> ChainResult<()> {
        if self.get_by_id(store, &validator.address)?.is_some() {
            return Err(ChainError::ValidatorExists(validator.address.to_hex()));
        }
        let mut set = self.get_validator_set(store)?;
        let address = validator.address;
        let power = validator.voting_power;
        set.add(validator)?;
        self.set_validator_set(store, &set)?;
        info!(validator = %address, power, total = set.total_voting_power(), "validator joined");
        Ok(())
    }

    /// Schedule an exit. The validator stays in the set until
    /// `prune_inactive` runs at or after `end_epoch`.
    pub fn exit_validator<S: WriteStore + ?Sized>(&self, store: &mut S, address: &Address, end_epoch: u64) -> ChainResult<()> {
        let mut set = self.get_validator_set(store)?;
        set.set_end_epoch(address, end_epoch)?;
        self.set_validator_set(store, &set)?;
        info!(validator = %address, end_epoch, "validator exit scheduled");
        Ok(())
    }

    pub fn update_signer<S: WriteStore + ?Sized>(&self, store: &mut S, address: &Address, signer_pubkey: Vec<u8>) -> ChainResult<()> {
        let mut set = self.get_validator_set(store)?;
        set.set_signer(address, signer_pubkey)?;
        self.set_validator_set(store, &set)?;
        info!(validator = %address, "validator signer updated");
        Ok(())
    }

    /// Drop validators whose window ended at or before execution height
    /// `execution_height`.
    pub fn prune_inactive<S: WriteStore + ?Sized>(&self, store: &mut S, execution_height: u64) -> ChainResult<Vec<Address>> {
        let mut set = self.get_validator_set(store)?;
        let expired: Vec<Address> = set
            .validators()
            .iter()
            .filter(|v| v.end_epoch != 0 && execution_height >= v.end_epoch)
            .map(|v| v.address)
            .collect();
        if expired.is_empty() {
            return Ok(expired);
        }
        for addr in &expired {
            if let Some(v) = set.remove(addr) {
                put_record(store, &validator_key(addr), &v)?;
            }
        }
        put_record(store, VALIDATOR_SET_KEY, &set)?;
        info!(execution_height, removed = expired.len(), "pruned exited validators");
        Ok(expired)
    }

    pub fn increment_proposer_priority<S: WriteStore + ?Sized>(&self, store: &mut S, times: u64) -> ChainResult<()> {
        let mut set = self.get_validator_set(store)?;
        set.increment_proposer_priority(times);
        put_record(store, VALIDATOR_SET_KEY, &set)
    }

    /// Move proposer duty to the next validator in weighted round-robin order.
    pub fn rotate_proposer<S: WriteStore + ?Sized>(&self, store: &mut S) -> ChainResult<Option<Address>> {
        let mut set = self.get_validator_set(store)?;
        set.rotate_proposer();
        put_record(store, VALIDATOR_SET_KEY, &set)?;
        let proposer = set.proposer().map(|v| v.address);
        debug!(proposer = ?proposer, "proposer rotated");
        Ok(proposer)
    }

    pub fn get_ack_count<S: ReadStore + ?Sized>(&self, store: &S) -> ChainResult<u64> {
        Ok(get_u64(store, ACK_COUNT_KEY)?.unwrap_or(0))
    }

    pub fn increment_ack_count<S: WriteStore + ?Sized>(&self, store: &mut S) -> ChainResult<u64> {
        let next = self.get_ack_count(store)? + 1;
        put_u64(store, ACK_COUNT_KEY, next);
        Ok(next)
    }
}
