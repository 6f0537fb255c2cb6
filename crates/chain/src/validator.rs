//! Validator records and the ordered validator set.
//!
//! Proposer rotation is priority accumulation: every round each validator's
//! priority grows by its voting power, the highest priority becomes
//! proposer and pays back the total power. Over `total_power` rounds every
//! validator proposes exactly `voting_power` times.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use bridge_common::Address;

use crate::error::{ChainError, ChainResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub address: Address,
    #[serde(serialize_with = "ser_hex", deserialize_with = "de_hex")]
    pub signer_pubkey: Vec<u8>,
    pub voting_power: i64,
    /// First execution-chain block the validator is active for
    pub start_epoch: u64,
    /// First execution-chain block it is no longer active for; 0 means
    /// open-ended
    pub end_epoch: u64,
    pub proposer_priority: i64,
}

pub(crate) fn ser_hex<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format!("0x{}", hex::encode(bytes)))
}

pub(crate) fn de_hex<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
    let s = String::deserialize(d)?;
    hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom)
}

impl Validator {
    pub fn new(address: Address, signer_pubkey: Vec<u8>, voting_power: i64, start_epoch: u64, end_epoch: u64) -> Self {
        Self {
            address,
            signer_pubkey,
            voting_power,
            start_epoch,
            end_epoch,
            proposer_priority: 0,
        }
    }

    /// Active at `height` iff `start_epoch <= height < end_epoch`
    /// (`end_epoch == 0` is open-ended).
    pub fn is_active_at(&self, height: u64) -> bool {
        self.start_epoch <= height && (self.end_epoch == 0 || height < self.end_epoch)
    }

    /// Active for every height in `[start, end]`.
    pub fn covers(&self, start: u64, end: u64) -> bool {
        self.is_active_at(start) && self.is_active_at(end)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// VALIDATOR SET
// ════════════════════════════════════════════════════════════════════════════

/// Validators in ascending address order plus rotation state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSet {
    validators: Vec<Validator>,
    total_voting_power: i64,
    proposer: Option<Address>,
}

impl ValidatorSet {
    /// Build a set, sort by address and pick the first proposer.
    pub fn new(mut validators: Vec<Validator>) -> ChainResult<Self> {
        validators.sort_by(|a, b| a.address.cmp(&b.address));
        for pair in validators.windows(2) {
            if pair[0].address == pair[1].address {
                return Err(ChainError::ValidatorExists(pair[0].address.to_hex()));
            }
        }
        if let Some(v) = validators.iter().find(|v| v.voting_power <= 0) {
            return Err(ChainError::InvalidVotingPower(v.voting_power));
        }
        let mut set = Self {
            validators,
            total_voting_power: 0,
            proposer: None,
        };
        set.update_total();
        if !set.validators.is_empty() {
            set.increment_proposer_priority(1);
        }
        Ok(set)
    }

    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn total_voting_power(&self) -> i64 {
        self.total_voting_power
    }

    pub fn get(&self, address: &Address) -> Option<&Validator> {
        self.validators
            .binary_search_by(|v| v.address.cmp(address))
            .ok()
            .map(|i| &self.validators[i])
    }

    fn get_mut(&mut self, address: &Address) -> Option<&mut Validator> {
        match self.validators.binary_search_by(|v| v.address.cmp(address)) {
            Ok(i) => Some(&mut self.validators[i]),
            Err(_) => None,
        }
    }

    pub fn proposer(&self) -> Option<&Validator> {
        self.proposer.as_ref().and_then(|a| self.get(a))
    }

    fn update_total(&mut self) {
        self.total_voting_power = self
            .validators
            .iter()
            .fold(0i64, |acc, v| acc.saturating_add(v.voting_power));
    }

    /// Highest priority wins; ties go to the lower address.
    fn find_proposer(&self) -> Option<Address> {
        self.validators
            .iter()
            .max_by(|a, b| {
                a.proposer_priority
                    .cmp(&b.proposer_priority)
                    .then_with(|| b.address.cmp(&a.address))
            })
            .map(|v| v.address)
    }

    /// Shift priorities so they average to zero, keeping them bounded.
    fn center_priorities(&mut self) {
        let n = self.validators.len() as i128;
        if n == 0 {
            return;
        }
        let sum: i128 = self.validators.iter().map(|v| v.proposer_priority as i128).sum();
        let avg = sum.div_euclid(n) as i64;
        for v in &mut self.validators {
            v.proposer_priority = v.proposer_priority.saturating_sub(avg);
        }
    }

    /// Run `times` rounds of priority accumulation.
    pub fn increment_proposer_priority(&mut self, times: u64) {
        if self.validators.is_empty() {
            return;
        }
        self.center_priorities();
        let total = self.total_voting_power;
        for _ in 0..times {
            for v in &mut self.validators {
                v.proposer_priority = v.proposer_priority.saturating_add(v.voting_power);
            }
            if let Some(addr) = self.find_proposer() {
                if let Some(p) = self.get_mut(&addr) {
                    p.proposer_priority = p.proposer_priority.saturating_sub(total);
                }
                self.proposer = Some(addr);
            }
        }
    }

    /// Advance rounds until the proposer changes. No-op for a single
    /// validator.
    ///
    /// While the current proposer `c` keeps winning, its lead over any
    /// other validator `v` shrinks by `total - power(c) + power(v)` per
    /// round. The rounds `c` still wins are computed from those gaps and
    /// applied at once, then one ordinary round hands duty over. The cost
    /// is linear in the set size and independent of voting power.
    pub fn rotate_proposer(&mut self) {
        if self.validators.len() <= 1 {
            return;
        }
        let current = match self.proposer().map(|v| (v.address, v.proposer_priority, v.voting_power)) {
            Some(c) => c,
            None => {
                self.increment_proposer_priority(1);
                return;
            }
        };
        self.center_priorities();
        let (c_addr, _, c_power) = current;
        let c_priority = self.get(&c_addr).map_or(current.1, |v| v.proposer_priority);
        let total = i128::from(self.total_voting_power);

        let mut rounds: Option<i128> = None;
        for v in self.validators.iter().filter(|v| v.address != c_addr) {
            let lead = i128::from(c_priority) - i128::from(v.proposer_priority) + i128::from(c_power)
                - i128::from(v.voting_power);
            let closing = (total - i128::from(c_power) + i128::from(v.voting_power)).max(1);
            // ties go to the lower address
            let k = if v.address < c_addr {
                if lead <= 0 { 0 } else { (lead + closing - 1) / closing }
            } else if lead < 0 {
                0
            } else {
                lead / closing + 1
            };
            rounds = Some(rounds.map_or(k, |r| r.min(k)));
        }

        let k = rounds.unwrap_or(0);
        if k > 0 {
            for v in &mut self.validators {
                let step = if v.address == c_addr {
                    i128::from(v.voting_power) - total
                } else {
                    i128::from(v.voting_power)
                };
                let next = i128::from(v.proposer_priority).saturating_add(k.saturating_mul(step));
                v.proposer_priority = next.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64;
            }
        }
        self.increment_proposer_priority(1);
    }

    /// Insert a newcomer with the join penalty of `-1.125 × total power`.
    pub fn add(&mut self, mut validator: Validator) -> ChainResult<()> {
        if validator.voting_power <= 0 {
            return Err(ChainError::InvalidVotingPower(validator.voting_power));
        }
        let pos = match self.validators.binary_search_by(|v| v.address.cmp(&validator.address)) {
            Ok(_) => return Err(ChainError::ValidatorExists(validator.address.to_hex())),
            Err(pos) => pos,
        };
        let new_total = self.total_voting_power.saturating_add(validator.voting_power);
        validator.proposer_priority = -(new_total.saturating_add(new_total / 8));
        self.validators.insert(pos, validator);
        self.update_total();
        if self.proposer.is_none() {
            self.proposer = self.find_proposer();
        }
        Ok(())
    }

    /// Remove a member; if it was the proposer, the next highest priority
    /// takes over.
    pub fn remove(&mut self, address: &Address) -> Option<Validator> {
        let i = self.validators.binary_search_by(|v| v.address.cmp(address)).ok()?;
        let removed = self.validators.remove(i);
        self.update_total();
        if self.proposer == Some(*address) {
            self.proposer = self.find_proposer();
        }
        Some(removed)
    }

    pub fn set_end_epoch(&mut self, address: &Address, end_epoch: u64) -> ChainResult<()> {
        let v = self
            .get_mut(address)
            .ok_or_else(|| ChainError::ValidatorNotFound(address.to_hex()))?;
        v.end_epoch = end_epoch;
        Ok(())
    }

    pub fn set_signer(&mut self, address: &Address, signer_pubkey: Vec<u8>) -> ChainResult<()> {
        let v = self
            .get_mut(address)
            .ok_or_else(|| ChainError::ValidatorNotFound(address.to_hex()))?;
        v.signer_pubkey = signer_pubkey;
        Ok(())
    }
}
