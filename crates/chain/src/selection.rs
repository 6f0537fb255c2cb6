//! Producer Selection Engine
//!
//! Deterministic, externally seeded, stake-weighted producer draws for a
//! span. Two nodes given the same seed and the same eligible list must
//! produce byte-identical output; unpredictability comes from the seed, not
//! from this module.
//!
//! ## Algorithm
//!
//! ```text
//! if len(eligible) <= count: return eligible
//! sort eligible by address
//! for i in 0..count:
//!     rng = ChaCha20(keccak256(seed || i as u64 BE))
//!     r   = rng.gen_range(0..total_power)
//!     pick smallest j with r < cumulative_power[j]
//! aggregate picks: voting_power = number of times drawn
//! sort result by address
//! ```
//!
//! Draws are with replacement, so a validator can be drawn several times;
//! each draw adds one unit of span power.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::collections::BTreeMap;

use bridge_common::crypto::keccak256_concat;
use bridge_common::{Address, Hash};

use crate::error::{ChainError, ChainResult};
use crate::validator::Validator;

#[derive(Debug, Clone, Copy, Default)]
pub struct ProducerSelector;

impl ProducerSelector {
    pub fn new() -> Self {
        Self
    }

    /// Per-draw seed: `keccak256(seed || draw_index)`.
    pub fn draw_seed(seed: &Hash, draw_index: u64) -> [u8; 32] {
        keccak256_concat(&[&seed.0[..], &draw_index.to_be_bytes()[..]]).0
    }

    /// Create the ChaCha20 PRNG for one draw.
    pub fn create_prng(seed: &[u8; 32]) -> ChaCha20Rng {
        ChaCha20Rng::from_seed(*seed)
    }

    /// Smallest index `i` with `random_value < cumulative[i]`.
    pub fn select_by_weight(cumulative: &[u64], random_value: u64) -> Option<usize> {
        cumulative.iter().position(|c| random_value < *c)
    }

    /// Pick `count` producers from `eligible`.
    ///
    /// # Errors
    ///
    /// `SelectionError` when `count == 0`, `eligible` is empty, a voting
    /// power is non-positive, or the power sum overflows.
    pub fn select_producers(&self, seed: &Hash, eligible: &[Validator], count: u32) -> ChainResult<Vec<Validator>> {
        if count == 0 {
            return Err(ChainError::SelectionError("producer count is zero".into()));
        }
        if eligible.is_empty() {
            return Err(ChainError::SelectionError("no eligible validators".into()));
        }
        if eligible.len() <= count as usize {
            return Ok(eligible.to_vec());
        }

        let mut sorted: Vec<&Validator> = eligible.iter().collect();
        sorted.sort_by(|a, b| a.address.cmp(&b.address));

        let mut cumulative = Vec::with_capacity(sorted.len());
        let mut total: u64 = 0;
        for v in &sorted {
            if v.voting_power <= 0 {
                return Err(ChainError::SelectionError(format!(
                    "validator {} has non-positive power {}",
                    v.address, v.voting_power
                )));
            }
            total = total
                .checked_add(v.voting_power as u64)
                .ok_or_else(|| ChainError::SelectionError("total voting power overflow".into()))?;
            cumulative.push(total);
        }

        let mut draws: BTreeMap<Address, (usize, i64)> = BTreeMap::new();
        for i in 0..u64::from(count) {
            let mut rng = Self::create_prng(&Self::draw_seed(seed, i));
            let r = rng.gen_range(0..total);
            let idx = Self::select_by_weight(&cumulative, r)
                .ok_or_else(|| ChainError::SelectionError(format!("draw {} out of range", r)))?;
            let entry = draws.entry(sorted[idx].address).or_insert((idx, 0));
            entry.1 += 1;
        }

        // BTreeMap iteration is already address-ascending.
        Ok(draws
            .into_values()
            .map(|(idx, n)| {
                let mut v = sorted[idx].clone();
                v.voting_power = n;
                v
            })
            .collect())
    }
}
