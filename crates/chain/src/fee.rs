//! Fee ledger and its Merkle commitment.
//!
//! Balances accrue per account ("dividend accounts"). At checkpoint time the
//! whole ledger is committed into a Merkle tree so the base chain can verify
//! a withdrawal against the anchored root alone.
//!
//! Tree rules:
//! - leaf  = keccak256(address_bytes || decimal_amount_bytes)
//! - node  = keccak256(left || right)
//! - leaves ordered by address; an odd node at any level pairs with itself
//! - empty ledger root = zero hash

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use bridge_common::crypto::keccak256_concat;
use bridge_common::{Address, FeeAmount, Hash};

use crate::error::{ChainError, ChainResult};
use crate::keys::{dividend_account_key, topup_sequence_key, DIVIDEND_ACCOUNT_PREFIX, FEE_COMMITMENT_KEY};
use crate::store::{decode, get_record, put_record, ReadStore, WriteStore};

/// Persisted balance. The amount is kept in decimal string form on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DividendAccount {
    pub address: Address,
    pub fee_amount: String,
}

impl DividendAccount {
    pub fn amount(&self) -> ChainResult<FeeAmount> {
        FeeAmount::from_str_radix(&self.fee_amount, 10)
            .map_err(|e| ChainError::Codec(format!("stored fee amount {:?}: {}", self.fee_amount, e)))
    }
}

/// Snapshot of the ledger at commit time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeCommitment {
    pub root: Hash,
    /// `(address, decimal amount)` in leaf order
    pub accounts: Vec<(Address, String)>,
    pub height: u64,
}

/// Inclusion proof for one account against the latest commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProof {
    pub address: Address,
    pub fee_amount: String,
    pub leaf: Hash,
    pub index: u64,
    pub proof: Vec<Hash>,
    pub root: Hash,
}

/// Parse a wire amount.
///
/// # Errors
///
/// - `NegativeAmount` for a leading `-`
/// - `InvalidAmount` for anything that is not a decimal integer
/// - `AmountOverflow` when the value does not fit in 256 bits
pub fn parse_fee_amount(s: &str) -> ChainResult<FeeAmount> {
    let s = s.trim();
    if s.starts_with('-') {
        return Err(ChainError::NegativeAmount(s.to_string()));
    }
    let digits = s.strip_prefix('+').unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ChainError::InvalidAmount(s.to_string()));
    }
    FeeAmount::from_str_radix(digits, 10).map_err(|_| ChainError::AmountOverflow(s.to_string()))
}

// ════════════════════════════════════════════════════════════════════════════
// MERKLE TREE
// ════════════════════════════════════════════════════════════════════════════

pub fn leaf_hash(address: &Address, amount: &str) -> Hash {
    keccak256_concat(&[&address.0[..], amount.as_bytes()])
}

fn node_hash(left: &Hash, right: &Hash) -> Hash {
    keccak256_concat(&[&left.0[..], &right.0[..]])
}

/// All tree levels, leaves first, root level last.
fn build_levels(leaves: Vec<Hash>) -> Vec<Vec<Hash>> {
    let mut levels = vec![leaves];
    while levels.last().map_or(false, |l| l.len() > 1) {
        let current = &levels[levels.len() - 1];
        let next: Vec<Hash> = current
            .chunks(2)
            .map(|pair| match pair {
                [l, r] => node_hash(l, r),
                [single] => node_hash(single, single),
                _ => Hash::ZERO,
            })
            .collect();
        levels.push(next);
    }
    levels
}

pub fn merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return Hash::ZERO;
    }
    build_levels(leaves.to_vec())
        .last()
        .and_then(|l| l.first().copied())
        .unwrap_or(Hash::ZERO)
}

/// Sibling path for `index`, bottom-up. `None` if out of range.
pub fn merkle_proof(leaves: &[Hash], index: usize) -> Option<Vec<Hash>> {
    if index >= leaves.len() {
        return None;
    }
    let levels = build_levels(leaves.to_vec());
    let mut proof = Vec::with_capacity(levels.len().saturating_sub(1));
    let mut idx = index;
    for level in &levels[..levels.len() - 1] {
        let sibling = if idx % 2 == 0 {
            // odd tail pairs with itself
            level.get(idx + 1).unwrap_or(&level[idx])
        } else {
            &level[idx - 1]
        };
        proof.push(*sibling);
        idx /= 2;
    }
    Some(proof)
}

/// Verifier side: even index means the running hash is the left child.
pub fn verify_inclusion(leaf: &Hash, proof: &[Hash], index: u64, root: &Hash) -> bool {
    let mut current = *leaf;
    let mut idx = index;
    for sibling in proof {
        current = if idx & 1 == 0 {
            node_hash(&current, sibling)
        } else {
            node_hash(sibling, &current)
        };
        idx >>= 1;
    }
    current == *root
}

// ════════════════════════════════════════════════════════════════════════════
// LEDGER
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default)]
pub struct FeeLedger;

impl FeeLedger {
    pub fn new() -> Self {
        Self
    }

    pub fn get_dividend_account<S: ReadStore + ?Sized>(&self, store: &S, address: &Address) -> ChainResult<Option<DividendAccount>> {
        get_record(store, &dividend_account_key(address))
    }

    /// Every account in address order.
    pub fn get_all_dividend_accounts<S: ReadStore>(&self, store: &S) -> ChainResult<Vec<DividendAccount>> {
        store
            .prefix_iter(DIVIDEND_ACCOUNT_PREFIX)
            .map(|r| decode(&r?.1))
            .collect()
    }

    pub fn balance<S: ReadStore + ?Sized>(&self, store: &S, address: &Address) -> ChainResult<FeeAmount> {
        match self.get_dividend_account(store, address)? {
            Some(acc) => acc.amount(),
            None => Ok(FeeAmount::ZERO),
        }
    }

    pub fn has_topup_sequence<S: ReadStore + ?Sized>(&self, store: &S, sequence: &str) -> ChainResult<bool> {
        Ok(store.has(&topup_sequence_key(sequence))?)
    }

    /// Credit `amount` to `address`, creating the account if needed.
    ///
    /// A `sequence` (base-chain `tx_hash:log_index`) is recorded and may
    /// only be credited once.
    pub fn add_fee<S: WriteStore + ?Sized>(
        &self,
        store: &mut S,
        address: Address,
        amount: FeeAmount,
        sequence: Option<&str>,
    ) -> ChainResult<FeeAmount> {
        if let Some(seq) = sequence {
            if self.has_topup_sequence(store, seq)? {
                return Err(ChainError::DuplicateTopupSequence(seq.to_string()));
            }
        }
        let balance = self
            .balance(store, &address)?
            .checked_add(amount)
            .ok_or_else(|| ChainError::AmountOverflow(address.to_hex()))?;

        let account = DividendAccount {
            address,
            fee_amount: balance.to_string(),
        };
        put_record(store, &dividend_account_key(&address), &account)?;
        if let Some(seq) = sequence {
            store.set(&topup_sequence_key(seq), vec![1]);
        }
        debug!(account = %address, amount = %amount, balance = %balance, "fee added");
        Ok(balance)
    }

    /// Debit a withdrawal recorded on the base chain. A zero `amount`
    /// withdraws the whole balance. Returns the amount debited.
    ///
    /// # Errors
    ///
    /// - `AccountNotFound` if the account has never been credited
    /// - `InsufficientBalance` if `amount` exceeds the balance
    pub fn withdraw_fee<S: WriteStore + ?Sized>(&self, store: &mut S, address: Address, amount: FeeAmount) -> ChainResult<FeeAmount> {
        let account = self
            .get_dividend_account(store, &address)?
            .ok_or_else(|| ChainError::AccountNotFound(address.to_hex()))?;
        let balance = account.amount()?;
        let debit = if amount.is_zero() { balance } else { amount };
        let remaining = balance.checked_sub(debit).ok_or_else(|| ChainError::InsufficientBalance {
            account: address.to_hex(),
            balance: balance.to_string(),
            requested: debit.to_string(),
        })?;

        let account = DividendAccount {
            address,
            fee_amount: remaining.to_string(),
        };
        put_record(store, &dividend_account_key(&address), &account)?;
        info!(account = %address, withdrawn = %debit, balance = %remaining, "fee withdrawn");
        Ok(debit)
    }

    /// Build a fresh tree over every account and persist it as the latest
    /// commitment. Balances are not touched.
    pub fn commit_snapshot<S: WriteStore>(&self, store: &mut S, height: u64) -> ChainResult<Hash> {
        let accounts: Vec<(Address, String)> = self
            .get_all_dividend_accounts(&*store)?
            .into_iter()
            .map(|a| (a.address, a.fee_amount))
            .collect();
        let leaves: Vec<Hash> = accounts.iter().map(|(a, amt)| leaf_hash(a, amt)).collect();
        let root = merkle_root(&leaves);

        let commitment = FeeCommitment { root, accounts, height };
        put_record(store, FEE_COMMITMENT_KEY, &commitment)?;
        info!(height, root = %root, accounts = commitment.accounts.len(), "fee snapshot committed");
        Ok(root)
    }

    pub fn latest_commitment<S: ReadStore + ?Sized>(&self, store: &S) -> ChainResult<Option<FeeCommitment>> {
        get_record(store, FEE_COMMITMENT_KEY)
    }

    /// Root of the latest commitment (zero hash before the first one).
    pub fn fee_root<S: ReadStore + ?Sized>(&self, store: &S) -> ChainResult<Hash> {
        Ok(self.latest_commitment(store)?.map(|c| c.root).unwrap_or(Hash::ZERO))
    }

    /// Proof for `address` against the latest commitment.
    pub fn prove_inclusion<S: ReadStore + ?Sized>(&self, store: &S, address: &Address) -> ChainResult<AccountProof> {
        let not_found = || ChainError::AccountNotFound(address.to_hex());
        let commitment = self.latest_commitment(store)?.ok_or_else(not_found)?;
        let index = commitment
            .accounts
            .binary_search_by(|(a, _)| a.cmp(address))
            .map_err(|_| not_found())?;

        let leaves: Vec<Hash> = commitment.accounts.iter().map(|(a, amt)| leaf_hash(a, amt)).collect();
        let proof = merkle_proof(&leaves, index).ok_or_else(not_found)?;
        Ok(AccountProof {
            address: *address,
            fee_amount: commitment.accounts[index].1.clone(),
            leaf: leaves[index],
            index: index as u64,
            proof,
            root: commitment.root,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_common::crypto::keccak256;
    use crate::store::{CacheStore, CommitStore, MemStore};

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 20])
    }

    fn h(b: u8) -> Hash {
        keccak256(&[b])
    }

    #[test]
    fn test_parse_fee_amount() {
        assert_eq!(parse_fee_amount("150").unwrap(), FeeAmount::from(150u64));
        assert_eq!(parse_fee_amount(" 0 ").unwrap(), FeeAmount::ZERO);
        assert!(matches!(parse_fee_amount("-1"), Err(ChainError::NegativeAmount(_))));
        assert!(matches!(parse_fee_amount("12a"), Err(ChainError::InvalidAmount(_))));
        assert!(matches!(parse_fee_amount(""), Err(ChainError::InvalidAmount(_))));
        let too_big = "1".repeat(80);
        assert!(matches!(parse_fee_amount(&too_big), Err(ChainError::AmountOverflow(_))));
    }

    #[test]
    fn test_merkle_shapes() {
        assert_eq!(merkle_root(&[]), Hash::ZERO);
        assert_eq!(merkle_root(&[h(1)]), h(1));
        assert_eq!(merkle_root(&[h(1), h(2)]), node_hash(&h(1), &h(2)));
        let three = merkle_root(&[h(1), h(2), h(3)]);
        assert_eq!(three, node_hash(&node_hash(&h(1), &h(2)), &node_hash(&h(3), &h(3))));
    }

    #[test]
    fn test_every_proof_verifies() {
        for n in 1..=9u8 {
            let leaves: Vec<Hash> = (0..n).map(h).collect();
            let root = merkle_root(&leaves);
            for i in 0..n as usize {
                let proof = merkle_proof(&leaves, i).unwrap();
                assert!(verify_inclusion(&leaves[i], &proof, i as u64, &root), "n={} i={}", n, i);
            }
            assert!(merkle_proof(&leaves, n as usize).is_none());
        }
    }

    #[test]
    fn test_tampered_proof_fails() {
        let leaves: Vec<Hash> = (0..4).map(h).collect();
        let root = merkle_root(&leaves);
        let proof = merkle_proof(&leaves, 1).unwrap();
        assert!(!verify_inclusion(&leaves[1], &proof, 0, &root));
        assert!(!verify_inclusion(&h(99), &proof, 1, &root));
    }

    #[test]
    fn test_add_fee_accumulates_and_dedupes() {
        let store = MemStore::new();
        let snap = store.snapshot().unwrap();
        let mut c = CacheStore::new(&snap);
        let ledger = FeeLedger::new();

        ledger.add_fee(&mut c, addr(1), FeeAmount::from(100u64), Some("0xabc:1")).unwrap();
        assert!(matches!(
            ledger.add_fee(&mut c, addr(1), FeeAmount::from(100u64), Some("0xabc:1")),
            Err(ChainError::DuplicateTopupSequence(_))
        ));
        let bal = ledger.add_fee(&mut c, addr(1), FeeAmount::from(50u64), None).unwrap();
        assert_eq!(bal, FeeAmount::from(150u64));
        assert_eq!(ledger.get_dividend_account(&c, &addr(1)).unwrap().unwrap().fee_amount, "150");

        assert!(matches!(
            ledger.add_fee(&mut c, addr(1), FeeAmount::MAX, None),
            Err(ChainError::AmountOverflow(_))
        ));
    }

    #[test]
    fn test_commit_is_idempotent_and_proofs_use_snapshot() {
        let store = MemStore::new();
        let snap = store.snapshot().unwrap();
        let mut c = CacheStore::new(&snap);
        let ledger = FeeLedger::new();
        assert_eq!(ledger.fee_root(&c).unwrap(), Hash::ZERO);
        assert!(matches!(ledger.prove_inclusion(&c, &addr(1)), Err(ChainError::AccountNotFound(_))));

        for b in [3u8, 1, 2] {
            ledger.add_fee(&mut c, addr(b), FeeAmount::from(b as u64 * 10), None).unwrap();
        }
        let r1 = ledger.commit_snapshot(&mut c, 10).unwrap();
        let r2 = ledger.commit_snapshot(&mut c, 11).unwrap();
        assert_eq!(r1, r2);
        assert_eq!(ledger.balance(&c, &addr(2)).unwrap(), FeeAmount::from(20u64));

        // an account added after the commit is not provable yet
        ledger.add_fee(&mut c, addr(4), FeeAmount::from(1u64), None).unwrap();
        assert!(matches!(ledger.prove_inclusion(&c, &addr(4)), Err(ChainError::AccountNotFound(_))));

        let p = ledger.prove_inclusion(&c, &addr(2)).unwrap();
        assert_eq!(p.index, 1);
        assert_eq!(p.leaf, leaf_hash(&addr(2), "20"));
        assert!(verify_inclusion(&p.leaf, &p.proof, p.index, &p.root));
        assert_eq!(p.root, r1);
    }

    #[test]
    fn test_withdraw_debits_and_rejects_overdraw() {
        let store = MemStore::new();
        let snap = store.snapshot().unwrap();
        let mut c = CacheStore::new(&snap);
        let ledger = FeeLedger::new();

        assert!(matches!(
            ledger.withdraw_fee(&mut c, addr(1), FeeAmount::from(1u64)),
            Err(ChainError::AccountNotFound(_))
        ));
        ledger.add_fee(&mut c, addr(1), FeeAmount::from(100u64), None).unwrap();
        assert!(matches!(
            ledger.withdraw_fee(&mut c, addr(1), FeeAmount::from(101u64)),
            Err(ChainError::InsufficientBalance { .. })
        ));
        assert_eq!(ledger.balance(&c, &addr(1)).unwrap(), FeeAmount::from(100u64));

        let debited = ledger.withdraw_fee(&mut c, addr(1), FeeAmount::from(30u64)).unwrap();
        assert_eq!(debited, FeeAmount::from(30u64));
        assert_eq!(ledger.balance(&c, &addr(1)).unwrap(), FeeAmount::from(70u64));

        // zero withdraws everything; the account stays with a zero balance
        let debited = ledger.withdraw_fee(&mut c, addr(1), FeeAmount::ZERO).unwrap();
        assert_eq!(debited, FeeAmount::from(70u64));
        assert_eq!(ledger.get_dividend_account(&c, &addr(1)).unwrap().unwrap().fee_amount, "0");
        ledger.add_fee(&mut c, addr(1), FeeAmount::from(5u64), None).unwrap();
        assert_eq!(ledger.balance(&c, &addr(1)).unwrap(), FeeAmount::from(5u64));
    }
}
