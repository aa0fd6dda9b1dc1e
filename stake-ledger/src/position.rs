//! Rank balance ledger for a single account
//!
//! [`AccountPosition`] bundles an account's timelock store with its
//! per-rank `{locked, unlocked}` counters. Ranks whose counters are both zero
//! are not stored.

use crate::timelock::{RankTotals, TimelockStore};
use crate::types::{Amount, RankBalance, RankId};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Complete staking state of one account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountPosition {
    /// Live timelock entries
    pub timelocks: TimelockStore,

    /// Per-rank balances (zero balances are absent)
    balances: BTreeMap<RankId, RankBalance>,
}

impl AccountPosition {
    /// Create empty position
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of a rank (zero if absent)
    pub fn balance(&self, rank_id: RankId) -> RankBalance {
        self.balances.get(&rank_id).copied().unwrap_or_default()
    }

    /// Non-zero balances in rank order
    pub fn balances(&self) -> impl Iterator<Item = (RankId, RankBalance)> + '_ {
        self.balances.iter().map(|(rank_id, balance)| (*rank_id, *balance))
    }

    /// Sum of locked and unlocked over all ranks
    pub fn total(&self) -> Amount {
        self.balances.values().map(RankBalance::total).sum()
    }

    /// Nothing staked and no live entries
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty() && self.timelocks.is_empty()
    }

    /// Sum over all ranks, `None` if it leaves the `Decimal` range
    pub fn checked_total(&self) -> Option<Amount> {
        self.balances
            .values()
            .try_fold(Amount::ZERO, |acc, balance| {
                acc.checked_add(balance.locked)?.checked_add(balance.unlocked)
            })
    }

    /// `locked[rank_id] += amount`
    pub fn lock(&mut self, rank_id: RankId, amount: Amount) -> Result<()> {
        self.update(rank_id, |balance| {
            balance.locked = checked_add(balance.locked, amount, rank_id, "locked")?;
            Ok(())
        })
    }

    /// `unlocked[rank_id] += amount`
    pub fn credit_unlocked(&mut self, rank_id: RankId, amount: Amount) -> Result<()> {
        self.update(rank_id, |balance| {
            balance.unlocked = checked_add(balance.unlocked, amount, rank_id, "unlocked")?;
            Ok(())
        })
    }

    /// `unlocked[rank_id] -= amount`
    pub fn debit_unlocked(&mut self, rank_id: RankId, amount: Amount) -> Result<()> {
        self.update(rank_id, |balance| {
            balance.unlocked = checked_sub(balance.unlocked, amount, rank_id, "unlocked")?;
            Ok(())
        })
    }

    /// Move `amount` of a rank from locked to unlocked
    pub fn promote(&mut self, rank_id: RankId, amount: Amount) -> Result<()> {
        self.update(rank_id, |balance| {
            balance.locked = checked_sub(balance.locked, amount, rank_id, "locked")?;
            balance.unlocked = checked_add(balance.unlocked, amount, rank_id, "unlocked")?;
            Ok(())
        })
    }

    /// Promote every per-rank total (output of a timelock removal)
    pub fn promote_totals(&mut self, totals: &RankTotals) -> Result<()> {
        for (rank_id, amount) in totals {
            if !amount.is_zero() {
                self.promote(*rank_id, *amount)?;
            }
        }
        Ok(())
    }

    /// Zero every rank strictly below `rank_id`, returning the summed value
    pub fn take_below(&mut self, rank_id: RankId) -> Amount {
        let upper = self.balances.split_off(&rank_id);
        let lower = std::mem::replace(&mut self.balances, upper);
        lower.values().map(RankBalance::total).sum()
    }

    /// Zero every rank, returning the summed value
    pub fn take_all(&mut self) -> Amount {
        let all = std::mem::take(&mut self.balances);
        all.values().map(RankBalance::total).sum()
    }

    /// Verify `locked[r]` equals the sum of live entries in `r` for every rank
    pub fn check_invariants(&self) -> Result<()> {
        let entry_totals = self.timelocks.totals();

        for (rank_id, balance) in &self.balances {
            if balance.locked < Amount::ZERO || balance.unlocked < Amount::ZERO {
                return Err(Error::InvariantViolation(format!(
                    "Negative balance in rank {}: {:?}",
                    rank_id, balance
                )));
            }
            let in_entries = entry_totals.get(rank_id).copied().unwrap_or_default();
            if balance.locked != in_entries {
                return Err(Error::InvariantViolation(format!(
                    "Rank {} locked {} but timelocks hold {}",
                    rank_id, balance.locked, in_entries
                )));
            }
        }

        for (rank_id, in_entries) in &entry_totals {
            if !self.balances.contains_key(rank_id) && !in_entries.is_zero() {
                return Err(Error::InvariantViolation(format!(
                    "Rank {} has {} in timelocks but no balance",
                    rank_id, in_entries
                )));
            }
        }

        if self.timelocks.iter().any(|entry| entry.amount <= Amount::ZERO) {
            return Err(Error::InvariantViolation(
                "Timelock with non-positive amount".to_string(),
            ));
        }

        Ok(())
    }

    fn update<F>(&mut self, rank_id: RankId, f: F) -> Result<()>
    where
        F: FnOnce(&mut RankBalance) -> Result<()>,
    {
        let mut balance = self.balance(rank_id);
        f(&mut balance)?;

        if balance.is_zero() {
            self.balances.remove(&rank_id);
        } else {
            self.balances.insert(rank_id, balance);
        }
        Ok(())
    }
}

fn checked_sub(current: Amount, amount: Amount, rank_id: RankId, side: &str) -> Result<Amount> {
    if amount > current {
        return Err(Error::InvariantViolation(format!(
            "Rank {} {} balance {} cannot cover {}",
            rank_id, side, current, amount
        )));
    }
    Ok(current - amount)
}

fn checked_add(current: Amount, amount: Amount, rank_id: RankId, side: &str) -> Result<Amount> {
    current.checked_add(amount).ok_or_else(|| {
        Error::AmountOverflow(format!(
            "rank {} {} balance {} + {}",
            rank_id, side, current, amount
        ))
    })
}
