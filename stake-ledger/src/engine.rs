//! Staking algorithms over a single [`AccountPosition`]
//!
//! These functions are pure bookkeeping: they never touch storage or
//! tokens, and they assume the caller has already validated the request
//! against the registry (positive amount, rank in range, not frozen). The
//! [`Ledger`](crate::Ledger) applies them to a staged copy of the position
//! and only commits once every step, including the token calls, succeeded.
//!
//! # Invariants
//!
//! - `locked[r]` equals the sum of live timelocks in `r`
//! - No algorithm except withdrawals changes the position total

use crate::position::AccountPosition;
use crate::timelock::RankTotals;
use crate::types::{Amount, Rank, RankId, TimelockEntry, Timestamp};
use crate::{Error, Result};

/// Which pre-step a deposit took before recording its own timelock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepositPath {
    /// Rank goal reached: every lower-rank timelock was released
    GoalReached {
        /// Released amounts per rank
        released: RankTotals,
    },

    /// Lower-rank balances were folded into the target rank
    Consolidated(Consolidation),

    /// Deposit recorded as is
    Plain,
}

/// Result of a consolidation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consolidation {
    /// Value pulled out of lower ranks
    pub absorbed: Amount,

    /// Part of `absorbed` relocked at the target rank
    pub relocked: Amount,

    /// Part of `absorbed` credited straight to `unlocked[target]`
    pub released: Amount,
}

/// Record a deposit of `amount` into `rank_id`.
///
/// When the deposit brings the rank to its goal, every lower-rank timelock
/// is released first; that check wins over `consolidate`. Otherwise, with
/// `consolidate` set and a rank above zero, lower ranks are folded in.
///
/// Fails with [`Error::TooManyDeposits`] when the resulting position would
/// hold more than `max_timelocks` entries, and with
/// [`Error::AmountOverflow`] when the account total would leave the
/// `Decimal` range. Once the total fits, every partial sum does too.
pub fn deposit(
    position: &mut AccountPosition,
    amount: Amount,
    rank_id: RankId,
    rank: &Rank,
    consolidate_lower: bool,
    now: Timestamp,
    max_timelocks: usize,
) -> Result<DepositPath> {
    position
        .checked_total()
        .and_then(|total| total.checked_add(amount))
        .ok_or_else(|| {
            Error::AmountOverflow(format!("deposit of {} into rank {}", amount, rank_id))
        })?;

    let balance = position.balance(rank_id);
    let reached = balance.total() + amount;

    let path = if reached >= rank.goal_amount {
        DepositPath::GoalReached {
            released: unlock_below_rank(position, rank_id)?,
        }
    } else if consolidate_lower && rank_id > 0 {
        match consolidate(position, amount, rank_id, rank, now)? {
            Some(consolidation) => DepositPath::Consolidated(consolidation),
            None => DepositPath::Plain,
        }
    } else {
        DepositPath::Plain
    };

    position.timelocks.push(TimelockEntry {
        expires_at: rank.expiry_from(now)?,
        amount,
        rank_id,
    });
    position.lock(rank_id, amount)?;

    if position.timelocks.len() > max_timelocks {
        return Err(Error::TooManyDeposits {
            live: position.timelocks.len(),
            max: max_timelocks,
        });
    }

    tracing::debug!(rank_id, amount = %amount, path = ?path, "Deposit staged");

    Ok(path)
}

/// Withdraw `amount` from the unlocked balance of `rank_id`.
///
/// Matured timelocks count towards the available balance; they are swept
/// (in every rank) before the debit.
pub fn withdraw(
    position: &mut AccountPosition,
    amount: Amount,
    rank_id: RankId,
    now: Timestamp,
) -> Result<()> {
    let available = position
        .balance(rank_id)
        .unlocked
        .checked_add(view_expired(position, rank_id, now))
        .ok_or_else(|| Error::AmountOverflow(format!("available balance of rank {}", rank_id)))?;
    if available < amount {
        return Err(Error::InsufficientBalance {
            rank_id,
            available,
            required: amount,
        });
    }

    sweep_expired(position, now)?;
    position.debit_unlocked(rank_id, amount)
}

/// Promote every matured timelock to unlocked. Idempotent.
pub fn sweep_expired(position: &mut AccountPosition, now: Timestamp) -> Result<RankTotals> {
    let matured = position.timelocks.remove_expired(now);
    position.promote_totals(&matured)?;

    if !matured.is_empty() {
        tracing::debug!(ranks = matured.len(), "Swept matured timelocks");
    }

    Ok(matured)
}

/// Release every timelock below `rank_id`, regardless of expiry.
///
/// A promotion: amounts move from locked to unlocked, nothing is burned.
pub fn unlock_below_rank(position: &mut AccountPosition, rank_id: RankId) -> Result<RankTotals> {
    let released = position.timelocks.remove_below(rank_id);
    position.promote_totals(&released)?;
    Ok(released)
}

/// Fold every balance below `rank_id` into one new timelock at `rank_id`.
///
/// The shortfall is measured against the goal with the incoming `amount`
/// already subtracted, but before the deposit itself is booked. Whatever
/// exceeds the shortfall goes straight to `unlocked[rank_id]`.
///
/// Returns `None` when there is nothing below `rank_id`.
pub fn consolidate(
    position: &mut AccountPosition,
    amount: Amount,
    rank_id: RankId,
    rank: &Rank,
    now: Timestamp,
) -> Result<Option<Consolidation>> {
    let balance = position.balance(rank_id);
    let gap = balance
        .total()
        .checked_add(amount)
        .and_then(|reached| rank.goal_amount.checked_sub(reached))
        .ok_or_else(|| {
            Error::AmountOverflow(format!("consolidation gap of rank {}", rank_id))
        })?;
    if gap <= Amount::ZERO {
        return Err(Error::InvariantViolation(format!(
            "Consolidation into rank {} with goal already met",
            rank_id
        )));
    }

    let absorbed = position.take_below(rank_id);
    if absorbed.is_zero() {
        return Ok(None);
    }

    // Balances below were zeroed above; the entries only need dropping.
    position.timelocks.remove_below(rank_id);

    let (relocked, released) = if absorbed > gap {
        (gap, absorbed - gap)
    } else {
        (absorbed, Amount::ZERO)
    };

    position.timelocks.push(TimelockEntry {
        expires_at: rank.expiry_from(now)?,
        amount: relocked,
        rank_id,
    });
    position.lock(rank_id, relocked)?;
    if !released.is_zero() {
        position.credit_unlocked(rank_id, released)?;
    }

    Ok(Some(Consolidation {
        absorbed,
        relocked,
        released,
    }))
}

/// Zero the whole position, returning the amount to pay out.
pub fn emergency_withdraw(position: &mut AccountPosition) -> Result<Amount> {
    let total = position.take_all();
    if total.is_zero() {
        return Err(Error::NonPositiveAmount);
    }
    position.timelocks.clear();
    Ok(total)
}

/// Matured but unswept amount in `rank_id`
pub fn view_expired(position: &AccountPosition, rank_id: RankId, now: Timestamp) -> Amount {
    position.timelocks.expired_in_rank(rank_id, now)
}
