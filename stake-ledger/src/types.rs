//! Core types for the staking ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (Decimal for token amounts)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Token amount (exact decimal, never negative)
pub type Amount = Decimal;

/// Rank identifier, `0..num_of_ranks`
pub type RankId = u64;

/// Point in time at which a timelock matures
pub type Timestamp = DateTime<Utc>;

/// Account identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create new account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rank definition owned by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rank {
    /// Cumulative stake at which lower ranks are released
    pub goal_amount: Amount,

    /// Lock duration applied to deposits into this rank
    pub min_duration: Duration,
}

impl Rank {
    /// Create new rank
    pub fn new(goal_amount: Amount, min_duration: Duration) -> Self {
        Self {
            goal_amount,
            min_duration,
        }
    }

    /// Expiry of a lock created at `now` in this rank
    pub fn expiry_from(&self, now: Timestamp) -> crate::Result<Timestamp> {
        chrono::Duration::from_std(self.min_duration)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .ok_or_else(|| {
                crate::Error::InvariantViolation(format!(
                    "Lock expiry overflows: {} + {:?}",
                    now, self.min_duration
                ))
            })
    }
}

/// One deposit's amount, rank and expiry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelockEntry {
    /// Matures once `now >= expires_at`
    pub expires_at: Timestamp,

    /// Locked amount
    pub amount: Amount,

    /// Rank the amount is locked in
    pub rank_id: RankId,
}

impl TimelockEntry {
    /// Check if entry has matured at `now`
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at <= now
    }
}

/// Per-account, per-rank balance pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankBalance {
    /// Amount held by live timelocks (may include matured, unswept amounts)
    pub locked: Amount,

    /// Freely withdrawable amount
    pub unlocked: Amount,
}

impl RankBalance {
    /// `locked + unlocked`
    pub fn total(&self) -> Amount {
        self.locked + self.unlocked
    }

    /// Both counters are zero
    pub fn is_zero(&self) -> bool {
        self.locked.is_zero() && self.unlocked.is_zero()
    }
}

/// Observable ledger event, emitted once per successful top-level operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Unique event ID (UUIDv7 for time-ordering)
    pub event_id: Uuid,

    /// Type of event
    pub event_type: EventType,

    /// Account the operation was performed for
    pub account: AccountId,

    /// Amount of receipt token minted or burned
    pub amount: Amount,

    /// Event timestamp (nanoseconds since Unix epoch)
    pub timestamp_nanos: i64,
}

impl LedgerEvent {
    /// Create event stamped at `now`
    pub fn new(event_type: EventType, account: AccountId, amount: Amount, now: Timestamp) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            event_type,
            account,
            amount,
            timestamp_nanos: now.timestamp_nanos_opt().unwrap_or(0),
        }
    }
}

/// Event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventType {
    /// Base token locked, receipt token minted
    Deposit = 1,
    /// Receipt token burned, base token returned
    Withdraw = 2,
    /// Frozen-state exit of the whole stake
    EmergencyWithdraw = 3,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Deposit => write!(f, "Deposit"),
            EventType::Withdraw => write!(f, "Withdraw"),
            EventType::EmergencyWithdraw => write!(f, "EmergencyWithdraw"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_expiry() {
        let rank = Rank::new(Decimal::from(100), Duration::from_secs(3600));
        let now = Utc::now();
        let expiry = rank.expiry_from(now).unwrap();
        assert_eq!((expiry - now).num_seconds(), 3600);
    }

    #[test]
    fn test_rank_expiry_overflow() {
        let rank = Rank::new(Decimal::from(100), Duration::from_secs(u64::MAX));
        assert!(rank.expiry_from(Utc::now()).is_err());
    }

    #[test]
    fn test_entry_expired_at_boundary() {
        let now = Utc::now();
        let entry = TimelockEntry {
            expires_at: now,
            amount: Decimal::from(5),
            rank_id: 0,
        };
        assert!(entry.is_expired(now));
        assert!(!entry.is_expired(now - chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_rank_balance_total() {
        let balance = RankBalance {
            locked: Decimal::from(80),
            unlocked: Decimal::from(20),
        };
        assert_eq!(balance.total(), Decimal::from(100));
        assert!(!balance.is_zero());
        assert!(RankBalance::default().is_zero());
    }
}
