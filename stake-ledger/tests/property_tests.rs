//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Conservation: stake == receipt balance == custody balance
//! - Idempotent sweep: a second sweep at the same instant changes nothing
//! - Entry cap: never more than 64 live timelocks
//! - Swap-remove: every matching entry removed, every other entry kept

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use stake_ledger::{
    engine,
    timelock::TimelockStore,
    AccountId, AccountPosition, BaseToken, Collaborators, Config, InMemoryRegistry, InMemoryToken,
    Ledger, ManualClock, Rank, ReceiptToken, TimelockEntry,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const DAY: u64 = 86_400;
const INITIAL_BASE: i64 = 1_000_000;

/// Operation applied to the ledger
#[derive(Debug, Clone)]
enum Op {
    Deposit {
        amount: u32,
        rank_id: u64,
        consolidate: bool,
    },
    Withdraw {
        amount: u32,
        rank_id: u64,
    },
    Advance {
        hours: u32,
    },
    Sweep,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (1u32..400, 0u64..3, any::<bool>()).prop_map(|(amount, rank_id, consolidate)| {
            Op::Deposit {
                amount,
                rank_id,
                consolidate,
            }
        }),
        2 => (1u32..400, 0u64..3).prop_map(|(amount, rank_id)| Op::Withdraw { amount, rank_id }),
        2 => (1u32..96).prop_map(|hours| Op::Advance { hours }),
        1 => Just(Op::Sweep),
    ]
}

/// Strategy for generating valid amounts (positive decimals)
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1u64..1_000_00u64).prop_map(|cents| Decimal::new(cents as i64, 2))
}

fn entry_strategy() -> impl Strategy<Value = TimelockEntry> {
    (0i64..100, amount_strategy(), 0u64..4).prop_map(|(hours, amount, rank_id)| TimelockEntry {
        expires_at: epoch() + ChronoDuration::hours(hours),
        amount,
        rank_id,
    })
}

fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

fn ranks() -> Vec<Rank> {
    vec![
        Rank::new(Decimal::from(500), Duration::from_secs(DAY)),
        Rank::new(Decimal::from(1_000), Duration::from_secs(3 * DAY)),
        Rank::new(Decimal::from(2_000), Duration::from_secs(7 * DAY)),
    ]
}

struct TestLedger {
    ledger: Ledger,
    registry: Arc<InMemoryRegistry>,
    receipt: Arc<InMemoryToken>,
    base: Arc<InMemoryToken>,
    clock: Arc<ManualClock>,
    _dir: tempfile::TempDir,
}

/// Create test ledger with temp directory
fn create_test_ledger() -> TestLedger {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();

    let receipt = Arc::new(InMemoryToken::new("sTKN"));
    let base = Arc::new(InMemoryToken::new("TKN"));
    base.credit(&AccountId::new("alice"), Decimal::from(INITIAL_BASE)).unwrap();
    let clock = Arc::new(ManualClock::new(epoch()));
    let registry = Arc::new(InMemoryRegistry::with_ranks(ranks()).unwrap());

    let ledger = Ledger::open(
        config,
        Collaborators {
            registry: registry.clone(),
            receipt: receipt.clone(),
            base: base.clone(),
            clock: clock.clone(),
        },
    )
    .unwrap();

    TestLedger {
        ledger,
        registry,
        receipt,
        base,
        clock,
        _dir: temp_dir,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: stake, receipt supply and custody balance move together
    #[test]
    fn prop_conservation(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let mut t = create_test_ledger();
        let alice = AccountId::new("alice");

        for op in ops {
            let before = t.ledger.position(&alice).unwrap();
            let result = match op {
                Op::Deposit { amount, rank_id, consolidate } => t
                    .ledger
                    .deposit(&alice, Decimal::from(amount), rank_id, consolidate)
                    .map(|_| ()),
                Op::Withdraw { amount, rank_id } => t
                    .ledger
                    .withdraw(&alice, Decimal::from(amount), rank_id)
                    .map(|_| ()),
                Op::Advance { hours } => {
                    t.clock.advance(Duration::from_secs(u64::from(hours) * 3_600));
                    Ok(())
                }
                Op::Sweep => t.ledger.sweep_expired(&alice).map(|_| ()),
            };

            let position = t.ledger.position(&alice).unwrap();
            if result.is_err() {
                prop_assert_eq!(&position, &before);
            }

            position.check_invariants().unwrap();
            prop_assert!(position.timelocks.len() <= 64);

            let staked = position.total();
            prop_assert_eq!(staked, ReceiptToken::balance_of(&*t.receipt, &alice));
            prop_assert_eq!(
                staked,
                BaseToken::balance_of(&*t.base, t.ledger.custody_account())
            );
            prop_assert_eq!(t.base.total_supply(), Decimal::from(INITIAL_BASE));
        }

        prop_assert!(t.ledger.check_conservation(&alice).unwrap());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: sweeping twice at the same instant is a no-op the second time
    #[test]
    fn prop_sweep_idempotent(
        deposits in prop::collection::vec((amount_strategy(), 0u64..3, 0i64..240), 1..40),
        sweep_at in 0i64..400,
    ) {
        let ranks = ranks();
        let mut position = AccountPosition::new();

        for (amount, rank_id, hours) in deposits {
            let now = epoch() + ChronoDuration::hours(hours);
            let rank = &ranks[rank_id as usize];
            let mut staged = position.clone();
            if engine::deposit(&mut staged, amount, rank_id, rank, false, now, 64).is_ok() {
                position = staged;
            }
        }

        let now = epoch() + ChronoDuration::hours(sweep_at);
        let total = position.total();

        engine::sweep_expired(&mut position, now).unwrap();
        let once = position.clone();
        let second = engine::sweep_expired(&mut position, now).unwrap();

        prop_assert!(second.is_empty());
        prop_assert_eq!(&position, &once);
        prop_assert_eq!(position.total(), total);
        prop_assert!(position.timelocks.iter().all(|entry| !entry.is_expired(now)));
        position.check_invariants().unwrap();
    }

    /// Property: successful deposits stop at the entry cap
    #[test]
    fn prop_entry_cap(count in 1usize..90) {
        let rank = Rank::new(Decimal::from(1_000_000), Duration::from_secs(30 * DAY));
        let mut position = AccountPosition::new();
        let mut accepted = 0usize;

        for _ in 0..count {
            let mut staged = position.clone();
            match engine::deposit(&mut staged, Decimal::ONE, 0, &rank, false, epoch(), 64) {
                Ok(_) => {
                    position = staged;
                    accepted += 1;
                }
                Err(e) => prop_assert!(matches!(
                    e,
                    stake_ledger::Error::TooManyDeposits { live: 65, max: 64 }
                ), "expected TooManyDeposits {{ live: 65, max: 64 }}, got {:?}", e),
            }
        }

        prop_assert_eq!(accepted, count.min(64));
        prop_assert_eq!(position.timelocks.len(), count.min(64));
        prop_assert_eq!(position.total(), Decimal::from(count.min(64) as u64));
    }

    /// Property: swap-remove examines every entry exactly once
    #[test]
    fn prop_remove_visits_every_entry(
        entries in prop::collection::vec(entry_strategy(), 0..64),
        cutoff in 0i64..100,
    ) {
        let now = epoch() + ChronoDuration::hours(cutoff);
        let mut store = TimelockStore::new();
        let mut expected = BTreeMap::new();
        let mut kept = 0usize;
        for entry in entries {
            if entry.is_expired(now) {
                *expected.entry(entry.rank_id).or_insert(Decimal::ZERO) += entry.amount;
            } else {
                kept += 1;
            }
            store.push(entry);
        }

        let mut visits = 0usize;
        let original_len = store.len();
        let removed = store.remove_where(|entry| {
            visits += 1;
            entry.is_expired(now)
        });

        prop_assert_eq!(visits, original_len);
        prop_assert_eq!(removed, expected);
        prop_assert_eq!(store.len(), kept);
        prop_assert!(store.iter().all(|entry| !entry.is_expired(now)));
    }

    /// Property: a deposit raises the position total by exactly its amount
    #[test]
    fn prop_deposit_adds_exactly_amount(
        deposits in prop::collection::vec((amount_strategy(), 0u64..3, any::<bool>()), 1..40),
    ) {
        let ranks = ranks();
        let mut position = AccountPosition::new();

        for (amount, rank_id, consolidate) in deposits {
            let rank = &ranks[rank_id as usize];
            let before = position.total();
            let mut staged = position.clone();
            if engine::deposit(&mut staged, amount, rank_id, rank, consolidate, epoch(), 64).is_ok() {
                prop_assert_eq!(staged.total(), before + amount);
                staged.check_invariants().unwrap();
                position = staged;
            }
        }
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn test_full_staking_lifecycle() {
        let mut t = create_test_ledger();
        let alice = AccountId::new("alice");

        // Lock into the first two ranks
        t.ledger.deposit(&alice, Decimal::from(300), 0, false).unwrap();
        t.ledger.deposit(&alice, Decimal::from(200), 1, false).unwrap();

        // Rank 0 matures, rank 1 does not
        t.clock.advance(Duration::from_secs(DAY));
        assert_eq!(t.ledger.view_expired(&alice, 0).unwrap(), Decimal::from(300));
        assert_eq!(t.ledger.view_expired(&alice, 1).unwrap(), Decimal::ZERO);

        t.ledger.withdraw(&alice, Decimal::from(100), 0).unwrap();
        assert_eq!(t.ledger.balance_of(&alice, 0).unwrap().unlocked, Decimal::from(200));

        // Consolidate rank 0 into rank 2: gap = 2000 - 50 = 1950, absorbs 200 + 200
        t.ledger.deposit(&alice, Decimal::from(50), 2, true).unwrap();
        assert!(t.ledger.balance_of(&alice, 0).unwrap().is_zero());
        assert!(t.ledger.balance_of(&alice, 1).unwrap().is_zero());
        assert_eq!(t.ledger.balance_of(&alice, 2).unwrap().locked, Decimal::from(450));

        assert!(t.ledger.check_conservation(&alice).unwrap());

        // Freeze and exit before any lock matures
        t.registry.set_frozen(true);
        let exit = t.ledger.emergency_withdraw(&alice).unwrap();
        assert_eq!(exit.amount, Decimal::from(450));
        assert!(t.ledger.position(&alice).unwrap().is_empty());
        assert_eq!(
            BaseToken::balance_of(&*t.base, &alice),
            Decimal::from(INITIAL_BASE)
        );

        let events = t.ledger.events(&alice).unwrap();
        assert_eq!(events.len(), 5);
        assert!(events.windows(2).all(|w| w[0].timestamp_nanos <= w[1].timestamp_nanos));
        assert!(t.ledger.check_conservation(&alice).unwrap());
    }
}
