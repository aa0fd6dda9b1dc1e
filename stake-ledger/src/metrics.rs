//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `stake_ledger_deposits_total` - Committed deposits
//! - `stake_ledger_withdrawals_total` - Committed withdrawals
//! - `stake_ledger_emergency_withdrawals_total` - Committed emergency exits
//! - `stake_ledger_sweeps_total` - Sweeps that matured at least one timelock
//! - `stake_ledger_goal_promotions_total` - Deposits that reached a rank goal
//! - `stake_ledger_consolidations_total` - Deposits that consolidated lower ranks
//! - `stake_ledger_rejected_total{kind}` - Rejected operations by error kind
//! - `stake_ledger_compensations_total` - Token calls reversed after a failure
//! - `stake_ledger_timelocks` - Live timelocks of the last committed account

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
///
/// Each collector owns its registry, so several ledgers (one per
/// underlying token) can live in one process.
#[derive(Clone, Debug)]
pub struct Metrics {
    /// Committed deposits
    pub deposits_total: IntCounter,

    /// Committed withdrawals
    pub withdrawals_total: IntCounter,

    /// Committed emergency withdrawals
    pub emergency_withdrawals_total: IntCounter,

    /// Sweeps that promoted something
    pub sweeps_total: IntCounter,

    /// Goal promotions
    pub goal_promotions_total: IntCounter,

    /// Consolidations
    pub consolidations_total: IntCounter,

    /// Rejected operations by error kind
    pub rejected_total: IntCounterVec,

    /// Compensating token calls
    pub compensations_total: IntCounter,

    /// Live timelocks of the last committed account
    pub timelocks: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let counter = |name: &str, help: &str| -> prometheus::Result<IntCounter> {
            let counter = IntCounter::new(name, help)?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };

        let deposits_total = counter("stake_ledger_deposits_total", "Committed deposits")?;
        let withdrawals_total = counter("stake_ledger_withdrawals_total", "Committed withdrawals")?;
        let emergency_withdrawals_total = counter(
            "stake_ledger_emergency_withdrawals_total",
            "Committed emergency withdrawals",
        )?;
        let sweeps_total = counter(
            "stake_ledger_sweeps_total",
            "Sweeps that matured at least one timelock",
        )?;
        let goal_promotions_total = counter(
            "stake_ledger_goal_promotions_total",
            "Deposits that reached a rank goal",
        )?;
        let consolidations_total = counter(
            "stake_ledger_consolidations_total",
            "Deposits that consolidated lower ranks",
        )?;
        let compensations_total = counter(
            "stake_ledger_compensations_total",
            "Token calls reversed after a later failure",
        )?;

        let rejected_total = IntCounterVec::new(
            Opts::new("stake_ledger_rejected_total", "Rejected operations"),
            &["kind"],
        )?;
        registry.register(Box::new(rejected_total.clone()))?;

        let timelocks = IntGauge::new(
            "stake_ledger_timelocks",
            "Live timelocks of the last committed account",
        )?;
        registry.register(Box::new(timelocks.clone()))?;

        Ok(Self {
            deposits_total,
            withdrawals_total,
            emergency_withdrawals_total,
            sweeps_total,
            goal_promotions_total,
            consolidations_total,
            rejected_total,
            compensations_total,
            timelocks,
            registry,
        })
    }

    /// Record rejected operation
    pub fn record_rejected(&self, kind: &str) {
        self.rejected_total.with_label_values(&[kind]).inc();
    }

    /// Record live timelock count after a commit
    pub fn record_timelocks(&self, count: usize) {
        self.timelocks.set(count as i64);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.deposits_total.get(), 0);
        assert_eq!(metrics.withdrawals_total.get(), 0);
    }

    #[test]
    fn test_independent_registries() {
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();
        first.deposits_total.inc();
        assert_eq!(first.deposits_total.get(), 1);
        assert_eq!(second.deposits_total.get(), 0);
    }

    #[test]
    fn test_record_rejected() {
        let metrics = Metrics::new().unwrap();
        metrics.record_rejected("no_ranks");
        metrics.record_rejected("no_ranks");
        assert_eq!(
            metrics.rejected_total.with_label_values(&["no_ranks"]).get(),
            2
        );
    }

    #[test]
    fn test_record_timelocks() {
        let metrics = Metrics::new().unwrap();
        metrics.record_timelocks(12);
        assert_eq!(metrics.timelocks.get(), 12);
        assert!(!metrics.registry().gather().is_empty());
    }
}
