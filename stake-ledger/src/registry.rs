//! Rank registry collaborator
//!
//! The ledger only reads ranks and the frozen switch. Administration
//! (adding ranks, freezing) belongs to the registry owner.

use crate::types::{Amount, Rank, RankId};
use crate::{Error, Result};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// Read-only view of the rank registry
pub trait RankRegistry: Send + Sync {
    /// Number of ranks defined
    fn num_of_ranks(&self) -> u64;

    /// Rank definition by id
    fn rank(&self, rank_id: RankId) -> Option<Rank>;

    /// Emergency switch; regular operations are rejected while set
    fn is_frozen(&self) -> bool;
}

/// In-process registry with append-only ranks
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    ranks: RwLock<Vec<Rank>>,
    frozen: AtomicBool,
}

impl InMemoryRegistry {
    /// Create empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create registry with ranks in order
    pub fn with_ranks(ranks: impl IntoIterator<Item = Rank>) -> Result<Self> {
        let registry = Self::new();
        for rank in ranks {
            registry.add_rank(rank)?;
        }
        Ok(registry)
    }

    /// Append a rank, returning its id
    pub fn add_rank(&self, rank: Rank) -> Result<RankId> {
        if rank.goal_amount <= Amount::ZERO {
            return Err(Error::NonPositiveAmount);
        }

        let mut ranks = self.ranks.write();
        ranks.push(rank);
        let rank_id = (ranks.len() - 1) as RankId;

        tracing::info!(rank_id, "Rank added");
        Ok(rank_id)
    }

    /// Set or clear the emergency switch
    pub fn set_frozen(&self, frozen: bool) {
        self.frozen.store(frozen, Ordering::SeqCst);
        tracing::warn!(frozen, "Registry frozen state changed");
    }
}

impl RankRegistry for InMemoryRegistry {
    fn num_of_ranks(&self) -> u64 {
        self.ranks.read().len() as u64
    }

    fn rank(&self, rank_id: RankId) -> Option<Rank> {
        let index = usize::try_from(rank_id).ok()?;
        self.ranks.read().get(index).cloned()
    }

    fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }
}
