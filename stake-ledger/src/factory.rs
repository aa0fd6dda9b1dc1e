//! One ledger per underlying token
//!
//! Each deployed ledger gets its own RocksDB directory under the factory's
//! `data_dir` and its own actor task.

use crate::actor::{spawn_ledger_actor, LedgerHandle};
use crate::ledger::{Collaborators, Ledger};
use crate::{Config, Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Registry of deployed ledgers keyed by underlying token id
#[derive(Debug)]
pub struct LedgerFactory {
    base_config: Config,
    ledgers: DashMap<String, LedgerHandle>,
}

impl LedgerFactory {
    /// Create factory; deployed ledgers inherit `base_config`
    pub fn new(base_config: Config) -> Self {
        Self {
            base_config,
            ledgers: DashMap::new(),
        }
    }

    /// Open and spawn the ledger for `token_id`
    ///
    /// Fails with [`Error::AlreadyDeployed`] when the token already has one.
    /// Must be called from within a Tokio runtime.
    pub fn deploy(&self, token_id: &str, collaborators: Collaborators) -> Result<LedgerHandle> {
        validate_token_id(token_id)?;

        match self.ledgers.entry(token_id.to_string()) {
            Entry::Occupied(_) => Err(Error::AlreadyDeployed(token_id.to_string())),
            Entry::Vacant(slot) => {
                let mut config = self.base_config.clone();
                config.data_dir = self.base_config.data_dir.join(token_id);
                let capacity = config.staking.mailbox_capacity;

                let ledger = Ledger::open(config, collaborators)?;
                let handle = spawn_ledger_actor(ledger, capacity);
                slot.insert(handle.clone());

                tracing::info!(token_id, "Ledger deployed");
                Ok(handle)
            }
        }
    }

    /// Handle of the ledger deployed for `token_id`
    pub fn get(&self, token_id: &str) -> Option<LedgerHandle> {
        self.ledgers.get(token_id).map(|entry| entry.value().clone())
    }

    /// Deployed token ids, sorted
    pub fn token_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.ledgers.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Stop every deployed ledger actor
    pub async fn shutdown_all(&self) -> Result<()> {
        let handles: Vec<LedgerHandle> = self.ledgers.iter().map(|e| e.value().clone()).collect();
        for handle in handles {
            handle.shutdown().await?;
        }
        Ok(())
    }
}

fn validate_token_id(token_id: &str) -> Result<()> {
    let valid = !token_id.is_empty()
        && token_id != "."
        && token_id != ".."
        && !token_id.contains(['/', '\\']);

    if !valid {
        return Err(Error::Config(format!("Invalid token id: {:?}", token_id)));
    }
    Ok(())
}
