//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `positions` - Account positions (key: account id)
//! - `events` - Committed ledger events (key: event_id)
//! - `indices` - Per-account event history (key: len || account || seq)
//! - `meta` - Counters (event sequence)
//!
//! A position and the event describing the operation that produced it are
//! written in one `WriteBatch`, so a reader never observes one without the
//! other.

use crate::{
    error::{Error, Result},
    position::AccountPosition,
    types::{AccountId, LedgerEvent},
    Config,
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode, Options,
    SingleThreaded, WriteBatch,
};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Column family names
const CF_POSITIONS: &str = "positions";
const CF_EVENTS: &str = "events";
const CF_INDICES: &str = "indices";
const CF_META: &str = "meta";

const META_EVENT_SEQ: &[u8] = b"event_seq";

/// Column family handles are owned by the DB; the ledger is the only writer
type Db = DBWithThreadMode<SingleThreaded>;

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Db,
    next_seq: AtomicU64,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.db.path())
            .field("next_seq", &self.next_seq.load(Ordering::SeqCst))
            .finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_POSITIONS, Self::cf_options_positions()),
            ColumnFamilyDescriptor::new(CF_EVENTS, Self::cf_options_events()),
            ColumnFamilyDescriptor::new(CF_INDICES, Options::default()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];

        let db = Db::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        let next_seq = {
            let cf = db
                .cf_handle(CF_META)
                .ok_or_else(|| Error::Storage(format!("Column family {} not found", CF_META)))?;
            match db.get_cf(cf, META_EVENT_SEQ)? {
                Some(bytes) => decode_u64(&bytes)?,
                None => 0,
            }
        };

        tracing::info!(path = ?path, next_seq, "Opened RocksDB");

        Ok(Self {
            db,
            next_seq: AtomicU64::new(next_seq),
        })
    }

    fn cf_options_positions() -> Options {
        let mut opts = Options::default();
        // Positions are read on every operation, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_events() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Position operations

    /// Load an account position (empty if the account has no stake)
    pub fn get_position(&self, account: &AccountId) -> Result<AccountPosition> {
        let cf = self.cf_handle(CF_POSITIONS)?;

        match self.db.get_cf(cf, account.as_str().as_bytes())? {
            Some(value) => Ok(bincode::deserialize(&value)?),
            None => Ok(AccountPosition::default()),
        }
    }

    /// Accounts with a stored position
    pub fn list_accounts(&self) -> Result<Vec<AccountId>> {
        let cf = self.cf_handle(CF_POSITIONS)?;

        let mut accounts = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item?;
            let id = String::from_utf8(key.to_vec())
                .map_err(|e| Error::Storage(format!("Corrupt account key: {}", e)))?;
            accounts.push(AccountId::new(id));
        }
        Ok(accounts)
    }

    // Event operations

    /// Get event by ID
    pub fn get_event(&self, event_id: Uuid) -> Result<Option<LedgerEvent>> {
        let cf = self.cf_handle(CF_EVENTS)?;

        match self.db.get_cf(cf, event_id.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Events of an account in commit order
    pub fn get_account_events(&self, account: &AccountId) -> Result<Vec<LedgerEvent>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let prefix = Self::index_prefix(account);

        let iter = self
            .db
            .iterator_cf(cf_indices, IteratorMode::From(&prefix, Direction::Forward));

        let mut events = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }

            let event_id = Uuid::from_slice(&value)
                .map_err(|e| Error::Storage(format!("Corrupt event index: {}", e)))?;
            let event = self
                .get_event(event_id)?
                .ok_or_else(|| Error::Storage(format!("Indexed event {} missing", event_id)))?;
            events.push(event);
        }

        Ok(events)
    }

    // Batch operations (atomic)

    /// Commit a position together with its event (atomic)
    ///
    /// An empty position deletes the account's record.
    pub fn commit(
        &self,
        account: &AccountId,
        position: &AccountPosition,
        event: Option<&LedgerEvent>,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();

        let cf_positions = self.cf_handle(CF_POSITIONS)?;
        let account_key = account.as_str().as_bytes();
        if position.is_empty() {
            batch.delete_cf(cf_positions, account_key);
        } else {
            batch.put_cf(cf_positions, account_key, bincode::serialize(position)?);
        }

        let mut seq = None;
        if let Some(event) = event {
            let cf_events = self.cf_handle(CF_EVENTS)?;
            batch.put_cf(cf_events, event.event_id.as_bytes(), bincode::serialize(event)?);

            let event_seq = self.next_seq.load(Ordering::SeqCst);
            let cf_indices = self.cf_handle(CF_INDICES)?;
            batch.put_cf(
                cf_indices,
                Self::index_key(account, event_seq),
                event.event_id.as_bytes(),
            );

            let cf_meta = self.cf_handle(CF_META)?;
            batch.put_cf(cf_meta, META_EVENT_SEQ, (event_seq + 1).to_be_bytes());
            seq = Some(event_seq);
        }

        self.db.write(batch)?;

        if let Some(event_seq) = seq {
            self.next_seq.store(event_seq + 1, Ordering::SeqCst);
        }

        tracing::debug!(
            account = %account,
            timelocks = position.timelocks.len(),
            event = ?event.map(|e| e.event_type),
            "Position committed"
        );

        Ok(())
    }

    // Index key helpers

    fn index_prefix(account: &AccountId) -> Vec<u8> {
        let id = account.as_str().as_bytes();
        let mut key = Vec::with_capacity(4 + id.len() + 8);
        key.extend_from_slice(&(id.len() as u32).to_be_bytes());
        key.extend_from_slice(id);
        key
    }

    fn index_key(account: &AccountId, seq: u64) -> Vec<u8> {
        let mut key = Self::index_prefix(account);
        key.extend_from_slice(&seq.to_be_bytes());
        key
    }

    // Statistics

    /// Get storage statistics
    pub fn get_stats(&self) -> Result<StorageStats> {
        let cf_positions = self.cf_handle(CF_POSITIONS)?;

        Ok(StorageStats {
            total_positions: self
                .db
                .property_int_value_cf(cf_positions, "rocksdb.estimate-num-keys")?
                .unwrap_or(0),
            total_events: self.next_seq.load(Ordering::SeqCst),
        })
    }
}

fn decode_u64(bytes: &[u8]) -> Result<u64> {
    let array: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::Storage(format!("Corrupt counter of {} bytes", bytes.len())))?;
    Ok(u64::from_be_bytes(array))
}

/// Storage statistics
#[derive(Debug, Clone, Serialize)]
pub struct StorageStats {
    /// Approximate number of accounts with a stake
    pub total_positions: u64,
    /// Events committed
    pub total_events: u64,
}
