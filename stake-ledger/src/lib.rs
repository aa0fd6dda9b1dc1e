//! Stake Ledger
//!
//! Rank-gated staking ledger: accounts lock a base token into ranks for a
//! rank-specific duration and receive a receipt token one-for-one.
//!
//! # Architecture
//!
//! - **Engine**: Pure bookkeeping over one account position
//! - **Single Writer**: One actor task per ledger eliminates race conditions
//! - **Staged Commit**: Token calls run against a staged position; the
//!   position and its event land in one RocksDB write
//! - **Factory**: One ledger per underlying token
//!
//! # Invariants
//!
//! - Conservation: Σ(locked + unlocked) == receipt balance, per account
//! - `locked[r]` equals the sum of live timelocks in rank `r`
//! - At most 64 live timelocks per account
//! - A failed operation changes nothing

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod timelock;
pub mod position;
pub mod engine;
pub mod registry;
pub mod token;
pub mod clock;
pub mod storage;
pub mod ledger;
pub mod error;
pub mod actor;
pub mod factory;
pub mod config;
pub mod metrics;

// Re-exports
pub use error::{Error, Result};
pub use types::{
    AccountId, Amount, EventType, LedgerEvent, Rank, RankBalance, RankId, TimelockEntry,
    Timestamp,
};
pub use position::AccountPosition;
pub use registry::{InMemoryRegistry, RankRegistry};
pub use token::{BaseToken, InMemoryToken, ReceiptToken};
pub use clock::{Clock, ManualClock, SystemClock};
pub use ledger::{Collaborators, Ledger};
pub use actor::{spawn_ledger_actor, LedgerHandle};
pub use factory::LedgerFactory;
pub use config::Config;
