//! Error types for the staking ledger

use crate::types::{Amount, RankId};
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
///
/// Every error aborts the whole operation; no partial state is committed.
#[derive(Error, Debug)]
pub enum Error {
    /// Deposit or withdrawal of zero, or nothing to withdraw in an emergency
    #[error("Amount must be positive")]
    NonPositiveAmount,

    /// Account already holds the maximum number of live timelocks
    #[error("Too many deposits: account holds {live} of {max} timelocks")]
    TooManyDeposits {
        /// Live entries the operation would leave behind
        live: usize,
        /// Configured cap
        max: usize,
    },

    /// Registry has no ranks defined
    #[error("No ranks defined")]
    NoRanks,

    /// Rank id out of range
    #[error("Invalid rank {rank_id}: registry has {num_of_ranks} ranks")]
    InvalidRank {
        /// Requested rank
        rank_id: RankId,
        /// Ranks currently defined
        num_of_ranks: u64,
    },

    /// Withdrawal exceeds the unlocked plus matured balance
    #[error("Insufficient balance in rank {rank_id}: available {available}, required {required}")]
    InsufficientBalance {
        /// Rank being withdrawn from
        rank_id: RankId,
        /// Unlocked plus matured balance
        available: Amount,
        /// Requested amount
        required: Amount,
    },

    /// Amount carries more fractional digits than the ledger keeps
    #[error("Amount precision {scale} exceeds the maximum of {max} decimal places")]
    AmountPrecision {
        /// Fractional digits of the rejected amount
        scale: u32,
        /// Configured maximum
        max: u32,
    },

    /// Sum would leave the exactly representable range
    #[error("Amount overflow: {0}")]
    AmountOverflow(String),

    /// Operation requested for the ledger's own custody account
    #[error("Account {0} is reserved for custody")]
    ReservedAccount(String),

    /// Emergency withdrawal while the registry is not frozen
    #[error("Space is not frozen")]
    SpaceIsNotFrozen,

    /// Regular operation while the registry is frozen
    #[error("Space is frozen")]
    SpaceIsFrozen,

    /// Token collaborator call failed
    #[error("Token error: {0}")]
    Token(String),

    /// A token call failed and reversing an earlier call failed as well
    #[error("Compensation failed after {original}: {failures}")]
    CompensationFailed {
        /// Error that triggered the compensation
        original: String,
        /// Compensating calls that could not be applied
        failures: String,
    },

    /// Factory already deployed a ledger for this token
    #[error("Ledger already deployed for token {0}")]
    AlreadyDeployed(String),

    /// Invariant violation (conservation, negative balance, etc.)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NonPositiveAmount => "non_positive_amount",
            Error::TooManyDeposits { .. } => "too_many_deposits",
            Error::NoRanks => "no_ranks",
            Error::InvalidRank { .. } => "invalid_rank",
            Error::InsufficientBalance { .. } => "insufficient_balance",
            Error::AmountPrecision { .. } => "amount_precision",
            Error::AmountOverflow(_) => "amount_overflow",
            Error::ReservedAccount(_) => "reserved_account",
            Error::SpaceIsNotFrozen => "space_is_not_frozen",
            Error::SpaceIsFrozen => "space_is_frozen",
            Error::Token(_) => "token",
            Error::CompensationFailed { .. } => "compensation_failed",
            Error::AlreadyDeployed(_) => "already_deployed",
            Error::InvariantViolation(_) => "invariant_violation",
            Error::Storage(_) => "storage",
            Error::Serialization(_) => "serialization",
            Error::Concurrency(_) => "concurrency",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Other(_) => "other",
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
