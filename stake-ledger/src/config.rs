//! Configuration for the staking ledger

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Staking rules
    pub staking: StakingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/stake-ledger"),
            service_name: "stake-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            rocksdb: RocksDBConfig::default(),
            staking: StakingConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 2,
            max_background_jobs: 2,
            enable_statistics: false,
        }
    }
}

/// Staking rules and actor sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakingConfig {
    /// Live timelock cap per account
    pub max_timelocks_per_account: usize,

    /// Account that holds staked base tokens
    pub custody_account: String,

    /// Actor mailbox capacity (backpressure)
    pub mailbox_capacity: usize,

    /// Decimal places accepted in amounts (at most 28)
    #[serde(default = "default_amount_scale")]
    pub amount_scale: u32,

    /// Ranks seeded into the in-process registry by the server binary
    #[serde(default)]
    pub ranks: Vec<RankConfig>,
}

impl Default for StakingConfig {
    fn default() -> Self {
        Self {
            max_timelocks_per_account: 64,
            custody_account: "stake-ledger-custody".to_string(),
            mailbox_capacity: 1000,
            amount_scale: default_amount_scale(),
            ranks: Vec::new(),
        }
    }
}

fn default_amount_scale() -> u32 {
    18
}

/// Rank definition in configuration form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankConfig {
    /// Funding goal
    pub goal_amount: Decimal,

    /// Lock duration (seconds)
    pub min_duration_secs: u64,
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("STAKE_LEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(custody) = std::env::var("STAKE_LEDGER_CUSTODY_ACCOUNT") {
            config.staking.custody_account = custody;
        }

        if let Ok(max) = std::env::var("STAKE_LEDGER_MAX_TIMELOCKS") {
            config.staking.max_timelocks_per_account = max.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid STAKE_LEDGER_MAX_TIMELOCKS: {}", e))
            })?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "stake-ledger");
        assert_eq!(config.staking.max_timelocks_per_account, 64);
        assert_eq!(config.staking.amount_scale, 18);
        assert!(config.staking.ranks.is_empty());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.toml");
        std::fs::write(
            &path,
            r#"
data_dir = "/tmp/stake"
service_name = "stake-ledger"
service_version = "0.1.0"

[rocksdb]
write_buffer_size_mb = 16
max_write_buffer_number = 2
max_background_jobs = 1
enable_statistics = false

[staking]
max_timelocks_per_account = 64
custody_account = "vault"
mailbox_capacity = 10

[[staking.ranks]]
goal_amount = "100"
min_duration_secs = 86400
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.staking.custody_account, "vault");
        assert_eq!(config.staking.amount_scale, 18);
        assert_eq!(config.staking.ranks.len(), 1);
        assert_eq!(config.staking.ranks[0].goal_amount, Decimal::from(100));
    }
}
