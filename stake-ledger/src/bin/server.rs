//! Stake ledger server binary
//!
//! Hosts one ledger actor backed by in-process tokens and a registry seeded
//! from `[[staking.ranks]]`. Usage: `stake-ledger-server [config.toml]`.

use anyhow::Context;
use stake_ledger::{
    spawn_ledger_actor, Collaborators, Config, InMemoryRegistry, InMemoryToken, Ledger, Rank,
    SystemClock,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting stake ledger server");

    // Load configuration
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => Config::from_env().context("Failed to load config from environment")?,
    };
    tracing::info!(config = %serde_json::to_string(&config)?, "Configuration loaded");

    let registry = InMemoryRegistry::with_ranks(config.staking.ranks.iter().map(|rank| {
        Rank::new(rank.goal_amount, Duration::from_secs(rank.min_duration_secs))
    }))
    .context("Invalid rank configuration")?;
    if config.staking.ranks.is_empty() {
        tracing::warn!("No ranks configured, deposits will be rejected");
    }

    let collaborators = Collaborators {
        registry: Arc::new(registry),
        receipt: Arc::new(InMemoryToken::new("sTKN")),
        base: Arc::new(InMemoryToken::new("TKN")),
        clock: Arc::new(SystemClock),
    };

    // Open ledger
    let capacity = config.staking.mailbox_capacity;
    let ledger = Ledger::open(config, collaborators).context("Failed to open ledger")?;
    tracing::info!(stats = %serde_json::to_string(&ledger.stats()?)?, "Ledger opened successfully");

    // Conservation audit over every staked account
    let accounts = ledger.accounts()?.len();
    let imbalanced = ledger.imbalanced_accounts()?;
    if imbalanced.is_empty() {
        tracing::info!(accounts, imbalanced = 0, "Conservation audit passed");
    } else {
        tracing::warn!(
            accounts,
            imbalanced = imbalanced.len(),
            "Conservation audit found imbalances"
        );
    }

    let handle = spawn_ledger_actor(ledger, capacity);

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down stake ledger server");
    handle.shutdown().await?;
    Ok(())
}
