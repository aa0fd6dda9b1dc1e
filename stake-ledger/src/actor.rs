//! Actor-based concurrency for the ledger
//!
//! Every operation on one ledger is serialized through a single Tokio task:
//! - One logical writer eliminates races between concurrent deposits
//! - Bounded mailbox gives callers backpressure
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │               LedgerHandle (Clone)                    │
//! │         Sends messages to actor mailbox              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)                │
//! │     Ledger::deposit / withdraw / sweep_expired ...    │
//! │                       │                               │
//! │                       ▼                               │
//! │             Storage::commit()                         │
//! │          (atomic write to RocksDB)                    │
//! └───────────────────────────────────────────────────────┘
//! ```

use crate::ledger::Ledger;
use crate::position::AccountPosition;
use crate::timelock::RankTotals;
use crate::types::{AccountId, Amount, LedgerEvent, RankId, TimelockEntry};
use crate::{Error, Result};
use tokio::sync::{mpsc, oneshot};

/// Message sent to the ledger actor
#[derive(Debug)]
pub enum LedgerMessage {
    /// Stake into a rank
    Deposit {
        account: AccountId,
        amount: Amount,
        rank_id: RankId,
        consolidate: bool,
        response: oneshot::Sender<Result<LedgerEvent>>,
    },

    /// Withdraw unlocked stake
    Withdraw {
        account: AccountId,
        amount: Amount,
        rank_id: RankId,
        response: oneshot::Sender<Result<LedgerEvent>>,
    },

    /// Withdraw everything while the registry is frozen
    EmergencyWithdraw {
        account: AccountId,
        response: oneshot::Sender<Result<LedgerEvent>>,
    },

    /// Promote matured timelocks
    SweepExpired {
        account: AccountId,
        response: oneshot::Sender<Result<RankTotals>>,
    },

    /// Matured but unswept amount in a rank
    ViewExpired {
        account: AccountId,
        rank_id: RankId,
        response: oneshot::Sender<Result<Amount>>,
    },

    /// Live timelocks of an account
    ListTimelocks {
        account: AccountId,
        response: oneshot::Sender<Result<Vec<TimelockEntry>>>,
    },

    /// Whole position of an account
    GetPosition {
        account: AccountId,
        response: oneshot::Sender<Result<AccountPosition>>,
    },

    /// Committed events of an account
    GetEvents {
        account: AccountId,
        response: oneshot::Sender<Result<Vec<LedgerEvent>>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that processes ledger messages
#[derive(Debug)]
pub struct LedgerActor {
    /// Ledger owned by this task
    ledger: Ledger,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(ledger: Ledger, mailbox: mpsc::Receiver<LedgerMessage>) -> Self {
        Self { ledger, mailbox }
    }

    /// Run the actor event loop until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            if let LedgerMessage::Shutdown = msg {
                break;
            }
            self.handle_message(msg);
        }

        tracing::info!("Ledger actor stopped");
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: LedgerMessage) {
        match msg {
            LedgerMessage::Deposit {
                account,
                amount,
                rank_id,
                consolidate,
                response,
            } => {
                let result = self.ledger.deposit(&account, amount, rank_id, consolidate);
                let _ = response.send(result);
            }

            LedgerMessage::Withdraw {
                account,
                amount,
                rank_id,
                response,
            } => {
                let result = self.ledger.withdraw(&account, amount, rank_id);
                let _ = response.send(result);
            }

            LedgerMessage::EmergencyWithdraw { account, response } => {
                let result = self.ledger.emergency_withdraw(&account);
                let _ = response.send(result);
            }

            LedgerMessage::SweepExpired { account, response } => {
                let result = self.ledger.sweep_expired(&account);
                let _ = response.send(result);
            }

            LedgerMessage::ViewExpired {
                account,
                rank_id,
                response,
            } => {
                let result = self.ledger.view_expired(&account, rank_id);
                let _ = response.send(result);
            }

            LedgerMessage::ListTimelocks { account, response } => {
                let result = self.ledger.list_timelocks(&account);
                let _ = response.send(result);
            }

            LedgerMessage::GetPosition { account, response } => {
                let result = self.ledger.position(&account);
                let _ = response.send(result);
            }

            LedgerMessage::GetEvents { account, response } => {
                let result = self.ledger.events(&account);
                let _ = response.send(result);
            }

            LedgerMessage::Shutdown => {
                // Handled in main loop
            }
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Debug, Clone)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> LedgerMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Stake `amount` into `rank_id`
    pub async fn deposit(
        &self,
        account: AccountId,
        amount: Amount,
        rank_id: RankId,
        consolidate: bool,
    ) -> Result<LedgerEvent> {
        self.request(|response| LedgerMessage::Deposit {
            account,
            amount,
            rank_id,
            consolidate,
            response,
        })
        .await
    }

    /// Withdraw `amount` from `rank_id`
    pub async fn withdraw(
        &self,
        account: AccountId,
        amount: Amount,
        rank_id: RankId,
    ) -> Result<LedgerEvent> {
        self.request(|response| LedgerMessage::Withdraw {
            account,
            amount,
            rank_id,
            response,
        })
        .await
    }

    /// Withdraw everything (frozen registry only)
    pub async fn emergency_withdraw(&self, account: AccountId) -> Result<LedgerEvent> {
        self.request(|response| LedgerMessage::EmergencyWithdraw { account, response })
            .await
    }

    /// Promote matured timelocks
    pub async fn sweep_expired(&self, account: AccountId) -> Result<RankTotals> {
        self.request(|response| LedgerMessage::SweepExpired { account, response })
            .await
    }

    /// Matured but unswept amount in `rank_id`
    pub async fn view_expired(&self, account: AccountId, rank_id: RankId) -> Result<Amount> {
        self.request(|response| LedgerMessage::ViewExpired {
            account,
            rank_id,
            response,
        })
        .await
    }

    /// Live timelocks
    pub async fn list_timelocks(&self, account: AccountId) -> Result<Vec<TimelockEntry>> {
        self.request(|response| LedgerMessage::ListTimelocks { account, response })
            .await
    }

    /// Whole position
    pub async fn position(&self, account: AccountId) -> Result<AccountPosition> {
        self.request(|response| LedgerMessage::GetPosition { account, response })
            .await
    }

    /// Committed events, oldest first
    pub async fn events(&self, account: AccountId) -> Result<Vec<LedgerEvent>> {
        self.request(|response| LedgerMessage::GetEvents { account, response })
            .await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LedgerMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the ledger actor
///
/// Must be called from within a Tokio runtime.
pub fn spawn_ledger_actor(ledger: Ledger, mailbox_capacity: usize) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity.max(1));
    let actor = LedgerActor::new(ledger, rx);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ledger::Collaborators;
    use crate::registry::InMemoryRegistry;
    use crate::token::{InMemoryToken, ReceiptToken};
    use crate::types::Rank;
    use crate::Config;
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use std::time::Duration;

    fn open_ledger(dir: &tempfile::TempDir) -> (Ledger, Arc<InMemoryToken>, Arc<ManualClock>) {
        let mut config = Config::default();
        config.data_dir = dir.path().to_path_buf();

        let base = Arc::new(InMemoryToken::new("TKN"));
        for name in ["alice", "bob"] {
            base.credit(&AccountId::new(name), Decimal::from(1_000)).unwrap();
        }
        let receipt = Arc::new(InMemoryToken::new("sTKN"));
        let clock = Arc::new(ManualClock::default());
        let registry = InMemoryRegistry::with_ranks([Rank::new(
            Decimal::from(10_000),
            Duration::from_secs(3_600),
        )])
        .unwrap();

        let ledger = Ledger::open(
            config,
            Collaborators {
                registry: Arc::new(registry),
                receipt: receipt.clone(),
                base,
                clock: clock.clone(),
            },
        )
        .unwrap();
        (ledger, receipt, clock)
    }

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (ledger, _, _) = open_ledger(&temp_dir);
        let handle = spawn_ledger_actor(ledger, 16);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_deposit_and_withdraw() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (ledger, receipt, clock) = open_ledger(&temp_dir);
        let handle = spawn_ledger_actor(ledger, 16);
        let alice = AccountId::new("alice");

        let event = handle
            .deposit(alice.clone(), Decimal::from(40), 0, false)
            .await
            .unwrap();
        assert_eq!(event.amount, Decimal::from(40));
        assert_eq!(handle.list_timelocks(alice.clone()).await.unwrap().len(), 1);

        clock.advance(Duration::from_secs(3_600));
        assert_eq!(
            handle.view_expired(alice.clone(), 0).await.unwrap(),
            Decimal::from(40)
        );

        handle
            .withdraw(alice.clone(), Decimal::from(15), 0)
            .await
            .unwrap();

        let position = handle.position(alice.clone()).await.unwrap();
        assert_eq!(position.balance(0).unlocked, Decimal::from(25));
        assert_eq!(receipt.balance_of(&alice), Decimal::from(25));
        assert_eq!(handle.events(alice).await.unwrap().len(), 2);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_propagates_errors() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (ledger, _, _) = open_ledger(&temp_dir);
        let handle = spawn_ledger_actor(ledger, 16);

        let result = handle
            .deposit(AccountId::new("alice"), Decimal::ZERO, 0, false)
            .await;
        assert!(matches!(result, Err(Error::NonPositiveAmount)));

        let result = handle.emergency_withdraw(AccountId::new("alice")).await;
        assert!(matches!(result, Err(Error::SpaceIsNotFrozen)));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_handles_are_serialized() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (ledger, receipt, _) = open_ledger(&temp_dir);
        let handle = spawn_ledger_actor(ledger, 4);

        let mut tasks = Vec::new();
        for i in 0..20 {
            let handle = handle.clone();
            let account = AccountId::new(if i % 2 == 0 { "alice" } else { "bob" });
            tasks.push(tokio::spawn(async move {
                handle.deposit(account, Decimal::ONE, 0, false).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        for name in ["alice", "bob"] {
            let account = AccountId::new(name);
            let position = handle.position(account.clone()).await.unwrap();
            assert_eq!(position.timelocks.len(), 10);
            assert_eq!(position.total(), receipt.balance_of(&account));
        }

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_handle_after_shutdown() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (ledger, _, _) = open_ledger(&temp_dir);
        let handle = spawn_ledger_actor(ledger, 16);

        handle.shutdown().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let result = handle.position(AccountId::new("alice")).await;
        assert!(matches!(result, Err(Error::Concurrency(_))));
    }
}
