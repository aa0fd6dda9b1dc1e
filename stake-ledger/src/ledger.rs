//! Main ledger orchestration layer
//!
//! Ties together storage, the rank registry, both tokens and the staking
//! engine. Every mutating entry point follows the same transaction shape:
//!
//! 1. validate against the registry
//! 2. load the account position and apply the engine to a staged copy
//! 3. run the token calls (state is final before any value moves)
//! 4. commit the staged position and the event in one atomic write
//!
//! A failure in step 1 or 2 leaves everything untouched. A failure in step
//! 3 or 4 reverses the token calls already made, then discards the staged
//! copy.
//!
//! # Example
//!
//! ```no_run
//! use stake_ledger::{Collaborators, Config, Ledger};
//! use stake_ledger::types::{AccountId, Rank};
//! use stake_ledger::registry::InMemoryRegistry;
//! use stake_ledger::token::InMemoryToken;
//! use stake_ledger::clock::SystemClock;
//! use rust_decimal::Decimal;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! fn main() -> stake_ledger::Result<()> {
//!     let registry = InMemoryRegistry::with_ranks([
//!         Rank::new(Decimal::from(100), Duration::from_secs(86_400)),
//!     ])?;
//!     let collaborators = Collaborators {
//!         registry: Arc::new(registry),
//!         receipt: Arc::new(InMemoryToken::new("sTKN")),
//!         base: Arc::new(InMemoryToken::new("TKN")),
//!         clock: Arc::new(SystemClock),
//!     };
//!     let mut ledger = Ledger::open(Config::default(), collaborators)?;
//!
//!     let alice = AccountId::new("alice");
//!     ledger.deposit(&alice, Decimal::from(10), 0, false)?;
//!     Ok(())
//! }
//! ```

use crate::{
    clock::Clock,
    engine::{self, DepositPath},
    metrics::Metrics,
    position::AccountPosition,
    registry::RankRegistry,
    storage::{Storage, StorageStats},
    timelock::RankTotals,
    token::{BaseToken, ReceiptToken},
    types::{AccountId, Amount, EventType, LedgerEvent, Rank, RankBalance, RankId, TimelockEntry},
    Config, Error, Result,
};
use std::sync::Arc;

/// Largest scale a decimal amount can carry
const MAX_AMOUNT_SCALE: u32 = 28;

/// External systems the ledger talks to
#[derive(Clone)]
pub struct Collaborators {
    /// Rank definitions and the frozen switch
    pub registry: Arc<dyn RankRegistry>,

    /// Token minted to depositors
    pub receipt: Arc<dyn ReceiptToken>,

    /// Token being staked
    pub base: Arc<dyn BaseToken>,

    /// Time source for lock expiry
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("num_of_ranks", &self.registry.num_of_ranks())
            .field("frozen", &self.registry.is_frozen())
            .finish_non_exhaustive()
    }
}

/// Token movement performed by a ledger operation
#[derive(Debug, Clone, Copy)]
enum TokenCall<'a> {
    /// Mint receipt token to the account
    Mint(&'a AccountId, Amount),
    /// Burn receipt token from the account
    Burn(&'a AccountId, Amount),
    /// Pull base token from the account into custody
    Pull(&'a AccountId, Amount),
    /// Pay base token out of custody to the account
    Pay(&'a AccountId, Amount),
}

impl<'a> TokenCall<'a> {
    fn reversed(self) -> Self {
        match self {
            TokenCall::Mint(account, amount) => TokenCall::Burn(account, amount),
            TokenCall::Burn(account, amount) => TokenCall::Mint(account, amount),
            TokenCall::Pull(account, amount) => TokenCall::Pay(account, amount),
            TokenCall::Pay(account, amount) => TokenCall::Pull(account, amount),
        }
    }
}

/// Staking ledger for one underlying token
///
/// Mutating methods take `&mut self`: the ledger is a single writer, and
/// the [actor](crate::actor) is how concurrent callers share it.
pub struct Ledger {
    storage: Storage,
    registry: Arc<dyn RankRegistry>,
    receipt: Arc<dyn ReceiptToken>,
    base: Arc<dyn BaseToken>,
    clock: Arc<dyn Clock>,
    custody: AccountId,
    max_amount: Amount,
    metrics: Metrics,
    config: Config,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("storage", &self.storage)
            .field("custody", &self.custody)
            .finish_non_exhaustive()
    }
}

impl Ledger {
    /// Open ledger with configuration
    pub fn open(config: Config, collaborators: Collaborators) -> Result<Self> {
        let max_amount = max_exact_amount(config.staking.amount_scale)?;
        let storage = Storage::open(&config)?;
        let metrics = Metrics::new()
            .map_err(|e| Error::Other(format!("Failed to create metrics: {}", e)))?;

        Ok(Self {
            storage,
            registry: collaborators.registry,
            receipt: collaborators.receipt,
            base: collaborators.base,
            clock: collaborators.clock,
            custody: AccountId::new(config.staking.custody_account.clone()),
            max_amount,
            metrics,
            config,
        })
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Account holding staked base tokens
    pub fn custody_account(&self) -> &AccountId {
        &self.custody
    }

    /// Largest total stake one account can hold
    pub fn max_amount(&self) -> Amount {
        self.max_amount
    }

    /// Lock `amount` of base token in `rank_id` and mint the receipt
    ///
    /// With `consolidate` set, lower-rank balances are folded into
    /// `rank_id` unless this deposit already reaches the rank goal.
    pub fn deposit(
        &mut self,
        account: &AccountId,
        amount: Amount,
        rank_id: RankId,
        consolidate: bool,
    ) -> Result<LedgerEvent> {
        let result = self.try_deposit(account, amount, rank_id, consolidate);
        self.observe("deposit", account, &result);
        result
    }

    /// Withdraw `amount` from the unlocked (or matured) balance of `rank_id`
    pub fn withdraw(
        &mut self,
        account: &AccountId,
        amount: Amount,
        rank_id: RankId,
    ) -> Result<LedgerEvent> {
        let result = self.try_withdraw(account, amount, rank_id);
        self.observe("withdraw", account, &result);
        result
    }

    /// Withdraw the whole stake regardless of timelocks (frozen registry only)
    pub fn emergency_withdraw(&mut self, account: &AccountId) -> Result<LedgerEvent> {
        let result = self.try_emergency_withdraw(account);
        self.observe("emergency_withdraw", account, &result);
        result
    }

    /// Promote every matured timelock of `account`
    ///
    /// Returns promoted amounts per rank (empty when nothing matured).
    pub fn sweep_expired(&mut self, account: &AccountId) -> Result<RankTotals> {
        let mut staged = self.storage.get_position(account)?;
        let swept = engine::sweep_expired(&mut staged, self.clock.now())?;
        if swept.is_empty() {
            return Ok(swept);
        }

        staged.check_invariants()?;
        self.storage.commit(account, &staged, None)?;
        self.metrics.sweeps_total.inc();
        self.metrics.record_timelocks(staged.timelocks.len());

        tracing::info!(account = %account, ranks = swept.len(), "Matured timelocks swept");

        Ok(swept)
    }

    // Views

    /// Matured but unswept amount of `account` in `rank_id`
    pub fn view_expired(&self, account: &AccountId, rank_id: RankId) -> Result<Amount> {
        let position = self.storage.get_position(account)?;
        Ok(engine::view_expired(&position, rank_id, self.clock.now()))
    }

    /// Live timelocks of `account`, in no particular order
    pub fn list_timelocks(&self, account: &AccountId) -> Result<Vec<TimelockEntry>> {
        let position = self.storage.get_position(account)?;
        Ok(position.timelocks.entries().to_vec())
    }

    /// Whole position of `account`
    pub fn position(&self, account: &AccountId) -> Result<AccountPosition> {
        self.storage.get_position(account)
    }

    /// Balance of `account` in `rank_id`
    pub fn balance_of(&self, account: &AccountId, rank_id: RankId) -> Result<RankBalance> {
        Ok(self.storage.get_position(account)?.balance(rank_id))
    }

    /// Sum of locked and unlocked over all ranks
    pub fn total_staked(&self, account: &AccountId) -> Result<Amount> {
        Ok(self.storage.get_position(account)?.total())
    }

    /// Check that the account's stake equals its outstanding receipt tokens
    pub fn check_conservation(&self, account: &AccountId) -> Result<bool> {
        let staked = self.total_staked(account)?;
        let receipts = self.receipt.balance_of(account);

        if staked != receipts {
            tracing::error!(
                account = %account,
                staked = %staked,
                receipts = %receipts,
                "Conservation check failed"
            );
        }

        Ok(staked == receipts)
    }

    /// Staked accounts whose receipt balance differs from their stake
    pub fn imbalanced_accounts(&self) -> Result<Vec<AccountId>> {
        let mut imbalanced = Vec::new();
        for account in self.accounts()? {
            if !self.check_conservation(&account)? {
                imbalanced.push(account);
            }
        }
        Ok(imbalanced)
    }

    /// Committed events of `account`, oldest first
    pub fn events(&self, account: &AccountId) -> Result<Vec<LedgerEvent>> {
        self.storage.get_account_events(account)
    }

    /// Accounts with a non-empty position
    pub fn accounts(&self) -> Result<Vec<AccountId>> {
        self.storage.list_accounts()
    }

    /// Storage statistics
    pub fn stats(&self) -> Result<StorageStats> {
        self.storage.get_stats()
    }

    // Operations

    fn try_deposit(
        &mut self,
        account: &AccountId,
        amount: Amount,
        rank_id: RankId,
        consolidate: bool,
    ) -> Result<LedgerEvent> {
        self.ensure_not_frozen()?;
        self.ensure_not_custody(account)?;
        self.validate_amount(amount)?;

        let max_timelocks = self.config.staking.max_timelocks_per_account;
        let mut staged = self.storage.get_position(account)?;
        if staged.timelocks.len() >= max_timelocks {
            return Err(Error::TooManyDeposits {
                live: staged.timelocks.len(),
                max: max_timelocks,
            });
        }

        let total = staged.checked_total().unwrap_or(Amount::MAX);
        match total.checked_add(amount) {
            Some(reached) if reached <= self.max_amount => {}
            _ => {
                return Err(Error::AmountOverflow(format!(
                    "stake of {} is {}, adding {} exceeds {}",
                    account, total, amount, self.max_amount
                )))
            }
        }

        let rank = self.rank(rank_id)?;
        let now = self.clock.now();

        let path = engine::deposit(
            &mut staged,
            amount,
            rank_id,
            &rank,
            consolidate,
            now,
            max_timelocks,
        )?;
        staged.check_invariants()?;

        let event = LedgerEvent::new(EventType::Deposit, account.clone(), amount, now);
        self.settle(
            account,
            &staged,
            &event,
            &[TokenCall::Mint(account, amount), TokenCall::Pull(account, amount)],
        )?;

        self.metrics.deposits_total.inc();
        match &path {
            DepositPath::GoalReached { .. } => self.metrics.goal_promotions_total.inc(),
            DepositPath::Consolidated(_) => self.metrics.consolidations_total.inc(),
            DepositPath::Plain => {}
        }

        tracing::info!(
            account = %account,
            rank_id,
            amount = %amount,
            path = ?path,
            event_id = %event.event_id,
            "Deposit committed"
        );

        Ok(event)
    }

    fn try_withdraw(
        &mut self,
        account: &AccountId,
        amount: Amount,
        rank_id: RankId,
    ) -> Result<LedgerEvent> {
        self.ensure_not_frozen()?;
        self.ensure_not_custody(account)?;
        self.validate_amount(amount)?;

        let now = self.clock.now();
        let mut staged = self.storage.get_position(account)?;
        engine::withdraw(&mut staged, amount, rank_id, now)?;
        staged.check_invariants()?;

        let event = LedgerEvent::new(EventType::Withdraw, account.clone(), amount, now);
        self.settle(
            account,
            &staged,
            &event,
            &[TokenCall::Burn(account, amount), TokenCall::Pay(account, amount)],
        )?;

        self.metrics.withdrawals_total.inc();
        tracing::info!(
            account = %account,
            rank_id,
            amount = %amount,
            event_id = %event.event_id,
            "Withdrawal committed"
        );

        Ok(event)
    }

    fn try_emergency_withdraw(&mut self, account: &AccountId) -> Result<LedgerEvent> {
        if !self.registry.is_frozen() {
            return Err(Error::SpaceIsNotFrozen);
        }
        self.ensure_not_custody(account)?;

        let now = self.clock.now();
        let mut staged = self.storage.get_position(account)?;
        let total = engine::emergency_withdraw(&mut staged)?;

        let event = LedgerEvent::new(EventType::EmergencyWithdraw, account.clone(), total, now);
        self.settle(
            account,
            &staged,
            &event,
            &[TokenCall::Burn(account, total), TokenCall::Pay(account, total)],
        )?;

        self.metrics.emergency_withdrawals_total.inc();
        tracing::warn!(
            account = %account,
            amount = %total,
            event_id = %event.event_id,
            "Emergency withdrawal committed"
        );

        Ok(event)
    }

    // Transaction helpers

    /// Run the token calls, then commit; reverse the calls if either fails
    fn settle(
        &self,
        account: &AccountId,
        staged: &AccountPosition,
        event: &LedgerEvent,
        calls: &[TokenCall<'_>],
    ) -> Result<()> {
        for (done, call) in calls.iter().enumerate() {
            if let Err(e) = self.execute(*call) {
                return Err(self.unwind(&calls[..done], e));
            }
        }

        if let Err(e) = self.storage.commit(account, staged, Some(event)) {
            return Err(self.unwind(calls, e));
        }

        self.metrics.record_timelocks(staged.timelocks.len());
        Ok(())
    }

    fn execute(&self, call: TokenCall<'_>) -> Result<()> {
        match call {
            TokenCall::Mint(account, amount) => self.receipt.mint(account, amount),
            TokenCall::Burn(account, amount) => self.receipt.burn(account, amount),
            TokenCall::Pull(account, amount) => {
                self.base.transfer_from(account, &self.custody, amount)
            }
            TokenCall::Pay(account, amount) => self.base.transfer(&self.custody, account, amount),
        }
    }

    /// Reverse `done` newest first; `cause` is returned unless a reversal fails
    fn unwind(&self, done: &[TokenCall<'_>], cause: Error) -> Error {
        let mut failures = Vec::new();
        for call in done.iter().rev() {
            self.metrics.compensations_total.inc();
            match self.execute(call.reversed()) {
                Ok(()) => tracing::warn!(call = ?call, "Token call compensated"),
                Err(e) => {
                    tracing::error!(call = ?call, error = %e, "Compensation failed");
                    failures.push(format!("{:?}: {}", call, e));
                }
            }
        }

        if failures.is_empty() {
            return cause;
        }
        Error::CompensationFailed {
            original: cause.to_string(),
            failures: failures.join("; "),
        }
    }

    fn ensure_not_frozen(&self) -> Result<()> {
        if self.registry.is_frozen() {
            return Err(Error::SpaceIsFrozen);
        }
        Ok(())
    }

    fn ensure_not_custody(&self, account: &AccountId) -> Result<()> {
        if account == &self.custody {
            return Err(Error::ReservedAccount(account.to_string()));
        }
        Ok(())
    }

    fn validate_amount(&self, amount: Amount) -> Result<()> {
        if amount <= Amount::ZERO {
            return Err(Error::NonPositiveAmount);
        }

        let scale = amount.normalize().scale();
        let max = self.config.staking.amount_scale;
        if scale > max {
            return Err(Error::AmountPrecision { scale, max });
        }
        Ok(())
    }

    fn rank(&self, rank_id: RankId) -> Result<Rank> {
        let num_of_ranks = self.registry.num_of_ranks();
        if num_of_ranks == 0 {
            return Err(Error::NoRanks);
        }

        let invalid = || Error::InvalidRank {
            rank_id,
            num_of_ranks,
        };
        if rank_id >= num_of_ranks {
            return Err(invalid());
        }
        self.registry.rank(rank_id).ok_or_else(invalid)
    }

    fn observe<T>(&self, op: &str, account: &AccountId, result: &Result<T>) {
        if let Err(e) = result {
            self.metrics.record_rejected(e.kind());
            tracing::warn!(op, account = %account, error = %e, "Operation rejected");
        }
    }
}

/// Largest whole amount whose sums stay exact at `scale` decimal places
fn max_exact_amount(scale: u32) -> Result<Amount> {
    if scale > MAX_AMOUNT_SCALE {
        return Err(Error::Config(format!(
            "amount_scale {} exceeds {}",
            scale, MAX_AMOUNT_SCALE
        )));
    }

    let mantissa = ((1u128 << 96) - 1) / 10u128.pow(scale);
    let mantissa = i128::try_from(mantissa)
        .map_err(|e| Error::Config(format!("amount_scale {}: {}", scale, e)))?;
    Ok(Amount::from_i128_with_scale(mantissa, 0))
}
