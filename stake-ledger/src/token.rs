//! Token collaborators
//!
//! The ledger reaches both tokens only through these traits. Calls are
//! synchronous; an `Err` aborts the enclosing ledger operation.

use crate::types::{AccountId, Amount};
use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

/// Derivative receipt token, minted on deposit and burned on withdrawal
pub trait ReceiptToken: Send + Sync {
    /// Create `amount` for `account`
    fn mint(&self, account: &AccountId, amount: Amount) -> Result<()>;

    /// Destroy `amount` held by `account`
    fn burn(&self, account: &AccountId, amount: Amount) -> Result<()>;

    /// Balance of `account`
    fn balance_of(&self, account: &AccountId) -> Amount;
}

/// Base token staked into the ledger
pub trait BaseToken: Send + Sync {
    /// Pull `amount` from `from` into `to` (deposit)
    fn transfer_from(&self, from: &AccountId, to: &AccountId, amount: Amount) -> Result<()>;

    /// Send `amount` from `from` to `to` (withdrawal from custody)
    fn transfer(&self, from: &AccountId, to: &AccountId, amount: Amount) -> Result<()>;

    /// Balance of `account`
    fn balance_of(&self, account: &AccountId) -> Amount;
}

/// In-process token usable as either collaborator
///
/// Plain conservation semantics: no fees, no negative balances.
#[derive(Debug)]
pub struct InMemoryToken {
    symbol: String,
    balances: RwLock<HashMap<AccountId, Amount>>,
    failing: AtomicBool,
    /// Mutating calls left before failing; negative means unlimited
    calls_left: AtomicI64,
}

impl InMemoryToken {
    /// Create token with no holders
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            balances: RwLock::new(HashMap::new()),
            failing: AtomicBool::new(false),
            calls_left: AtomicI64::new(-1),
        }
    }

    /// Token symbol
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Credit `amount` out of thin air (test faucet / genesis allocation)
    pub fn credit(&self, account: &AccountId, amount: Amount) -> Result<()> {
        let mut balances = self.balances.write();
        Self::deposit_into(&mut balances, &self.symbol, account, amount)
    }

    /// Make every subsequent mutating call fail until cleared
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Let `calls` more mutating calls succeed, then fail the rest
    pub fn fail_after(&self, calls: u32) {
        self.calls_left.store(i64::from(calls), Ordering::SeqCst);
    }

    /// Sum of all balances
    pub fn total_supply(&self) -> Amount {
        self.balances.read().values().copied().sum()
    }

    fn balance(&self, account: &AccountId) -> Amount {
        self.balances.read().get(account).copied().unwrap_or_default()
    }

    fn check_call(&self, op: &str, amount: Amount) -> Result<()> {
        let exhausted = self
            .calls_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                0 => None,
                left if left > 0 => Some(left - 1),
                _ => Some(left),
            })
            .is_err();
        if exhausted || self.failing.load(Ordering::SeqCst) {
            return Err(Error::Token(format!("{} {} rejected", self.symbol, op)));
        }
        if amount <= Amount::ZERO {
            return Err(Error::Token(format!(
                "{} {} of non-positive amount {}",
                self.symbol, op, amount
            )));
        }
        Ok(())
    }

    fn debit(
        balances: &mut HashMap<AccountId, Amount>,
        symbol: &str,
        account: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        let current = balances.get(account).copied().unwrap_or_default();
        if current < amount {
            return Err(Error::Token(format!(
                "{} balance of {} is {}, needs {}",
                symbol, account, current, amount
            )));
        }

        let remaining = current - amount;
        if remaining.is_zero() {
            balances.remove(account);
        } else {
            balances.insert(account.clone(), remaining);
        }
        Ok(())
    }

    fn deposit_into(
        balances: &mut HashMap<AccountId, Amount>,
        symbol: &str,
        account: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        let current = balances.get(account).copied().unwrap_or_default();
        let updated = current.checked_add(amount).ok_or_else(|| {
            Error::AmountOverflow(format!(
                "{} balance of {} is {}, cannot add {}",
                symbol, account, current, amount
            ))
        })?;
        balances.insert(account.clone(), updated);
        Ok(())
    }

    fn move_funds(&self, from: &AccountId, to: &AccountId, amount: Amount) -> Result<()> {
        let mut balances = self.balances.write();
        let to_before = balances.get(to).copied().unwrap_or_default();
        to_before.checked_add(amount).ok_or_else(|| {
            Error::AmountOverflow(format!(
                "{} balance of {} is {}, cannot add {}",
                self.symbol, to, to_before, amount
            ))
        })?;

        Self::debit(&mut balances, &self.symbol, from, amount)?;
        Self::deposit_into(&mut balances, &self.symbol, to, amount)
    }
}

impl ReceiptToken for InMemoryToken {
    fn mint(&self, account: &AccountId, amount: Amount) -> Result<()> {
        self.check_call("mint", amount)?;
        self.credit(account, amount)
    }

    fn burn(&self, account: &AccountId, amount: Amount) -> Result<()> {
        self.check_call("burn", amount)?;
        let mut balances = self.balances.write();
        Self::debit(&mut balances, &self.symbol, account, amount)
    }

    fn balance_of(&self, account: &AccountId) -> Amount {
        self.balance(account)
    }
}

impl BaseToken for InMemoryToken {
    fn transfer_from(&self, from: &AccountId, to: &AccountId, amount: Amount) -> Result<()> {
        self.check_call("transfer_from", amount)?;
        self.move_funds(from, to, amount)
    }

    fn transfer(&self, from: &AccountId, to: &AccountId, amount: Amount) -> Result<()> {
        self.check_call("transfer", amount)?;
        self.move_funds(from, to, amount)
    }

    fn balance_of(&self, account: &AccountId) -> Amount {
        self.balance(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_mint_and_burn() {
        let token = InMemoryToken::new("sTKN");
        let alice = AccountId::new("alice");

        token.mint(&alice, Decimal::from(10)).unwrap();
        token.burn(&alice, Decimal::from(4)).unwrap();

        assert_eq!(ReceiptToken::balance_of(&token, &alice), Decimal::from(6));
        assert!(token.burn(&alice, Decimal::from(7)).is_err());
        assert_eq!(token.total_supply(), Decimal::from(6));
    }

    #[test]
    fn test_transfer_conserves_supply() {
        let token = InMemoryToken::new("TKN");
        let alice = AccountId::new("alice");
        let vault = AccountId::new("vault");
        token.credit(&alice, Decimal::from(100)).unwrap();

        token.transfer_from(&alice, &vault, Decimal::from(30)).unwrap();
        assert_eq!(BaseToken::balance_of(&token, &vault), Decimal::from(30));
        assert_eq!(token.total_supply(), Decimal::from(100));

        let result = token.transfer(&vault, &alice, Decimal::from(31));
        assert!(matches!(result, Err(Error::Token(_))));
        assert_eq!(BaseToken::balance_of(&token, &alice), Decimal::from(70));
    }

    #[test]
    fn test_failing_switch() {
        let token = InMemoryToken::new("sTKN");
        let alice = AccountId::new("alice");
        token.set_failing(true);
        assert!(token.mint(&alice, Decimal::ONE).is_err());
        token.set_failing(false);
        assert!(token.mint(&alice, Decimal::ONE).is_ok());
    }

    #[test]
    fn test_fail_after() {
        let token = InMemoryToken::new("sTKN");
        let alice = AccountId::new("alice");
        token.fail_after(1);
        assert!(token.mint(&alice, Decimal::ONE).is_ok());
        assert!(token.burn(&alice, Decimal::ONE).is_err());
        assert_eq!(ReceiptToken::balance_of(&token, &alice), Decimal::ONE);
    }

    #[test]
    fn test_credit_overflow_is_an_error() {
        let token = InMemoryToken::new("TKN");
        let alice = AccountId::new("alice");
        let vault = AccountId::new("vault");
        token.credit(&alice, Decimal::MAX).unwrap();
        token.credit(&vault, Decimal::ONE).unwrap();

        assert!(matches!(
            token.credit(&alice, Decimal::ONE),
            Err(Error::AmountOverflow(_))
        ));
        assert!(matches!(
            token.transfer(&vault, &alice, Decimal::ONE),
            Err(Error::AmountOverflow(_))
        ));
        assert_eq!(BaseToken::balance_of(&token, &vault), Decimal::ONE);
    }
}
