//! # Native Currency Ledger
//!
//! The [`Bank`] tracks the substrate's native currency per [`Address`]. It
//! plays the role that account balances play on an account-based chain:
//! buyers attach currency to a purchase, the shop pays sellers out of its
//! own balance and the administrator withdraws to their account.
//!
//! All arithmetic is checked. A debit larger than the balance and a credit
//! that would overflow `u64` are both errors, and a failed operation leaves
//! the ledger untouched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::identity::Address;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during currency operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BankError {
    /// Attempted to debit more than the available balance.
    #[error("insufficient funds: {account} has {available}, needs {requested}")]
    InsufficientFunds {
        account: Address,
        available: u64,
        requested: u64,
    },

    /// A credit would push the balance past `u64::MAX`.
    #[error("balance overflow: {account} holds {current}, credit {credit}")]
    Overflow {
        account: Address,
        current: u64,
        credit: u64,
    },
}

// ---------------------------------------------------------------------------
// Bank
// ---------------------------------------------------------------------------

/// Native currency balances keyed by address.
///
/// Zero balances are pruned so that snapshots stay small and two ledgers
/// with the same observable balances compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bank {
    balances: BTreeMap<Address, u64>,
}

impl Bank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of `account`, zero if it has never held currency.
    pub fn balance_of(&self, account: &Address) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Overwrites a balance. Devnet faucets and test fixtures only; the
    /// shop never calls this.
    pub fn set_balance(&mut self, account: Address, amount: u64) {
        if amount == 0 {
            self.balances.remove(&account);
        } else {
            self.balances.insert(account, amount);
        }
    }

    /// Adds `amount` to `account` and returns the new balance.
    pub fn credit(&mut self, account: Address, amount: u64) -> Result<u64, BankError> {
        let current = self.balance_of(&account);
        let updated = current.checked_add(amount).ok_or(BankError::Overflow {
            account,
            current,
            credit: amount,
        })?;
        self.set_balance(account, updated);
        Ok(updated)
    }

    /// Removes `amount` from `account` and returns the new balance.
    pub fn debit(&mut self, account: Address, amount: u64) -> Result<u64, BankError> {
        let available = self.balance_of(&account);
        let updated = available
            .checked_sub(amount)
            .ok_or(BankError::InsufficientFunds {
                account,
                available,
                requested: amount,
            })?;
        self.set_balance(account, updated);
        Ok(updated)
    }

    /// Moves `amount` from `from` to `to`. Both sides are validated before
    /// either is written, so a failure leaves both balances unchanged.
    pub fn transfer(&mut self, from: Address, to: Address, amount: u64) -> Result<(), BankError> {
        self.check_transfer(&from, &to, amount)?;
        if from == to {
            return Ok(());
        }
        self.debit(from, amount)?;
        self.credit(to, amount)?;
        Ok(())
    }

    /// Validates a transfer without performing it. [`Bank::transfer`] fails
    /// exactly when this does.
    pub fn check_transfer(&self, from: &Address, to: &Address, amount: u64) -> Result<(), BankError> {
        self.ensure_funds(from, amount)?;
        if from == to {
            return Ok(());
        }
        let to_balance = self.balance_of(to);
        if to_balance.checked_add(amount).is_none() {
            return Err(BankError::Overflow {
                account: *to,
                current: to_balance,
                credit: amount,
            });
        }
        Ok(())
    }

    /// Fails with [`BankError::InsufficientFunds`] unless `account` holds
    /// at least `amount`.
    pub fn ensure_funds(&self, account: &Address, amount: u64) -> Result<(), BankError> {
        let available = self.balance_of(account);
        if available < amount {
            return Err(BankError::InsufficientFunds {
                account: *account,
                available,
                requested: amount,
            });
        }
        Ok(())
    }

    /// Sum of all balances. Saturates rather than wrapping; a ledger that
    /// actually saturates has bigger problems.
    pub fn total(&self) -> u64 {
        self.balances
            .values()
            .fold(0u64, |acc, b| acc.saturating_add(*b))
    }

    /// Number of accounts with a non-zero balance.
    pub fn account_count(&self) -> usize {
        self.balances.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(label: &str) -> Address {
        Address::from_label(label)
    }

    #[test]
    fn unknown_account_has_zero_balance() {
        let bank = Bank::new();
        assert_eq!(bank.balance_of(&addr("nobody")), 0);
    }

    #[test]
    fn credit_then_debit() {
        let mut bank = Bank::new();
        assert_eq!(bank.credit(addr("a"), 500).unwrap(), 500);
        assert_eq!(bank.debit(addr("a"), 200).unwrap(), 300);
        assert_eq!(bank.balance_of(&addr("a")), 300);
    }

    #[test]
    fn overdraft_rejected_without_change() {
        let mut bank = Bank::new();
        bank.set_balance(addr("a"), 10);
        let err = bank.debit(addr("a"), 11).unwrap_err();
        assert_eq!(
            err,
            BankError::InsufficientFunds {
                account: addr("a"),
                available: 10,
                requested: 11
            }
        );
        assert_eq!(bank.balance_of(&addr("a")), 10);
    }

    #[test]
    fn credit_overflow_rejected() {
        let mut bank = Bank::new();
        bank.set_balance(addr("a"), u64::MAX);
        assert!(matches!(
            bank.credit(addr("a"), 1),
            Err(BankError::Overflow { .. })
        ));
        assert_eq!(bank.balance_of(&addr("a")), u64::MAX);
    }

    #[test]
    fn transfer_moves_funds() {
        let mut bank = Bank::new();
        bank.set_balance(addr("a"), 1_000);
        bank.transfer(addr("a"), addr("b"), 400).unwrap();
        assert_eq!(bank.balance_of(&addr("a")), 600);
        assert_eq!(bank.balance_of(&addr("b")), 400);
        assert_eq!(bank.total(), 1_000);
    }

    #[test]
    fn transfer_to_overflowing_account_leaves_sender_intact() {
        let mut bank = Bank::new();
        bank.set_balance(addr("a"), 5);
        bank.set_balance(addr("b"), u64::MAX);
        assert!(bank.transfer(addr("a"), addr("b"), 5).is_err());
        assert_eq!(bank.balance_of(&addr("a")), 5);
    }

    #[test]
    fn self_transfer_is_noop_but_checks_funds() {
        let mut bank = Bank::new();
        bank.set_balance(addr("a"), 5);
        bank.transfer(addr("a"), addr("a"), 5).unwrap();
        assert_eq!(bank.balance_of(&addr("a")), 5);
        assert!(bank.transfer(addr("a"), addr("a"), 6).is_err());
    }

    #[test]
    fn zero_balances_are_pruned() {
        let mut bank = Bank::new();
        bank.set_balance(addr("a"), 5);
        bank.debit(addr("a"), 5).unwrap();
        assert_eq!(bank.account_count(), 0);
        assert_eq!(bank, Bank::new());
    }

    proptest::proptest! {
        #[test]
        fn transfers_conserve_total(
            start in 0u64..1_000_000,
            moves in proptest::collection::vec((0usize..3, 0usize..3, 0u64..500_000), 0..32),
        ) {
            let accounts = [addr("x"), addr("y"), addr("z")];
            let mut bank = Bank::new();
            bank.set_balance(accounts[0], start);
            for (from, to, amount) in moves {
                let before = bank.clone();
                if bank.transfer(accounts[from], accounts[to], amount).is_err() {
                    proptest::prop_assert_eq!(&bank, &before);
                }
                proptest::prop_assert_eq!(bank.total(), start);
            }
        }
    }
}
