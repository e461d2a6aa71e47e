//! Trading account ledger.
//!
//! One account per client per account type. `margin` is the isolated margin
//! currently locked across the account's open isolated positions, and every
//! ledger move below keeps `available_balance + margin - balance` unchanged.

use crate::types::{AccountId, AccountType, ClientId, Quote, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingAccount {
    pub id: AccountId,
    pub client_id: ClientId,
    pub account_type: AccountType,
    pub currency: String,
    pub balance: Quote,
    pub available_balance: Quote,
    pub margin: Quote,
    // cumulative realized pnl
    pub profit: Quote,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TradingAccount {
    pub fn new(
        id: AccountId,
        client_id: ClientId,
        account_type: AccountType,
        currency: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id,
            client_id,
            account_type,
            currency: currency.into(),
            balance: Quote::zero(),
            available_balance: Quote::zero(),
            margin: Quote::zero(),
            profit: Quote::zero(),
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    pub fn is_owned_by(&self, client_id: ClientId) -> bool {
        self.client_id == client_id
    }

    pub fn deposit(&mut self, amount: Quote) {
        self.balance = self.balance.add(amount);
        self.available_balance = self.available_balance.add(amount);
    }

    /// Moves `amount` from available balance into locked margin.
    pub fn lock_margin(&mut self, amount: Quote) -> Result<(), AccountError> {
        if amount.value() > self.available_balance.value() {
            return Err(AccountError::InsufficientAvailable {
                required: amount,
                available: self.available_balance,
            });
        }
        self.available_balance = self.available_balance.sub(amount);
        self.margin = self.margin.add(amount);
        Ok(())
    }

    /// Moves `amount` of locked margin back to available balance.
    pub fn release_margin(&mut self, amount: Quote) -> Result<(), AccountError> {
        if amount.value() > self.margin.value() {
            return Err(AccountError::MarginUnderflow {
                release: amount,
                locked: self.margin,
            });
        }
        self.margin = self.margin.sub(amount);
        self.available_balance = self.available_balance.add(amount);
        Ok(())
    }

    // realized pnl hits balance, available and the running profit together, or none of them
    pub fn realize_pnl(&mut self, pnl: Quote) -> Result<(), AccountError> {
        let overflow = || AccountError::Overflow { amount: pnl };
        let balance = self.balance.checked_add(pnl).ok_or_else(overflow)?;
        let available = self.available_balance.checked_add(pnl).ok_or_else(overflow)?;
        let profit = self.profit.checked_add(pnl).ok_or_else(overflow)?;
        self.balance = balance;
        self.available_balance = available;
        self.profit = profit;
        Ok(())
    }

    /// `available + margin - balance`. Zero for an account funded only by deposits.
    pub fn ledger_drift(&self) -> Quote {
        self.available_balance.add(self.margin).sub(self.balance)
    }

    pub fn touch(&mut self, timestamp: Timestamp) {
        self.updated_at = timestamp;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountError {
    #[error("Insufficient available balance: required {required}, available {available}")]
    InsufficientAvailable { required: Quote, available: Quote },

    #[error("Cannot release {release}, only {locked} locked")]
    MarginUnderflow { release: Quote, locked: Quote },

    #[error("Crediting {amount} overflows the account ledger")]
    Overflow { amount: Quote },
}
