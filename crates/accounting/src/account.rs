use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use housebank_core::{AccountId, Currency, Entity, LedgerError, LedgerResult, Money};

/// A balance-holding account.
///
/// # Invariants
/// - `balance` is in minor units and never negative in any committed state.
/// - `currency` never changes after the account is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub owner: String,
    pub balance: i64,
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
}

impl Entity for Account {
    type Id = AccountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Account {
    pub fn money(&self) -> Money {
        Money::new(self.balance, self.currency.clone())
    }

    /// Balance after applying `delta`, rejecting results below zero.
    pub fn balance_after(&self, delta: i64) -> LedgerResult<i64> {
        let next = self
            .balance
            .checked_add(delta)
            .ok_or_else(|| LedgerError::validation("balance overflow"))?;
        if next < 0 {
            return Err(LedgerError::InsufficientFunds {
                account_id: self.id.get(),
                delta,
            });
        }
        Ok(next)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAccountParams {
    pub owner: String,
    pub balance: i64,
    pub currency: Currency,
}

impl CreateAccountParams {
    pub fn new(owner: impl Into<String>, balance: i64, currency: Currency) -> Self {
        Self {
            owner: owner.into(),
            balance,
            currency,
        }
    }

    pub fn validate(&self) -> LedgerResult<()> {
        if self.owner.trim().is_empty() {
            return Err(LedgerError::validation("owner must not be empty"));
        }
        if self.balance < 0 {
            return Err(LedgerError::validation("opening balance must not be negative"));
        }
        Ok(())
    }
}

/// Page of accounts, optionally restricted to one owner. Ordered by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListAccountsParams {
    pub owner: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

impl Default for ListAccountsParams {
    fn default() -> Self {
        Self {
            owner: None,
            limit: 10,
            offset: 0,
        }
    }
}

/// Administrative absolute balance overwrite.
///
/// Bypasses the entry trail; it exists for back-office correction only and is
/// never issued by a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateAccountBalanceParams {
    pub id: AccountId,
    pub balance: i64,
}

/// Atomic `balance = balance + delta` on one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BalanceAdjustment {
    pub account_id: AccountId,
    pub delta: i64,
}

impl BalanceAdjustment {
    pub fn new(account_id: AccountId, delta: i64) -> Self {
        Self { account_id, delta }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(balance: i64) -> Account {
        Account {
            id: AccountId::new(1),
            owner: "alice".to_string(),
            balance,
            currency: Currency::usd(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn debit_below_zero_is_insufficient_funds() {
        let err = account(100).balance_after(-300).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                account_id: 1,
                delta: -300
            }
        );
        assert_eq!(account(100).balance_after(-100).unwrap(), 0);
    }

    #[test]
    fn create_params_reject_blank_owner() {
        let params = CreateAccountParams::new("  ", 0, Currency::usd());
        assert!(params.validate().is_err());
        assert!(CreateAccountParams::new("bob", 10, Currency::usd()).validate().is_ok());
    }
}
