use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use housebank_core::{AccountId, Currency, Entity, LedgerError, LedgerResult, TransferId};

use crate::account::Account;
use crate::entry::Entry;

/// Immutable record of one money-transfer execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    /// Always positive.
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

impl Entity for Transfer {
    type Id = TransferId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTransferParams {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: i64,
}

/// Transfers between two accounts, in either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListTransfersParams {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub limit: u32,
    pub offset: u32,
}

/// Input of the money-transfer workflow.
///
/// The workflow trusts these ids and this amount; currency and balance checks
/// belong to the caller (see [`TransferRequest`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTxParams {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: i64,
}

impl From<TransferTxParams> for CreateTransferParams {
    fn from(value: TransferTxParams) -> Self {
        Self {
            from_account_id: value.from_account_id,
            to_account_id: value.to_account_id,
            amount: value.amount,
        }
    }
}

/// Everything one committed transfer produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTxResult {
    pub transfer: Transfer,
    pub from_entry: Entry,
    pub to_entry: Entry,
    pub from_account: Account,
    pub to_account: Account,
}

/// Caller-side transfer request, checked before the workflow runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: i64,
    pub currency: Currency,
}

impl TransferRequest {
    /// Preconditions the adapter layer must enforce before invoking the
    /// transfer workflow: positive amount, matching currencies, enough funds.
    pub fn check_preconditions(&self, from: &Account, to: &Account) -> LedgerResult<()> {
        if self.amount <= 0 {
            return Err(LedgerError::validation("amount must be positive"));
        }
        if from.id != self.from_account_id || to.id != self.to_account_id {
            return Err(LedgerError::validation("accounts do not match the request"));
        }
        for account in [from, to] {
            if account.currency != self.currency {
                return Err(LedgerError::validation(format!(
                    "account [{}] currency mismatch: {} vs {}",
                    account.id, account.currency, self.currency
                )));
            }
        }
        if from.balance < self.amount {
            return Err(LedgerError::InsufficientFunds {
                account_id: from.id.get(),
                delta: -self.amount,
            });
        }
        Ok(())
    }

    pub fn into_params(self) -> TransferTxParams {
        TransferTxParams {
            from_account_id: self.from_account_id,
            to_account_id: self.to_account_id,
            amount: self.amount,
        }
    }
}
