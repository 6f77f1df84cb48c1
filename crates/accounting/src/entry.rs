use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use housebank_core::{AccountId, Entity, EntryId};

/// Immutable record of one balance delta on one account.
///
/// Positive amounts are credits, negative amounts are debits. Entries are
/// never updated or deleted; they are the audit trail behind every balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub account_id: AccountId,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

impl Entity for Entry {
    type Id = EntryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Entry {
    pub fn is_debit(&self) -> bool {
        self.amount < 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEntryParams {
    pub account_id: AccountId,
    pub amount: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntriesParams {
    pub account_id: AccountId,
    pub limit: u32,
    pub offset: u32,
}

impl ListEntriesParams {
    pub fn for_account(account_id: AccountId) -> Self {
        Self {
            account_id,
            limit: 100,
            offset: 0,
        }
    }
}
