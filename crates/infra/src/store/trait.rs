use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use housebank_accounting::{
    Account, BalanceAdjustment, CreateAccountParams, CreateEntryParams, CreateTransferParams,
    Entry, ListAccountsParams, ListEntriesParams, ListTransfersParams, Transfer,
    UpdateAccountBalanceParams,
};
use housebank_auth::{
    ChangePasswordParams, CreateSessionParams, CreateUserParams, Session, UpdateUserParams, User,
};
use housebank_core::{AccountId, EntryId, LedgerResult, OutboxId, SessionId, TransferId};

use crate::outbox::{NewOutboxMessage, OutboxMessage, OutboxStatus};

/// Boxed future returned by a unit of work.
///
/// `'t` is the lifetime of the transaction handle the unit of work borrows.
pub type TxFuture<'t, T> = Pin<Box<dyn Future<Output = LedgerResult<T>> + Send + 't>>;

/// The data-operation surface, identical inside and outside a transaction.
///
/// Workflows only ever see `&mut dyn Queries`: they cannot begin, commit or
/// roll back, and they cannot tell which backend they run against. Every
/// failure comes back as a [`LedgerError`](housebank_core::LedgerError) with
/// its category already assigned by the backend.
///
/// Writes to accounts take the row lock for the rest of the transaction.
/// Callers touching more than one account must go through
/// [`housebank_accounting::OrderedPair`] or [`housebank_accounting::lock_ordered`].
#[async_trait]
pub trait Queries: Send {
    // accounts
    async fn create_account(&mut self, params: CreateAccountParams) -> LedgerResult<Account>;
    async fn get_account(&mut self, id: AccountId) -> LedgerResult<Account>;
    /// Read an account and keep its row locked until the transaction ends.
    async fn get_account_for_update(&mut self, id: AccountId) -> LedgerResult<Account>;
    async fn list_accounts(&mut self, params: ListAccountsParams) -> LedgerResult<Vec<Account>>;
    async fn update_account_balance(
        &mut self,
        params: UpdateAccountBalanceParams,
    ) -> LedgerResult<Account>;
    /// `balance = balance + delta` as one statement. Fails with
    /// `InsufficientFunds` when the result would be negative.
    async fn add_account_balance(&mut self, adjustment: BalanceAdjustment)
    -> LedgerResult<Account>;
    async fn delete_account(&mut self, id: AccountId) -> LedgerResult<()>;

    // entries
    async fn create_entry(&mut self, params: CreateEntryParams) -> LedgerResult<Entry>;
    async fn get_entry(&mut self, id: EntryId) -> LedgerResult<Entry>;
    async fn list_entries(&mut self, params: ListEntriesParams) -> LedgerResult<Vec<Entry>>;

    // transfers
    async fn create_transfer(&mut self, params: CreateTransferParams) -> LedgerResult<Transfer>;
    async fn get_transfer(&mut self, id: TransferId) -> LedgerResult<Transfer>;
    async fn list_transfers(&mut self, params: ListTransfersParams)
    -> LedgerResult<Vec<Transfer>>;

    // users
    async fn create_user(&mut self, params: CreateUserParams) -> LedgerResult<User>;
    async fn get_user(&mut self, username: &str) -> LedgerResult<User>;
    async fn update_user(&mut self, params: UpdateUserParams) -> LedgerResult<User>;
    async fn change_password(&mut self, params: ChangePasswordParams) -> LedgerResult<User>;

    async fn mark_email_verified(
        &mut self,
        username: &str,
        at: DateTime<Utc>,
    ) -> LedgerResult<User> {
        self.update_user(UpdateUserParams {
            email_verified_at: Some(at),
            ..UpdateUserParams::for_user(username)
        })
        .await
    }

    // sessions
    async fn create_session(&mut self, params: CreateSessionParams) -> LedgerResult<Session>;
    async fn get_session(&mut self, id: SessionId) -> LedgerResult<Session>;
    async fn revoke_session(&mut self, id: SessionId) -> LedgerResult<Session>;

    // outbox
    async fn enqueue_outbox(&mut self, message: NewOutboxMessage) -> LedgerResult<OutboxMessage>;
    /// Lock up to `limit` due pending rows, skipping rows another
    /// transaction already holds.
    async fn claim_outbox(
        &mut self,
        limit: u32,
        now: DateTime<Utc>,
    ) -> LedgerResult<Vec<OutboxMessage>>;
    async fn mark_outbox_delivered(
        &mut self,
        id: OutboxId,
        at: DateTime<Utc>,
    ) -> LedgerResult<OutboxMessage>;
    /// Record a failed attempt. `retry_at: None` dead-letters the row.
    async fn mark_outbox_failed(
        &mut self,
        id: OutboxId,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> LedgerResult<OutboxMessage>;
    async fn list_outbox(
        &mut self,
        status: Option<OutboxStatus>,
        limit: u32,
    ) -> LedgerResult<Vec<OutboxMessage>>;
}

/// An open transaction. Dropping it without `commit` rolls it back.
#[async_trait]
pub trait Transaction: Queries + Sized + 'static {
    async fn commit(self) -> LedgerResult<()>;
    async fn rollback(self) -> LedgerResult<()>;
}

/// A store backend able to open transactions.
#[async_trait]
pub trait Database: Send + Sync + 'static {
    type Tx: Transaction;

    async fn begin(&self) -> LedgerResult<Self::Tx>;
}
