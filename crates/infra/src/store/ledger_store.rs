use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, instrument, warn};

use housebank_accounting::{
    Account, BalanceAdjustment, CreateAccountParams, CreateEntryParams, CreateTransferParams,
    Entry, ListAccountsParams, ListEntriesParams, ListTransfersParams, Transfer,
    UpdateAccountBalanceParams,
};
use housebank_auth::{
    ChangePasswordParams, CreateSessionParams, CreateUserParams, Session, UpdateUserParams, User,
};
use housebank_core::{AccountId, EntryId, LedgerError, LedgerResult, SessionId, TransferId};

use crate::outbox::{NewOutboxMessage, OutboxMessage, OutboxStatus};

use super::r#trait::{Database, Queries, Transaction, TxFuture};

/// Transactional ledger store.
///
/// Owns the transaction lifecycle: units of work handed to
/// [`run_in_transaction`](Self::run_in_transaction) see a `&mut dyn Queries`
/// and nothing else. The single-statement helpers below each run in their own
/// transaction, which is the autocommit behavior callers expect from a plain
/// query.
///
/// Cloning is cheap; clones share the backend.
#[derive(Debug)]
pub struct LedgerStore<D> {
    db: Arc<D>,
}

impl<D> Clone for LedgerStore<D> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
        }
    }
}

impl<D: Database> LedgerStore<D> {
    pub fn new(db: D) -> Self {
        Self { db: Arc::new(db) }
    }

    pub fn database(&self) -> &D {
        &self.db
    }

    /// Run `unit` inside one transaction.
    ///
    /// - `begin` fails: the error is returned and `unit` never runs.
    /// - `unit` succeeds: the transaction is committed; a commit failure is
    ///   returned as is and nothing `unit` wrote survives.
    /// - `unit` fails: the transaction is rolled back and `unit`'s error is
    ///   returned. If the rollback fails as well, both errors are reported in
    ///   a single [`LedgerError::RollbackFailed`].
    ///
    /// If the returned future is dropped midway, the open transaction is
    /// dropped with it and rolled back by the backend.
    #[instrument(name = "run_in_transaction", skip_all, err)]
    pub async fn run_in_transaction<T, F>(&self, unit: F) -> LedgerResult<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut dyn Queries) -> TxFuture<'t, T> + Send,
    {
        let mut tx = self.db.begin().await?;
        let outcome = unit(&mut tx).await;

        match outcome {
            Ok(value) => {
                tx.commit().await?;
                debug!("transaction committed");
                Ok(value)
            }
            Err(err) => match tx.rollback().await {
                Ok(()) => {
                    debug!(error = %err, "transaction rolled back");
                    Err(err)
                }
                Err(rb_err) => {
                    error!(error = %err, rollback_error = %rb_err, "rollback failed");
                    Err(LedgerError::rollback_failed(err, rb_err))
                }
            },
        }
    }

    /// Like [`run_in_transaction`](Self::run_in_transaction), re-running the
    /// whole unit of work while it fails with a retryable error.
    ///
    /// Only for units of work without external side effects: each attempt
    /// starts from a clean rollback, so the database never sees a partial
    /// attempt, but anything sent outside the database would be sent again.
    pub async fn run_in_transaction_with_retry<T, F>(
        &self,
        max_attempts: u32,
        mut unit: F,
    ) -> LedgerResult<T>
    where
        T: Send,
        F: for<'t> FnMut(&'t mut dyn Queries) -> TxFuture<'t, T> + Send,
    {
        let mut attempt = 1;
        loop {
            match self.run_in_transaction(|q| unit(q)).await {
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    warn!(attempt, error = %err, "retrying transaction");
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    // accounts

    pub async fn create_account(&self, params: CreateAccountParams) -> LedgerResult<Account> {
        self.run_in_transaction(move |q| q.create_account(params))
            .await
    }

    pub async fn get_account(&self, id: AccountId) -> LedgerResult<Account> {
        self.run_in_transaction(move |q| q.get_account(id)).await
    }

    pub async fn list_accounts(&self, params: ListAccountsParams) -> LedgerResult<Vec<Account>> {
        self.run_in_transaction(move |q| q.list_accounts(params))
            .await
    }

    pub async fn update_account_balance(
        &self,
        params: UpdateAccountBalanceParams,
    ) -> LedgerResult<Account> {
        self.run_in_transaction(move |q| q.update_account_balance(params))
            .await
    }

    pub async fn add_account_balance(&self, adjustment: BalanceAdjustment) -> LedgerResult<Account> {
        self.run_in_transaction(move |q| q.add_account_balance(adjustment))
            .await
    }

    pub async fn delete_account(&self, id: AccountId) -> LedgerResult<()> {
        self.run_in_transaction(move |q| q.delete_account(id)).await
    }

    // entries

    pub async fn create_entry(&self, params: CreateEntryParams) -> LedgerResult<Entry> {
        self.run_in_transaction(move |q| q.create_entry(params)).await
    }

    pub async fn get_entry(&self, id: EntryId) -> LedgerResult<Entry> {
        self.run_in_transaction(move |q| q.get_entry(id)).await
    }

    pub async fn list_entries(&self, params: ListEntriesParams) -> LedgerResult<Vec<Entry>> {
        self.run_in_transaction(move |q| q.list_entries(params)).await
    }

    // transfers

    pub async fn create_transfer(&self, params: CreateTransferParams) -> LedgerResult<Transfer> {
        self.run_in_transaction(move |q| q.create_transfer(params))
            .await
    }

    pub async fn get_transfer(&self, id: TransferId) -> LedgerResult<Transfer> {
        self.run_in_transaction(move |q| q.get_transfer(id)).await
    }

    pub async fn list_transfers(&self, params: ListTransfersParams) -> LedgerResult<Vec<Transfer>> {
        self.run_in_transaction(move |q| q.list_transfers(params))
            .await
    }

    // users

    pub async fn create_user(&self, params: CreateUserParams) -> LedgerResult<User> {
        self.run_in_transaction(move |q| q.create_user(params)).await
    }

    pub async fn get_user(&self, username: &str) -> LedgerResult<User> {
        let username = username.to_string();
        self.run_in_transaction(move |q| Box::pin(async move { q.get_user(&username).await }))
            .await
    }

    pub async fn update_user(&self, params: UpdateUserParams) -> LedgerResult<User> {
        self.run_in_transaction(move |q| q.update_user(params)).await
    }

    pub async fn change_password(&self, params: ChangePasswordParams) -> LedgerResult<User> {
        self.run_in_transaction(move |q| q.change_password(params))
            .await
    }

    pub async fn mark_email_verified(&self, username: &str, at: DateTime<Utc>) -> LedgerResult<User> {
        let username = username.to_string();
        self.run_in_transaction(move |q| {
            Box::pin(async move { q.mark_email_verified(&username, at).await })
        })
        .await
    }

    // sessions

    pub async fn create_session(&self, params: CreateSessionParams) -> LedgerResult<Session> {
        self.run_in_transaction(move |q| q.create_session(params))
            .await
    }

    pub async fn get_session(&self, id: SessionId) -> LedgerResult<Session> {
        self.run_in_transaction(move |q| q.get_session(id)).await
    }

    pub async fn revoke_session(&self, id: SessionId) -> LedgerResult<Session> {
        self.run_in_transaction(move |q| q.revoke_session(id)).await
    }

    // outbox

    pub async fn enqueue_outbox(&self, message: NewOutboxMessage) -> LedgerResult<OutboxMessage> {
        self.run_in_transaction(move |q| q.enqueue_outbox(message))
            .await
    }

    pub async fn list_outbox(
        &self,
        status: Option<OutboxStatus>,
        limit: u32,
    ) -> LedgerResult<Vec<OutboxMessage>> {
        self.run_in_transaction(move |q| q.list_outbox(status, limit))
            .await
    }
}
