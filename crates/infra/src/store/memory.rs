//! In-memory store backend.
//!
//! Intended for tests/dev. It models the parts of a row-locking SQL database
//! the workflows depend on:
//!
//! - a bounded connection pool (`begin` waits up to the acquire timeout);
//! - exclusive row locks held until commit or rollback, with a lock-wait
//!   timeout instead of deadlock detection;
//! - read-committed visibility: a transaction sees committed rows plus its own
//!   uncommitted writes, and nobody else sees those writes before commit;
//! - sequences that are not rolled back;
//! - foreign-key, uniqueness and non-negative balance constraints.
//!
//! Committed state sits behind a `std::sync::RwLock` that is only ever held
//! for a synchronous copy and never across an `.await`.
//!
//! Faults can be injected into the next `begin`, `commit` or `rollback` to
//! exercise the transaction runner's failure paths.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as RowMutex, OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use housebank_accounting::{
    Account, BalanceAdjustment, CreateAccountParams, CreateEntryParams, CreateTransferParams,
    Entry, ListAccountsParams, ListEntriesParams, ListTransfersParams, Transfer,
    UpdateAccountBalanceParams,
};
use housebank_auth::{
    ChangePasswordParams, CreateSessionParams, CreateUserParams, Session, UpdateUserParams, User,
};
use housebank_core::{
    AccountId, EntryId, LedgerError, LedgerResult, OutboxId, SessionId, TransferId,
};

use crate::config::LedgerConfig;
use crate::outbox::{NewOutboxMessage, OutboxMessage, OutboxStatus};

use super::r#trait::{Database, Queries, Transaction};

/// Copy of every table, keyed by primary key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemorySnapshot {
    pub accounts: BTreeMap<AccountId, Account>,
    pub entries: BTreeMap<EntryId, Entry>,
    pub transfers: BTreeMap<TransferId, Transfer>,
    pub users: BTreeMap<String, User>,
    pub sessions: BTreeMap<SessionId, Session>,
    pub outbox: BTreeMap<OutboxId, OutboxMessage>,
}

impl MemorySnapshot {
    /// Sum of all account balances.
    pub fn total_balance(&self) -> i64 {
        self.accounts.values().map(|a| a.balance).sum()
    }

    /// Sum of all entry amounts for one account.
    pub fn entry_sum(&self, account_id: AccountId) -> i64 {
        self.entries
            .values()
            .filter(|e| e.account_id == account_id)
            .map(|e| e.amount)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RowKey {
    Account(AccountId),
    Username(String),
    Email(String),
    Outbox(OutboxId),
}

#[derive(Debug, Default)]
struct Faults {
    begin: AtomicBool,
    commit: AtomicBool,
    rollback: AtomicBool,
    /// Pause after each newly acquired row lock, in microseconds.
    lock_hold_micros: AtomicU64,
}

#[derive(Debug, Default)]
struct Sequences {
    account: AtomicI64,
    entry: AtomicI64,
    transfer: AtomicI64,
    outbox: AtomicI64,
}

fn next_id(counter: &AtomicI64) -> i64 {
    counter.fetch_add(1, Ordering::SeqCst) + 1
}

#[derive(Debug)]
struct Shared {
    committed: RwLock<MemorySnapshot>,
    row_locks: Mutex<HashMap<RowKey, Arc<RowMutex<()>>>>,
    pool: Arc<Semaphore>,
    acquire_timeout: Duration,
    lock_timeout: Duration,
    sequences: Sequences,
    faults: Faults,
}

impl Shared {
    fn read(&self) -> LedgerResult<RwLockReadGuard<'_, MemorySnapshot>> {
        self.committed
            .read()
            .map_err(|_| LedgerError::infrastructure("memory", "state lock poisoned"))
    }

    fn row_lock(&self, key: &RowKey) -> LedgerResult<Arc<RowMutex<()>>> {
        let mut locks = self
            .row_locks
            .lock()
            .map_err(|_| LedgerError::infrastructure("memory", "row lock table poisoned"))?;
        Ok(Arc::clone(locks.entry(key.clone()).or_default()))
    }

    /// Forget lock entries nobody holds or waits for.
    fn prune_row_locks(&self) {
        if let Ok(mut locks) = self.row_locks.lock() {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
    }
}

/// In-memory [`Database`].
///
/// Clones share the same state, like clones of a connection pool.
#[derive(Debug, Clone)]
pub struct MemoryDatabase {
    shared: Arc<Shared>,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::with_config(&LedgerConfig::default())
    }

    /// Uses the pool size, acquire timeout and lock timeout from `config`.
    pub fn with_config(config: &LedgerConfig) -> Self {
        let connections = usize::try_from(config.max_connections.max(1)).unwrap_or(1);
        Self {
            shared: Arc::new(Shared {
                committed: RwLock::new(MemorySnapshot::default()),
                row_locks: Mutex::new(HashMap::new()),
                pool: Arc::new(Semaphore::new(connections)),
                acquire_timeout: config.acquire_timeout,
                lock_timeout: config.lock_timeout,
                sequences: Sequences::default(),
                faults: Faults::default(),
            }),
        }
    }

    /// Copy of the committed state.
    pub fn snapshot(&self) -> LedgerResult<MemorySnapshot> {
        Ok(self.shared.read()?.clone())
    }

    /// Connections currently free in the pool.
    pub fn idle_connections(&self) -> usize {
        self.shared.pool.available_permits()
    }

    /// Make the next `begin` fail as if the server were unreachable.
    pub fn fail_next_begin(&self) {
        self.shared.faults.begin.store(true, Ordering::SeqCst);
    }

    /// Make the next `commit` fail; the transaction's writes are discarded.
    pub fn fail_next_commit(&self) {
        self.shared.faults.commit.store(true, Ordering::SeqCst);
    }

    /// Yield for `pause` after every newly acquired row lock, so concurrent
    /// transactions interleave while holding locks.
    pub fn pause_after_row_lock(&self, pause: Duration) {
        let micros = u64::try_from(pause.as_micros()).unwrap_or(u64::MAX);
        self.shared
            .faults
            .lock_hold_micros
            .store(micros, Ordering::SeqCst);
    }

    /// Make the next `rollback` report a failure; the writes are discarded anyway.
    pub fn fail_next_rollback(&self) {
        self.shared.faults.rollback.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> LedgerResult<MemoryTransaction> {
        if self.shared.faults.begin.swap(false, Ordering::SeqCst) {
            return Err(LedgerError::infrastructure("begin", "connection refused"));
        }

        let pool = Arc::clone(&self.shared.pool);
        let permit = tokio::time::timeout(self.shared.acquire_timeout, pool.acquire_owned())
            .await
            .map_err(|_| {
                LedgerError::infrastructure(
                    "begin",
                    "pool timed out while waiting for an open connection",
                )
            })?
            .map_err(|_| LedgerError::infrastructure("begin", "connection pool closed"))?;

        Ok(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            staged: MemorySnapshot::default(),
            deleted_accounts: BTreeSet::new(),
            held: HashMap::new(),
            finished: false,
            _connection: permit,
        })
    }
}

/// An open in-memory transaction.
///
/// Dropping it without [`commit`](Transaction::commit) discards its writes
/// and releases its row locks and connection.
pub struct MemoryTransaction {
    shared: Arc<Shared>,
    staged: MemorySnapshot,
    deleted_accounts: BTreeSet<AccountId>,
    held: HashMap<RowKey, OwnedMutexGuard<()>>,
    finished: bool,
    _connection: OwnedSemaphorePermit,
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            debug!(
                locks = self.held.len(),
                "in-memory transaction dropped without commit; discarding writes"
            );
        }
        self.held.clear();
        self.shared.prune_row_locks();
    }
}

/// Committed rows overlaid with staged rows, filtered, in key order.
fn merged_rows<K: Ord, V: Clone>(
    committed: &BTreeMap<K, V>,
    staged: &BTreeMap<K, V>,
    keep: impl Fn(&V) -> bool,
) -> Vec<V> {
    let mut rows: BTreeMap<&K, &V> = committed.iter().filter(|(_, v)| keep(v)).collect();
    for (key, value) in staged {
        if keep(value) {
            rows.insert(key, value);
        } else {
            rows.remove(key);
        }
    }
    rows.into_values().cloned().collect()
}

fn page<V>(rows: Vec<V>, limit: u32, offset: u32) -> Vec<V> {
    rows.into_iter()
        .skip(offset as usize)
        .take(limit as usize)
        .collect()
}

impl MemoryTransaction {
    async fn lock_row(&mut self, key: RowKey) -> LedgerResult<()> {
        if self.held.contains_key(&key) {
            return Ok(());
        }
        let lock = self.shared.row_lock(&key)?;
        match tokio::time::timeout(self.shared.lock_timeout, lock.lock_owned()).await {
            Ok(guard) => {
                self.held.insert(key, guard);
                let pause = self.shared.faults.lock_hold_micros.load(Ordering::SeqCst);
                if pause > 0 {
                    tokio::time::sleep(Duration::from_micros(pause)).await;
                }
                Ok(())
            }
            Err(_) => Err(LedgerError::LockTimeout(format!(
                "canceling statement due to lock timeout on {key:?}"
            ))),
        }
    }

    /// `SKIP LOCKED`: take the lock only if nobody holds it.
    fn try_lock_row(&mut self, key: RowKey) -> LedgerResult<bool> {
        if self.held.contains_key(&key) {
            return Ok(true);
        }
        let lock = self.shared.row_lock(&key)?;
        match lock.try_lock_owned() {
            Ok(guard) => {
                self.held.insert(key, guard);
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    fn account(&self, id: AccountId) -> LedgerResult<Option<Account>> {
        if self.deleted_accounts.contains(&id) {
            return Ok(None);
        }
        if let Some(account) = self.staged.accounts.get(&id) {
            return Ok(Some(account.clone()));
        }
        Ok(self.shared.read()?.accounts.get(&id).cloned())
    }

    fn require_account(&self, id: AccountId) -> LedgerResult<Account> {
        self.account(id)?
            .ok_or_else(|| LedgerError::not_found("account", id))
    }

    fn user(&self, username: &str) -> LedgerResult<Option<User>> {
        if let Some(user) = self.staged.users.get(username) {
            return Ok(Some(user.clone()));
        }
        Ok(self.shared.read()?.users.get(username).cloned())
    }

    fn require_user(&self, username: &str) -> LedgerResult<User> {
        self.user(username)?
            .ok_or_else(|| LedgerError::not_found("user", username))
    }

    fn email_taken(&self, email: &str, except: Option<&str>) -> LedgerResult<bool> {
        let committed = self.shared.read()?;
        let taken = merged_rows(&committed.users, &self.staged.users, |u| u.email == email)
            .iter()
            .any(|u| Some(u.username.as_str()) != except);
        Ok(taken)
    }

    fn account_is_referenced(&self, id: AccountId) -> LedgerResult<bool> {
        let committed = self.shared.read()?;
        let in_entries = committed
            .entries
            .values()
            .chain(self.staged.entries.values())
            .any(|e| e.account_id == id);
        let in_transfers = committed
            .transfers
            .values()
            .chain(self.staged.transfers.values())
            .any(|t| t.from_account_id == id || t.to_account_id == id);
        Ok(in_entries || in_transfers)
    }

    fn outbox_row(&self, id: OutboxId) -> LedgerResult<OutboxMessage> {
        if let Some(message) = self.staged.outbox.get(&id) {
            return Ok(message.clone());
        }
        self.shared
            .read()?
            .outbox
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("outbox message", id))
    }

    async fn stage_account_write(
        &mut self,
        id: AccountId,
        write: impl FnOnce(&mut Account) -> LedgerResult<()> + Send,
    ) -> LedgerResult<Account> {
        self.lock_row(RowKey::Account(id)).await?;
        let mut account = self.require_account(id)?;
        write(&mut account)?;
        self.staged.accounts.insert(id, account.clone());
        Ok(account)
    }

    async fn stage_user_write(
        &mut self,
        username: &str,
        write: impl FnOnce(&mut User) + Send,
    ) -> LedgerResult<User> {
        self.lock_row(RowKey::Username(username.to_string())).await?;
        let mut user = self.require_user(username)?;
        write(&mut user);
        self.staged.users.insert(user.username.clone(), user.clone());
        Ok(user)
    }

    async fn stage_outbox_write(
        &mut self,
        id: OutboxId,
        write: impl FnOnce(&mut OutboxMessage) + Send,
    ) -> LedgerResult<OutboxMessage> {
        self.lock_row(RowKey::Outbox(id)).await?;
        let mut message = self.outbox_row(id)?;
        write(&mut message);
        self.staged.outbox.insert(id, message.clone());
        Ok(message)
    }
}

#[async_trait]
impl Queries for MemoryTransaction {
    async fn create_account(&mut self, params: CreateAccountParams) -> LedgerResult<Account> {
        params.validate()?;
        let id = AccountId::new(next_id(&self.shared.sequences.account));
        self.lock_row(RowKey::Account(id)).await?;

        let account = Account {
            id,
            owner: params.owner,
            balance: params.balance,
            currency: params.currency,
            created_at: Utc::now(),
        };
        self.staged.accounts.insert(id, account.clone());
        Ok(account)
    }

    async fn get_account(&mut self, id: AccountId) -> LedgerResult<Account> {
        self.require_account(id)
    }

    async fn get_account_for_update(&mut self, id: AccountId) -> LedgerResult<Account> {
        self.lock_row(RowKey::Account(id)).await?;
        self.require_account(id)
    }

    async fn list_accounts(&mut self, params: ListAccountsParams) -> LedgerResult<Vec<Account>> {
        let rows = {
            let committed = self.shared.read()?;
            merged_rows(&committed.accounts, &self.staged.accounts, |a| {
                !self.deleted_accounts.contains(&a.id)
                    && params.owner.as_ref().is_none_or(|owner| &a.owner == owner)
            })
        };
        Ok(page(rows, params.limit, params.offset))
    }

    async fn update_account_balance(
        &mut self,
        params: UpdateAccountBalanceParams,
    ) -> LedgerResult<Account> {
        if params.balance < 0 {
            return Err(LedgerError::validation("balance must not be negative"));
        }
        self.stage_account_write(params.id, |account| {
            account.balance = params.balance;
            Ok(())
        })
        .await
    }

    async fn add_account_balance(
        &mut self,
        adjustment: BalanceAdjustment,
    ) -> LedgerResult<Account> {
        self.stage_account_write(adjustment.account_id, |account| {
            account.balance = account.balance_after(adjustment.delta)?;
            Ok(())
        })
        .await
    }

    async fn delete_account(&mut self, id: AccountId) -> LedgerResult<()> {
        self.lock_row(RowKey::Account(id)).await?;
        self.require_account(id)?;
        if self.account_is_referenced(id)? {
            return Err(LedgerError::conflict(format!(
                "account {id} is still referenced by entries or transfers"
            )));
        }
        self.staged.accounts.remove(&id);
        self.deleted_accounts.insert(id);
        Ok(())
    }

    async fn create_entry(&mut self, params: CreateEntryParams) -> LedgerResult<Entry> {
        self.require_account(params.account_id)?;
        let entry = Entry {
            id: EntryId::new(next_id(&self.shared.sequences.entry)),
            account_id: params.account_id,
            amount: params.amount,
            created_at: Utc::now(),
        };
        self.staged.entries.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn get_entry(&mut self, id: EntryId) -> LedgerResult<Entry> {
        if let Some(entry) = self.staged.entries.get(&id) {
            return Ok(entry.clone());
        }
        self.shared
            .read()?
            .entries
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("entry", id))
    }

    async fn list_entries(&mut self, params: ListEntriesParams) -> LedgerResult<Vec<Entry>> {
        let rows = {
            let committed = self.shared.read()?;
            merged_rows(&committed.entries, &self.staged.entries, |e| {
                e.account_id == params.account_id
            })
        };
        Ok(page(rows, params.limit, params.offset))
    }

    async fn create_transfer(&mut self, params: CreateTransferParams) -> LedgerResult<Transfer> {
        if params.amount <= 0 {
            return Err(LedgerError::validation("transfer amount must be positive"));
        }
        self.require_account(params.from_account_id)?;
        self.require_account(params.to_account_id)?;

        let transfer = Transfer {
            id: TransferId::new(next_id(&self.shared.sequences.transfer)),
            from_account_id: params.from_account_id,
            to_account_id: params.to_account_id,
            amount: params.amount,
            created_at: Utc::now(),
        };
        self.staged.transfers.insert(transfer.id, transfer.clone());
        Ok(transfer)
    }

    async fn get_transfer(&mut self, id: TransferId) -> LedgerResult<Transfer> {
        if let Some(transfer) = self.staged.transfers.get(&id) {
            return Ok(transfer.clone());
        }
        self.shared
            .read()?
            .transfers
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("transfer", id))
    }

    async fn list_transfers(
        &mut self,
        params: ListTransfersParams,
    ) -> LedgerResult<Vec<Transfer>> {
        let (a, b) = (params.from_account_id, params.to_account_id);
        let rows = {
            let committed = self.shared.read()?;
            merged_rows(&committed.transfers, &self.staged.transfers, |t| {
                (t.from_account_id == a && t.to_account_id == b)
                    || (t.from_account_id == b && t.to_account_id == a)
            })
        };
        Ok(page(rows, params.limit, params.offset))
    }

    async fn create_user(&mut self, params: CreateUserParams) -> LedgerResult<User> {
        params.validate()?;
        self.lock_row(RowKey::Username(params.username.clone()))
            .await?;
        self.lock_row(RowKey::Email(params.email.clone())).await?;

        if self.user(&params.username)?.is_some() {
            return Err(LedgerError::conflict(format!(
                "username {} already exists",
                params.username
            )));
        }
        if self.email_taken(&params.email, None)? {
            return Err(LedgerError::conflict(format!(
                "email {} already exists",
                params.email
            )));
        }

        let now = Utc::now();
        let user = User {
            username: params.username,
            full_name: params.full_name,
            email: params.email,
            hashed_password: params.hashed_password,
            password_changed_at: now,
            email_verified_at: None,
            created_at: now,
        };
        self.staged.users.insert(user.username.clone(), user.clone());
        Ok(user)
    }

    async fn get_user(&mut self, username: &str) -> LedgerResult<User> {
        self.require_user(username)
    }

    async fn update_user(&mut self, params: UpdateUserParams) -> LedgerResult<User> {
        if let Some(email) = &params.email {
            self.lock_row(RowKey::Email(email.clone())).await?;
            if self.email_taken(email, Some(&params.username))? {
                return Err(LedgerError::conflict(format!("email {email} already exists")));
            }
        }
        let username = params.username.clone();
        self.stage_user_write(&username, |user| params.apply_to(user))
            .await
    }

    async fn change_password(&mut self, params: ChangePasswordParams) -> LedgerResult<User> {
        self.stage_user_write(&params.username, |user| {
            user.hashed_password = params.hashed_password.clone();
            user.password_changed_at = params.password_changed_at;
        })
        .await
    }

    async fn create_session(&mut self, params: CreateSessionParams) -> LedgerResult<Session> {
        self.require_user(&params.username)?;
        let exists = self.staged.sessions.contains_key(&params.id)
            || self.shared.read()?.sessions.contains_key(&params.id);
        if exists {
            return Err(LedgerError::conflict(format!(
                "session {} already exists",
                params.id
            )));
        }

        let session = Session {
            id: params.id,
            username: params.username,
            refresh_token: params.refresh_token,
            user_agent: params.user_agent,
            client_ip: params.client_ip,
            is_blocked: false,
            expires_at: params.expires_at,
            created_at: Utc::now(),
        };
        self.staged.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_session(&mut self, id: SessionId) -> LedgerResult<Session> {
        if let Some(session) = self.staged.sessions.get(&id) {
            return Ok(session.clone());
        }
        self.shared
            .read()?
            .sessions
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("session", id))
    }

    async fn revoke_session(&mut self, id: SessionId) -> LedgerResult<Session> {
        let mut session = self.get_session(id).await?;
        session.is_blocked = true;
        self.staged.sessions.insert(id, session.clone());
        Ok(session)
    }

    async fn enqueue_outbox(&mut self, message: NewOutboxMessage) -> LedgerResult<OutboxMessage> {
        let id = OutboxId::new(next_id(&self.shared.sequences.outbox));
        self.lock_row(RowKey::Outbox(id)).await?;

        let now = Utc::now();
        let row = OutboxMessage {
            id,
            topic: message.topic,
            payload: message.payload,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            available_at: message.available_at.unwrap_or(now),
            delivered_at: None,
            created_at: now,
        };
        self.staged.outbox.insert(id, row.clone());
        Ok(row)
    }

    async fn claim_outbox(
        &mut self,
        limit: u32,
        now: DateTime<Utc>,
    ) -> LedgerResult<Vec<OutboxMessage>> {
        let candidates: Vec<OutboxId> = {
            let committed = self.shared.read()?;
            merged_rows(&committed.outbox, &self.staged.outbox, |m| m.is_due(now))
                .into_iter()
                .map(|m| m.id)
                .collect()
        };

        let mut claimed = Vec::new();
        for id in candidates {
            if claimed.len() >= limit as usize {
                break;
            }
            if !self.try_lock_row(RowKey::Outbox(id))? {
                continue;
            }
            // Another transaction may have finished with the row between the
            // scan and the lock.
            let row = self.outbox_row(id)?;
            if row.is_due(now) {
                claimed.push(row);
            }
        }
        Ok(claimed)
    }

    async fn mark_outbox_delivered(
        &mut self,
        id: OutboxId,
        at: DateTime<Utc>,
    ) -> LedgerResult<OutboxMessage> {
        self.stage_outbox_write(id, |message| {
            message.status = OutboxStatus::Delivered;
            message.attempts += 1;
            message.delivered_at = Some(at);
        })
        .await
    }

    async fn mark_outbox_failed(
        &mut self,
        id: OutboxId,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> LedgerResult<OutboxMessage> {
        let error = error.to_string();
        self.stage_outbox_write(id, |message| {
            message.attempts += 1;
            message.last_error = Some(error);
            match retry_at {
                Some(at) => {
                    message.status = OutboxStatus::Pending;
                    message.available_at = at;
                }
                None => message.status = OutboxStatus::DeadLettered,
            }
        })
        .await
    }

    async fn list_outbox(
        &mut self,
        status: Option<OutboxStatus>,
        limit: u32,
    ) -> LedgerResult<Vec<OutboxMessage>> {
        let rows = {
            let committed = self.shared.read()?;
            merged_rows(&committed.outbox, &self.staged.outbox, |m| {
                status.is_none_or(|s| m.status == s)
            })
        };
        Ok(page(rows, limit, 0))
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn commit(mut self) -> LedgerResult<()> {
        self.finished = true;
        if self.shared.faults.commit.swap(false, Ordering::SeqCst) {
            return Err(LedgerError::infrastructure(
                "commit",
                "connection reset by peer",
            ));
        }

        let staged = std::mem::take(&mut self.staged);
        let deleted = std::mem::take(&mut self.deleted_accounts);
        {
            let mut committed = self
                .shared
                .committed
                .write()
                .map_err(|_| LedgerError::infrastructure("commit", "state lock poisoned"))?;
            committed.accounts.extend(staged.accounts);
            for id in &deleted {
                committed.accounts.remove(id);
            }
            committed.entries.extend(staged.entries);
            committed.transfers.extend(staged.transfers);
            committed.users.extend(staged.users);
            committed.sessions.extend(staged.sessions);
            committed.outbox.extend(staged.outbox);
        }
        Ok(())
    }

    async fn rollback(mut self) -> LedgerResult<()> {
        self.finished = true;
        if self.shared.faults.rollback.swap(false, Ordering::SeqCst) {
            return Err(LedgerError::infrastructure(
                "rollback",
                "connection reset by peer",
            ));
        }
        Ok(())
    }
}
