//! Postgres-backed store.
//!
//! Each [`PgTransaction`] wraps one `sqlx` transaction on a pooled
//! connection. Row locks, the non-negative balance rule and referential
//! integrity are enforced by the database itself (see `schema.sql`).
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `LedgerError` as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | LedgerError | Scenario |
//! |------------|----------------------|-------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | Duplicate username/email/session |
//! | Database (foreign key violation) | `23503` | `NotFound` / `Conflict` | Missing account or user; delete of a referenced account |
//! | Database (check violation on `accounts_balance_nonnegative`) | `23514` | `InsufficientFunds` | Debit below zero |
//! | Database (other check violation) | `23514` | `Validation` | e.g. non-positive transfer amount |
//! | Database (numeric out of range) | `22003` | `Validation` | Balance overflow |
//! | Database (deadlock detected) | `40P01` | `Deadlock` | Circular lock wait |
//! | Database (lock not available) | `55P03` | `LockTimeout` | `lock_timeout` elapsed |
//! | Database (query canceled) | `57014` | `Infrastructure` | `statement_timeout` elapsed |
//! | PoolTimedOut / PoolClosed / Io / Tls | N/A | `Infrastructure` | Pool exhausted, connection lost |
//! | RowNotFound | N/A | `NotFound` | Unexpected missing row |
//! | Other | N/A | `Infrastructure` | Anything else |

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::{FromRow, Postgres, Row};
use tracing::{info, instrument};

use housebank_accounting::{
    Account, BalanceAdjustment, CreateAccountParams, CreateEntryParams, CreateTransferParams,
    Entry, ListAccountsParams, ListEntriesParams, ListTransfersParams, Transfer,
    UpdateAccountBalanceParams,
};
use housebank_auth::{
    ChangePasswordParams, CreateSessionParams, CreateUserParams, Session, UpdateUserParams, User,
};
use housebank_core::{
    AccountId, Currency, EntryId, LedgerError, LedgerResult, OutboxId, SessionId, TransferId,
};

use crate::config::LedgerConfig;
use crate::outbox::{NewOutboxMessage, OutboxMessage, OutboxStatus};

use super::r#trait::{Database, Queries, Transaction};

/// Idempotent DDL for every ledger table.
pub const SCHEMA: &str = include_str!("schema.sql");

const BALANCE_CONSTRAINT: &str = "accounts_balance_nonnegative";

const ACCOUNT_COLUMNS: &str = "id, owner, balance, currency, created_at";
const ENTRY_COLUMNS: &str = "id, account_id, amount, created_at";
const TRANSFER_COLUMNS: &str = "id, from_account_id, to_account_id, amount, created_at";
const USER_COLUMNS: &str = "username, full_name, email, hashed_password, password_changed_at, \
                            email_verified_at, created_at";
const SESSION_COLUMNS: &str = "id, username, refresh_token, user_agent, client_ip, is_blocked, \
                               expires_at, created_at";
const OUTBOX_COLUMNS: &str = "id, topic, payload, status, attempts, last_error, available_at, \
                              delivered_at, created_at";

/// Postgres [`Database`] over a shared connection pool.
///
/// `Send + Sync`; clones share the pool.
#[derive(Debug, Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build a pool from `config`. Every pooled session gets the configured
    /// `statement_timeout` and `lock_timeout`.
    pub async fn connect(config: &LedgerConfig) -> LedgerResult<Self> {
        let options = PgConnectOptions::from_str(&config.database_url)
            .map_err(|e| map_sqlx_error("connect", e))?
            .options([
                (
                    "statement_timeout",
                    config.statement_timeout.as_millis().to_string(),
                ),
                ("lock_timeout", config.lock_timeout.as_millis().to_string()),
            ]);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        info!(max_connections = config.max_connections, "connected to postgres");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create any missing tables and indexes.
    pub async fn ensure_schema(&self) -> LedgerResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

#[async_trait]
impl Database for PgDatabase {
    type Tx = PgTransaction;

    #[instrument(skip(self), err)]
    async fn begin(&self) -> LedgerResult<PgTransaction> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        Ok(PgTransaction { tx })
    }
}

/// One open Postgres transaction. Dropping it rolls back.
pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl Queries for PgTransaction {
    async fn create_account(&mut self, params: CreateAccountParams) -> LedgerResult<Account> {
        params.validate()?;
        let sql = format!(
            "INSERT INTO accounts (owner, balance, currency) VALUES ($1, $2, $3) \
             RETURNING {ACCOUNT_COLUMNS}"
        );
        sqlx::query_as::<_, AccountRow>(&sql)
            .bind(&params.owner)
            .bind(params.balance)
            .bind(params.currency.as_str())
            .fetch_one(&mut *self.tx)
            .await
            .map(|row| row.0)
            .map_err(|e| map_sqlx_error("create_account", e))
    }

    async fn get_account(&mut self, id: AccountId) -> LedgerResult<Account> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 LIMIT 1");
        fetch_account(&mut self.tx, &sql, id, "get_account").await
    }

    async fn get_account_for_update(&mut self, id: AccountId) -> LedgerResult<Account> {
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 LIMIT 1 FOR NO KEY UPDATE"
        );
        fetch_account(&mut self.tx, &sql, id, "get_account_for_update").await
    }

    async fn list_accounts(&mut self, params: ListAccountsParams) -> LedgerResult<Vec<Account>> {
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts \
             WHERE ($1::varchar IS NULL OR owner = $1) \
             ORDER BY id LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(params.owner.as_deref())
            .bind(i64::from(params.limit))
            .bind(i64::from(params.offset))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_accounts", e))?;
        Ok(rows.into_iter().map(|row| row.0).collect())
    }

    async fn update_account_balance(
        &mut self,
        params: UpdateAccountBalanceParams,
    ) -> LedgerResult<Account> {
        let sql = format!(
            "UPDATE accounts SET balance = $2 WHERE id = $1 RETURNING {ACCOUNT_COLUMNS}"
        );
        sqlx::query_as::<_, AccountRow>(&sql)
            .bind(params.id.get())
            .bind(params.balance)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("update_account_balance", e))?
            .map(|row| row.0)
            .ok_or_else(|| LedgerError::not_found("account", params.id))
    }

    #[instrument(
        skip(self),
        fields(account_id = %adjustment.account_id, delta = adjustment.delta),
        err
    )]
    async fn add_account_balance(
        &mut self,
        adjustment: BalanceAdjustment,
    ) -> LedgerResult<Account> {
        let sql = format!(
            "UPDATE accounts SET balance = balance + $2 WHERE id = $1 RETURNING {ACCOUNT_COLUMNS}"
        );
        sqlx::query_as::<_, AccountRow>(&sql)
            .bind(adjustment.account_id.get())
            .bind(adjustment.delta)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| {
                if is_check_violation(&e, BALANCE_CONSTRAINT) {
                    LedgerError::InsufficientFunds {
                        account_id: adjustment.account_id.get(),
                        delta: adjustment.delta,
                    }
                } else {
                    map_sqlx_error("add_account_balance", e)
                }
            })?
            .map(|row| row.0)
            .ok_or_else(|| LedgerError::not_found("account", adjustment.account_id))
    }

    async fn delete_account(&mut self, id: AccountId) -> LedgerResult<()> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id.get())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_account", e))?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::not_found("account", id));
        }
        Ok(())
    }

    async fn create_entry(&mut self, params: CreateEntryParams) -> LedgerResult<Entry> {
        let sql =
            format!("INSERT INTO entries (account_id, amount) VALUES ($1, $2) RETURNING {ENTRY_COLUMNS}");
        sqlx::query_as::<_, EntryRow>(&sql)
            .bind(params.account_id.get())
            .bind(params.amount)
            .fetch_one(&mut *self.tx)
            .await
            .map(|row| row.0)
            .map_err(|e| map_sqlx_error("create_entry", e))
    }

    async fn get_entry(&mut self, id: EntryId) -> LedgerResult<Entry> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = $1 LIMIT 1");
        sqlx::query_as::<_, EntryRow>(&sql)
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_entry", e))?
            .map(|row| row.0)
            .ok_or_else(|| LedgerError::not_found("entry", id))
    }

    async fn list_entries(&mut self, params: ListEntriesParams) -> LedgerResult<Vec<Entry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE account_id = $1 \
             ORDER BY id LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(params.account_id.get())
            .bind(i64::from(params.limit))
            .bind(i64::from(params.offset))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_entries", e))?;
        Ok(rows.into_iter().map(|row| row.0).collect())
    }

    #[instrument(
        skip(self),
        fields(
            from = %params.from_account_id,
            to = %params.to_account_id,
            amount = params.amount
        ),
        err
    )]
    async fn create_transfer(&mut self, params: CreateTransferParams) -> LedgerResult<Transfer> {
        if params.amount <= 0 {
            return Err(LedgerError::validation("transfer amount must be positive"));
        }
        let sql = format!(
            "INSERT INTO transfers (from_account_id, to_account_id, amount) \
             VALUES ($1, $2, $3) RETURNING {TRANSFER_COLUMNS}"
        );
        sqlx::query_as::<_, TransferRow>(&sql)
            .bind(params.from_account_id.get())
            .bind(params.to_account_id.get())
            .bind(params.amount)
            .fetch_one(&mut *self.tx)
            .await
            .map(|row| row.0)
            .map_err(|e| map_sqlx_error("create_transfer", e))
    }

    async fn get_transfer(&mut self, id: TransferId) -> LedgerResult<Transfer> {
        let sql = format!("SELECT {TRANSFER_COLUMNS} FROM transfers WHERE id = $1 LIMIT 1");
        sqlx::query_as::<_, TransferRow>(&sql)
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_transfer", e))?
            .map(|row| row.0)
            .ok_or_else(|| LedgerError::not_found("transfer", id))
    }

    async fn list_transfers(
        &mut self,
        params: ListTransfersParams,
    ) -> LedgerResult<Vec<Transfer>> {
        let sql = format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers \
             WHERE (from_account_id = $1 AND to_account_id = $2) \
                OR (from_account_id = $2 AND to_account_id = $1) \
             ORDER BY id LIMIT $3 OFFSET $4"
        );
        let rows = sqlx::query_as::<_, TransferRow>(&sql)
            .bind(params.from_account_id.get())
            .bind(params.to_account_id.get())
            .bind(i64::from(params.limit))
            .bind(i64::from(params.offset))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_transfers", e))?;
        Ok(rows.into_iter().map(|row| row.0).collect())
    }

    async fn create_user(&mut self, params: CreateUserParams) -> LedgerResult<User> {
        params.validate()?;
        let sql = format!(
            "INSERT INTO users (username, full_name, email, hashed_password) \
             VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(&params.username)
            .bind(&params.full_name)
            .bind(&params.email)
            .bind(&params.hashed_password)
            .fetch_one(&mut *self.tx)
            .await
            .map(|row| row.0)
            .map_err(|e| map_sqlx_error("create_user", e))
    }

    async fn get_user(&mut self, username: &str) -> LedgerResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1 LIMIT 1");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(username)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_user", e))?
            .map(|row| row.0)
            .ok_or_else(|| LedgerError::not_found("user", username))
    }

    async fn update_user(&mut self, params: UpdateUserParams) -> LedgerResult<User> {
        let sql = format!(
            "UPDATE users SET \
                full_name = COALESCE($2, full_name), \
                email = COALESCE($3, email), \
                email_verified_at = COALESCE($4, email_verified_at) \
             WHERE username = $1 RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(&params.username)
            .bind(params.full_name.as_deref())
            .bind(params.email.as_deref())
            .bind(params.email_verified_at)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("update_user", e))?
            .map(|row| row.0)
            .ok_or_else(|| LedgerError::not_found("user", &params.username))
    }

    async fn change_password(&mut self, params: ChangePasswordParams) -> LedgerResult<User> {
        let sql = format!(
            "UPDATE users SET hashed_password = $2, password_changed_at = $3 \
             WHERE username = $1 RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(&params.username)
            .bind(&params.hashed_password)
            .bind(params.password_changed_at)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("change_password", e))?
            .map(|row| row.0)
            .ok_or_else(|| LedgerError::not_found("user", &params.username))
    }

    async fn create_session(&mut self, params: CreateSessionParams) -> LedgerResult<Session> {
        let sql = format!(
            "INSERT INTO sessions (id, username, refresh_token, user_agent, client_ip, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {SESSION_COLUMNS}"
        );
        sqlx::query_as::<_, SessionRow>(&sql)
            .bind(*params.id.as_uuid())
            .bind(&params.username)
            .bind(&params.refresh_token)
            .bind(&params.user_agent)
            .bind(&params.client_ip)
            .bind(params.expires_at)
            .fetch_one(&mut *self.tx)
            .await
            .map(|row| row.0)
            .map_err(|e| map_sqlx_error("create_session", e))
    }

    async fn get_session(&mut self, id: SessionId) -> LedgerResult<Session> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1 LIMIT 1");
        sqlx::query_as::<_, SessionRow>(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_session", e))?
            .map(|row| row.0)
            .ok_or_else(|| LedgerError::not_found("session", id))
    }

    async fn revoke_session(&mut self, id: SessionId) -> LedgerResult<Session> {
        let sql = format!(
            "UPDATE sessions SET is_blocked = true WHERE id = $1 RETURNING {SESSION_COLUMNS}"
        );
        sqlx::query_as::<_, SessionRow>(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("revoke_session", e))?
            .map(|row| row.0)
            .ok_or_else(|| LedgerError::not_found("session", id))
    }

    async fn enqueue_outbox(&mut self, message: NewOutboxMessage) -> LedgerResult<OutboxMessage> {
        let sql = format!(
            "INSERT INTO outbox (topic, payload, available_at) \
             VALUES ($1, $2, COALESCE($3, now())) RETURNING {OUTBOX_COLUMNS}"
        );
        sqlx::query_as::<_, OutboxRow>(&sql)
            .bind(&message.topic)
            .bind(&message.payload)
            .bind(message.available_at)
            .fetch_one(&mut *self.tx)
            .await
            .map(|row| row.0)
            .map_err(|e| map_sqlx_error("enqueue_outbox", e))
    }

    #[instrument(skip(self), err)]
    async fn claim_outbox(
        &mut self,
        limit: u32,
        now: DateTime<Utc>,
    ) -> LedgerResult<Vec<OutboxMessage>> {
        let sql = format!(
            "SELECT {OUTBOX_COLUMNS} FROM outbox \
             WHERE status = 'pending' AND available_at <= $1 \
             ORDER BY id LIMIT $2 \
             FOR UPDATE SKIP LOCKED"
        );
        let rows = sqlx::query_as::<_, OutboxRow>(&sql)
            .bind(now)
            .bind(i64::from(limit))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("claim_outbox", e))?;
        Ok(rows.into_iter().map(|row| row.0).collect())
    }

    async fn mark_outbox_delivered(
        &mut self,
        id: OutboxId,
        at: DateTime<Utc>,
    ) -> LedgerResult<OutboxMessage> {
        let sql = format!(
            "UPDATE outbox SET status = 'delivered', delivered_at = $2, attempts = attempts + 1 \
             WHERE id = $1 RETURNING {OUTBOX_COLUMNS}"
        );
        sqlx::query_as::<_, OutboxRow>(&sql)
            .bind(id.get())
            .bind(at)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("mark_outbox_delivered", e))?
            .map(|row| row.0)
            .ok_or_else(|| LedgerError::not_found("outbox message", id))
    }

    async fn mark_outbox_failed(
        &mut self,
        id: OutboxId,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> LedgerResult<OutboxMessage> {
        let sql = format!(
            "UPDATE outbox SET \
                attempts = attempts + 1, \
                last_error = $2, \
                status = CASE WHEN $3::timestamptz IS NULL THEN 'dead_lettered' ELSE 'pending' END, \
                available_at = COALESCE($3, available_at) \
             WHERE id = $1 RETURNING {OUTBOX_COLUMNS}"
        );
        sqlx::query_as::<_, OutboxRow>(&sql)
            .bind(id.get())
            .bind(error)
            .bind(retry_at)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("mark_outbox_failed", e))?
            .map(|row| row.0)
            .ok_or_else(|| LedgerError::not_found("outbox message", id))
    }

    async fn list_outbox(
        &mut self,
        status: Option<OutboxStatus>,
        limit: u32,
    ) -> LedgerResult<Vec<OutboxMessage>> {
        let sql = format!(
            "SELECT {OUTBOX_COLUMNS} FROM outbox \
             WHERE ($1::varchar IS NULL OR status = $1) \
             ORDER BY id LIMIT $2"
        );
        let rows = sqlx::query_as::<_, OutboxRow>(&sql)
            .bind(status.map(|s| s.as_str()))
            .bind(i64::from(limit))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_outbox", e))?;
        Ok(rows.into_iter().map(|row| row.0).collect())
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    #[instrument(skip(self), err)]
    async fn commit(self) -> LedgerResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }

    #[instrument(skip(self), err)]
    async fn rollback(self) -> LedgerResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

async fn fetch_account(
    tx: &mut sqlx::Transaction<'static, Postgres>,
    sql: &str,
    id: AccountId,
    operation: &str,
) -> LedgerResult<Account> {
    sqlx::query_as::<_, AccountRow>(sql)
        .bind(id.get())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error(operation, e))?
        .map(|row| row.0)
        .ok_or_else(|| LedgerError::not_found("account", id))
}

/// Map SQLx errors to `LedgerError`. See the module docs for the table.
pub fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());

            match db_err.code().as_deref() {
                Some("23505") => LedgerError::Conflict(msg),
                Some("23503") if operation.starts_with("delete") => LedgerError::Conflict(msg),
                Some("23503") => {
                    let entity = match db_err.constraint() {
                        Some(c) if c.starts_with("sessions_") => "user",
                        _ => "account",
                    };
                    LedgerError::NotFound { entity, key: msg }
                }
                Some("23514") | Some("22003") => LedgerError::Validation(msg),
                Some("40P01") => LedgerError::Deadlock(msg),
                Some("55P03") => LedgerError::LockTimeout(msg),
                _ => LedgerError::infrastructure(operation, msg),
            }
        }
        sqlx::Error::RowNotFound => LedgerError::not_found("row", operation),
        sqlx::Error::PoolTimedOut => LedgerError::infrastructure(
            operation,
            "pool timed out while waiting for an open connection",
        ),
        sqlx::Error::PoolClosed => {
            LedgerError::infrastructure(operation, "connection pool closed")
        }
        other => LedgerError::infrastructure(operation, other),
    }
}

fn is_check_violation(err: &sqlx::Error, constraint: &str) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().as_deref() == Some("23514") && db_err.constraint() == Some(constraint);
    }
    false
}

fn decode_error(err: LedgerError) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(err))
}

// SQLx row types

struct AccountRow(Account);

impl<'r> FromRow<'r, PgRow> for AccountRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let currency: String = row.try_get("currency")?;
        Ok(AccountRow(Account {
            id: AccountId::new(row.try_get("id")?),
            owner: row.try_get("owner")?,
            balance: row.try_get("balance")?,
            currency: Currency::new(currency).map_err(decode_error)?,
            created_at: row.try_get("created_at")?,
        }))
    }
}

struct EntryRow(Entry);

impl<'r> FromRow<'r, PgRow> for EntryRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(EntryRow(Entry {
            id: EntryId::new(row.try_get("id")?),
            account_id: AccountId::new(row.try_get("account_id")?),
            amount: row.try_get("amount")?,
            created_at: row.try_get("created_at")?,
        }))
    }
}

struct TransferRow(Transfer);

impl<'r> FromRow<'r, PgRow> for TransferRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(TransferRow(Transfer {
            id: TransferId::new(row.try_get("id")?),
            from_account_id: AccountId::new(row.try_get("from_account_id")?),
            to_account_id: AccountId::new(row.try_get("to_account_id")?),
            amount: row.try_get("amount")?,
            created_at: row.try_get("created_at")?,
        }))
    }
}

struct UserRow(User);

impl<'r> FromRow<'r, PgRow> for UserRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(UserRow(User {
            username: row.try_get("username")?,
            full_name: row.try_get("full_name")?,
            email: row.try_get("email")?,
            hashed_password: row.try_get("hashed_password")?,
            password_changed_at: row.try_get("password_changed_at")?,
            email_verified_at: row.try_get("email_verified_at")?,
            created_at: row.try_get("created_at")?,
        }))
    }
}

struct SessionRow(Session);

impl<'r> FromRow<'r, PgRow> for SessionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(SessionRow(Session {
            id: SessionId::from_uuid(row.try_get("id")?),
            username: row.try_get("username")?,
            refresh_token: row.try_get("refresh_token")?,
            user_agent: row.try_get("user_agent")?,
            client_ip: row.try_get("client_ip")?,
            is_blocked: row.try_get("is_blocked")?,
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
        }))
    }
}

struct OutboxRow(OutboxMessage);

impl<'r> FromRow<'r, PgRow> for OutboxRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let attempts: i32 = row.try_get("attempts")?;
        Ok(OutboxRow(OutboxMessage {
            id: OutboxId::new(row.try_get("id")?),
            topic: row.try_get("topic")?,
            payload: row.try_get("payload")?,
            status: OutboxStatus::parse(&status).map_err(decode_error)?,
            attempts: u32::try_from(attempts).unwrap_or_default(),
            last_error: row.try_get("last_error")?,
            available_at: row.try_get("available_at")?,
            delivered_at: row.try_get("delivered_at")?,
            created_at: row.try_get("created_at")?,
        }))
    }
}
