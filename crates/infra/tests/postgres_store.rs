//! Postgres backend. Runs only when `DATABASE_URL` points at a scratch database.

mod common;

use housebank_accounting::CreateAccountParams;
use housebank_auth::SendVerifyEmail;
use housebank_core::{AccountId, Currency, ErrorCategory, LedgerError};
use housebank_infra::config::LedgerConfig;
use housebank_infra::outbox::OutboxStatus;
use housebank_infra::store::{LedgerStore, PgDatabase};
use housebank_infra::workflows::{create_user_with_verification, execute_money_transfer};

use common::{transfer, user_params};

async fn pg_store() -> Option<LedgerStore<PgDatabase>> {
    housebank_observability::init_for_tests();
    let config = match LedgerConfig::from_env() {
        Ok(config) => config,
        Err(_) => {
            eprintln!("DATABASE_URL not set; skipping postgres test");
            return None;
        }
    };
    let db = PgDatabase::connect(&config).await.expect("connect");
    db.ensure_schema().await.expect("schema");
    Some(LedgerStore::new(db))
}

fn unique(prefix: &str) -> String {
    format!("{prefix}_{}", uuid::Uuid::now_v7().simple())
}

async fn open(store: &LedgerStore<PgDatabase>, balance: i64) -> AccountId {
    store
        .create_account(CreateAccountParams::new(unique("owner"), balance, Currency::usd()))
        .await
        .expect("create account")
        .id
}

#[tokio::test]
async fn transfer_commits_on_postgres() {
    let Some(store) = pg_store().await else { return };
    let a = open(&store, 1000).await;
    let b = open(&store, 500).await;

    let result = execute_money_transfer(&store, transfer(a, b, 300)).await.unwrap();

    assert_eq!(result.from_account.balance, 700);
    assert_eq!(result.to_account.balance, 800);
    assert_eq!(store.get_entry(result.from_entry.id).await.unwrap().amount, -300);
}

#[tokio::test]
async fn balance_check_maps_to_insufficient_funds() {
    let Some(store) = pg_store().await else { return };
    let a = open(&store, 50).await;
    let b = open(&store, 0).await;

    let err = execute_money_transfer(&store, transfer(a, b, 80)).await.unwrap_err();

    assert_eq!(
        err,
        LedgerError::InsufficientFunds {
            account_id: a.get(),
            delta: -80,
        }
    );
    assert_eq!(store.get_account(a).await.unwrap().balance, 50);
    assert_eq!(store.get_account(b).await.unwrap().balance, 0);
}

#[tokio::test]
async fn unknown_account_maps_to_not_found() {
    let Some(store) = pg_store().await else { return };
    let a = open(&store, 50).await;

    let err = execute_money_transfer(&store, transfer(a, AccountId::new(i64::MAX), 10))
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::NotFound);
    assert_eq!(store.get_account(a).await.unwrap().balance, 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn opposing_transfers_do_not_deadlock_on_postgres() {
    let Some(store) = pg_store().await else { return };
    let a = open(&store, 1000).await;
    let b = open(&store, 1000).await;

    let mut tasks = Vec::new();
    for k in 0..10 {
        let store = store.clone();
        let (from, to) = if k % 2 == 0 { (a, b) } else { (b, a) };
        tasks.push(tokio::spawn(async move {
            execute_money_transfer(&store, transfer(from, to, 10)).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(store.get_account(a).await.unwrap().balance, 1000);
    assert_eq!(store.get_account(b).await.unwrap().balance, 1000);
}

#[tokio::test]
async fn user_and_outbox_row_commit_together() {
    let Some(store) = pg_store().await else { return };
    let username = unique("u");

    create_user_with_verification(&store, user_params(&username))
        .await
        .unwrap();
    let err = create_user_with_verification(&store, user_params(&username))
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Conflict);

    let staged: Vec<_> = store
        .list_outbox(Some(OutboxStatus::Pending), 1000)
        .await
        .unwrap()
        .into_iter()
        .filter(|m| SendVerifyEmail::from_payload(&m.payload).is_ok_and(|t| t.username == username))
        .collect();
    assert_eq!(staged.len(), 1);
}
