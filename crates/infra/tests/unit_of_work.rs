//! Begin / commit / rollback contract of `LedgerStore::run_in_transaction`.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use housebank_accounting::{BalanceAdjustment, CreateAccountParams, CreateEntryParams};
use housebank_core::{Currency, ErrorCategory, LedgerError};
use housebank_infra::config::LedgerConfig;

use common::{memory_store, memory_store_with, open_account};

#[tokio::test]
async fn failing_unit_leaves_no_trace() {
    let (db, store) = memory_store();
    let a = open_account(&store, 100).await;
    let before = db.snapshot().unwrap();

    let err = store
        .run_in_transaction(move |q| {
            Box::pin(async move {
                q.create_entry(CreateEntryParams {
                    account_id: a,
                    amount: 40,
                })
                .await?;
                q.add_account_balance(BalanceAdjustment::new(a, 40)).await?;
                q.create_account(CreateAccountParams::new("late", 1, Currency::usd()))
                    .await?;
                Err::<(), _>(LedgerError::validation("abort after three writes"))
            })
        })
        .await
        .unwrap_err();

    assert_eq!(err, LedgerError::validation("abort after three writes"));
    assert_eq!(db.snapshot().unwrap(), before);
}

#[tokio::test]
async fn successful_unit_commits_every_write() {
    let (db, store) = memory_store();
    let a = open_account(&store, 100).await;

    let entry = store
        .run_in_transaction(move |q| {
            Box::pin(async move {
                let entry = q
                    .create_entry(CreateEntryParams {
                        account_id: a,
                        amount: 25,
                    })
                    .await?;
                q.add_account_balance(BalanceAdjustment::new(a, 25)).await?;
                Ok::<_, LedgerError>(entry)
            })
        })
        .await
        .unwrap();

    let snapshot = db.snapshot().unwrap();
    assert_eq!(snapshot.accounts[&a].balance, 125);
    assert_eq!(snapshot.entries[&entry.id], entry);
}

#[tokio::test]
async fn begin_failure_skips_the_unit() {
    let (db, store) = memory_store();
    db.fail_next_begin();
    let invoked = Arc::new(AtomicBool::new(false));

    let flag = Arc::clone(&invoked);
    let err = store
        .run_in_transaction(move |_q| {
            flag.store(true, Ordering::SeqCst);
            Box::pin(async { Ok::<_, LedgerError>(()) })
        })
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Infrastructure);
    assert!(!invoked.load(Ordering::SeqCst));
}

#[tokio::test]
async fn commit_failure_is_returned_and_discards_writes() {
    let (db, store) = memory_store();
    db.fail_next_commit();

    let err = store
        .create_account(CreateAccountParams::new("ghost", 10, Currency::usd()))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("commit"));
    assert!(db.snapshot().unwrap().accounts.is_empty());
}

#[tokio::test]
async fn rollback_failure_reports_both_errors() {
    let (db, store) = memory_store();
    db.fail_next_rollback();

    let err = store
        .run_in_transaction(|_q| {
            Box::pin(async { Err::<(), _>(LedgerError::conflict("duplicate key")) })
        })
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(message.starts_with("tx error: conflict: duplicate key"));
    assert!(message.contains("rb error: infrastructure failure in rollback"));
    assert_eq!(err.category(), ErrorCategory::Conflict);
}

#[tokio::test]
async fn cancelled_unit_rolls_back_and_frees_the_connection() {
    let (db, store) = memory_store();
    let idle = db.idle_connections();

    let cancelled = tokio::time::timeout(
        Duration::from_millis(50),
        store.run_in_transaction(|q| {
            Box::pin(async move {
                q.create_account(CreateAccountParams::new("slow", 5, Currency::usd()))
                    .await?;
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<_, LedgerError>(())
            })
        }),
    )
    .await;

    assert!(cancelled.is_err());
    assert!(db.snapshot().unwrap().accounts.is_empty());
    assert_eq!(db.idle_connections(), idle);
}

#[tokio::test]
async fn exhausted_pool_fails_begin_as_infrastructure() {
    let config = LedgerConfig::default()
        .with_max_connections(1)
        .with_acquire_timeout(Duration::from_millis(50));
    let (_db, store) = memory_store_with(config);

    let holder = store.clone();
    let held = tokio::spawn(async move {
        holder
            .run_in_transaction(|_q| {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Ok::<_, LedgerError>(())
                })
            })
            .await
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let err = store
        .create_account(CreateAccountParams::new("waiting", 1, Currency::usd()))
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert!(err.to_string().contains("pool timed out"));

    held.await.unwrap().unwrap();
}

#[tokio::test]
async fn retry_reruns_the_whole_unit_on_retryable_errors() {
    let (db, store) = memory_store();
    let a = open_account(&store, 10).await;
    let attempts = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&attempts);
    let account = store
        .run_in_transaction_with_retry(3, move |q| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
            Box::pin(async move {
                let account = q.add_account_balance(BalanceAdjustment::new(a, 5)).await?;
                if attempt < 3 {
                    return Err(LedgerError::Deadlock("simulated".into()));
                }
                Ok(account)
            })
        })
        .await
        .unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(account.balance, 15);
    assert_eq!(db.snapshot().unwrap().accounts[&a].balance, 15);
}

#[tokio::test]
async fn retry_gives_up_on_non_retryable_errors() {
    let (_db, store) = memory_store();
    let attempts = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&attempts);
    let err = store
        .run_in_transaction_with_retry(5, move |_q| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err::<(), _>(LedgerError::validation("bad input")) })
        })
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Validation);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}
