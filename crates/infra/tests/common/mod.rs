#![allow(dead_code)]

use std::time::Duration;

use housebank_accounting::{CreateAccountParams, TransferTxParams};
use housebank_auth::CreateUserParams;
use housebank_core::{AccountId, Currency};
use housebank_infra::config::LedgerConfig;
use housebank_infra::store::{LedgerStore, MemoryDatabase};

pub fn memory_store() -> (MemoryDatabase, LedgerStore<MemoryDatabase>) {
    memory_store_with(LedgerConfig::default())
}

pub fn memory_store_with(config: LedgerConfig) -> (MemoryDatabase, LedgerStore<MemoryDatabase>) {
    housebank_observability::init_for_tests();
    let db = MemoryDatabase::with_config(&config);
    let store = LedgerStore::new(db.clone());
    (db, store)
}

pub fn short_lock_timeout() -> LedgerConfig {
    LedgerConfig::default().with_lock_timeout(Duration::from_millis(200))
}

pub async fn open_account(store: &LedgerStore<MemoryDatabase>, balance: i64) -> AccountId {
    store
        .create_account(CreateAccountParams::new("owner", balance, Currency::usd()))
        .await
        .expect("create account")
        .id
}

pub fn transfer(from: AccountId, to: AccountId, amount: i64) -> TransferTxParams {
    TransferTxParams {
        from_account_id: from,
        to_account_id: to,
        amount,
    }
}

pub fn user_params(username: &str) -> CreateUserParams {
    CreateUserParams::new(
        username,
        format!("{username} tester"),
        format!("{username}@example.com"),
        "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA",
    )
}
