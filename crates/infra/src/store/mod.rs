//! Transactional store boundary.
//!
//! [`Database`] opens transactions, [`Queries`] is the data-operation surface
//! every backend implements, and [`LedgerStore`] runs units of work with the
//! begin / commit / rollback contract. Two backends ship here: Postgres for
//! production and an in-memory one for tests and local runs.

pub mod ledger_store;
pub mod memory;
pub mod postgres;
pub mod r#trait;

pub use ledger_store::LedgerStore;
pub use memory::{MemoryDatabase, MemorySnapshot, MemoryTransaction};
pub use postgres::{PgDatabase, PgTransaction, map_sqlx_error};
pub use r#trait::{Database, Queries, Transaction, TxFuture};
