//! Infrastructure layer: transactional store, workflows, outbox delivery, config.

pub mod config;
pub mod outbox;
pub mod store;
pub mod workflows;

pub use config::{ConfigError, DispatcherConfig, LedgerConfig};
pub use outbox::{OutboxDispatcher, OutboxHandler, RetryPolicy};
pub use store::{Database, LedgerStore, MemoryDatabase, PgDatabase, Queries, Transaction};
pub use workflows::{
    WorkflowOutcome, create_user_with_verification, execute_money_transfer, execute_user_creation,
};
