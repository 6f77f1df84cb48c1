//! Transactional outbox.
//!
//! Side effects aimed at systems outside the database are written as outbox
//! rows in the same transaction as the data they describe, then delivered
//! after commit by an [`OutboxDispatcher`]. A rolled-back transaction leaves
//! no row, so nothing is ever delivered for data that does not exist.

pub mod dispatcher;
pub mod types;

pub use dispatcher::{
    DispatchReport, DispatcherHandle, DispatcherStats, OutboxDispatcher, OutboxHandler,
};
pub use types::{
    BackoffStrategy, FailureDisposition, NewOutboxMessage, OutboxMessage, OutboxStatus,
    RetryPolicy,
};
