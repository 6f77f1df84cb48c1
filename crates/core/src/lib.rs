//! `housebank-core`: ledger foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the error taxonomy shared by every layer, and value objects.

pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use entity::Entity;
pub use error::{ErrorCategory, LedgerError, LedgerResult};
pub use id::{AccountId, EntryId, OutboxId, SessionId, TransferId};
pub use value_object::{Currency, Money, ValueObject};
