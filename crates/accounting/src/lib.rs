//! Accounting model: accounts, entries, transfers and lock ordering.
//!
//! Pure domain logic only: no IO, no persistence concerns.

pub mod account;
pub mod entry;
pub mod lock_order;
pub mod transfer;

pub use account::{
    Account, BalanceAdjustment, CreateAccountParams, ListAccountsParams,
    UpdateAccountBalanceParams,
};
pub use entry::{CreateEntryParams, Entry, ListEntriesParams};
pub use lock_order::{LockKey, OrderedPair, lock_ordered};
pub use transfer::{
    CreateTransferParams, ListTransfersParams, Transfer, TransferRequest, TransferTxParams,
    TransferTxResult,
};
