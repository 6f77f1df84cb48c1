//! Deadlock-avoidance ordering for multi-row workflows.
//!
//! Any unit of work that locks more than one contended row must acquire the
//! locks in ascending key order. Two transfers between the same accounts in
//! opposite directions then both lock the lower id first, so neither can hold
//! one row while waiting for the other.
//!
//! The order is total over the key type and independent of the logical role
//! (debit/credit, source/destination) of each row. New multi-row workflows
//! must route their row writes through [`OrderedPair`] or [`lock_ordered`].

use housebank_core::{AccountId, Entity};

use crate::account::{Account, BalanceAdjustment};

/// Something that locks one row identified by an ordered key.
pub trait LockKey {
    type Key: Ord + Copy + core::fmt::Debug;

    fn lock_key(&self) -> Self::Key;
}

impl LockKey for BalanceAdjustment {
    type Key = AccountId;

    fn lock_key(&self) -> AccountId {
        self.account_id
    }
}

impl LockKey for Account {
    type Key = AccountId;

    fn lock_key(&self) -> AccountId {
        *self.id()
    }
}

impl LockKey for AccountId {
    type Key = AccountId;

    fn lock_key(&self) -> AccountId {
        *self
    }
}

/// Two row operations arranged in lock order.
///
/// Remembers whether the caller's logical order was swapped so results can be
/// mapped back onto the caller's (source, destination) view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderedPair<T> {
    first: T,
    second: T,
    swapped: bool,
}

impl<T: LockKey> OrderedPair<T> {
    /// Arrange `(a, b)` so the lower key comes first. Equal keys keep their order.
    pub fn new(a: T, b: T) -> Self {
        if b.lock_key() < a.lock_key() {
            Self {
                first: b,
                second: a,
                swapped: true,
            }
        } else {
            Self {
                first: a,
                second: b,
                swapped: false,
            }
        }
    }

    /// Operation to issue first (lowest key).
    pub fn first(&self) -> &T {
        &self.first
    }

    /// Operation to issue second.
    pub fn second(&self) -> &T {
        &self.second
    }

    pub fn is_swapped(&self) -> bool {
        self.swapped
    }

    /// Both operations, in lock order.
    pub fn into_ordered(self) -> [T; 2] {
        [self.first, self.second]
    }

    /// Map results produced in lock order back to the caller's `(a, b)` order.
    pub fn restore<U>(&self, first_result: U, second_result: U) -> (U, U) {
        if self.swapped {
            (second_result, first_result)
        } else {
            (first_result, second_result)
        }
    }
}

/// Sort any number of row operations into lock order (stable for equal keys).
pub fn lock_ordered<T: LockKey>(mut items: Vec<T>) -> Vec<T> {
    items.sort_by_key(|item| item.lock_key());
    items
}
