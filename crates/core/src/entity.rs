//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Accounts, entries, transfers, users and sessions are all entities; their
/// identifiers are what the store keys rows by and what lock ordering sorts on.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
