//! Entity stores.
//!
//! # Overview
//!
//! Every kind gets a store with the same shape:
//!
//! - a primary map, ID → entity
//! - secondary lookups by unique key (token, auth token, account) where the
//!   kind has them
//! - for displayed kinds, an explicit order list
//! - a [`Projection`](crate::snapshot::Projection) rebuilt after each
//!   mutation and read without locking
//!
//! One `RwLock` guards the maps and order list of a store. Mutations hold it
//! exclusively for their whole duration, lookups take it shared. Nothing is
//! shared between stores, so two stores never wait on each other.
//!
//! | Store | Secondary keys | Ordered | Projection |
//! |-------|----------------|---------|------------|
//! | [`UserStore`] | account | no | all users, hash stripped, by ID |
//! | [`AttachStore`] | token | no | non-hidden, save name stripped, newest first |
//! | [`HookStore`] | token, auth token | no | admin and public views, newest first |
//! | [`LayerStore`] / [`MapStore`] / [`TabStore`] | - | yes | public entries, note stripped |
//! | [`LinkStore`] | - | yes | as above, with indent repair |

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{Result, StoreError};

pub mod attach;
pub mod hook;
pub mod link;
pub mod ordered;
pub mod user;

pub use attach::AttachStore;
pub use hook::HookStore;
pub use link::LinkStore;
pub use ordered::OrderedStore;
pub use user::UserStore;

use crate::model::{BaseMap, LayerGroup, TabData};

pub type LayerStore = OrderedStore<LayerGroup>;
pub type MapStore = OrderedStore<BaseMap>;
pub type TabStore = OrderedStore<TabData>;

/// Anything kept in a store under a numeric ID.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Kind name for errors and logs.
    const KIND: &'static str;

    fn id(&self) -> u64;

    fn set_id(&mut self, id: u64);
}

/// Entities that appear in a public projection.
pub trait Listed: Entity {
    /// Whether the entity belongs in the public projection.
    fn is_public(&self) -> bool;

    /// Strip admin-only fields for the public copy.
    fn redact(&mut self);

    /// Carry fields an update must not change over from the stored entity.
    fn keep_on_update(&mut self, _previous: &Self) {}

    fn public_copy(&self) -> Self {
        let mut copy = self.clone();
        copy.redact();
        copy
    }
}

/// Hands out IDs for one kind: 1, 2, 3, ... never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Restore from a snapshot. `0` is not a valid next ID and becomes 1.
    pub fn from_persisted(kind: &'static str, next: u64) -> Self {
        if next == 0 {
            log::warn!("{} store: persisted next ID was 0, using 1", kind);
            return Self::new();
        }
        Self { next }
    }

    /// The ID the next insert will get.
    pub fn peek(&self) -> u64 {
        self.next
    }

    /// Consume the current ID.
    pub fn advance(&mut self, kind: &'static str) -> Result<u64> {
        let id = self.next;
        self.next = id
            .checked_add(1)
            .ok_or_else(|| StoreError::corrupt(kind, "ID allocator overflow"))?;
        Ok(id)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Check that the allocator's next ID is free before inserting.
///
/// An occupied next ID means the allocator fell behind the data (hand
/// edited snapshot, overflow); the store is no longer trustworthy.
pub(crate) fn claim_id(
    kind: &'static str,
    ids: &mut IdAllocator,
    occupied: impl Fn(u64) -> bool,
) -> Result<u64> {
    let id = ids.peek();
    if occupied(id) {
        return Err(StoreError::corrupt(
            kind,
            format!("next ID {} already in use", id),
        ));
    }
    ids.advance(kind)
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_starts_at_one() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.advance("t").unwrap(), 1);
        assert_eq!(ids.advance("t").unwrap(), 2);
        assert_eq!(ids.peek(), 3);
    }

    #[test]
    fn persisted_zero_is_coerced() {
        assert_eq!(IdAllocator::from_persisted("t", 0).peek(), 1);
        assert_eq!(IdAllocator::from_persisted("t", 9).peek(), 9);
    }

    #[test]
    fn overflow_is_corruption() {
        let mut ids = IdAllocator::from_persisted("t", u64::MAX);
        assert!(ids.advance("t").unwrap_err().is_fatal());
    }

    #[test]
    fn occupied_next_id_is_corruption() {
        let mut ids = IdAllocator::from_persisted("t", 5);
        let err = claim_id("t", &mut ids, |id| id == 5).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(ids.peek(), 5);
    }
}
