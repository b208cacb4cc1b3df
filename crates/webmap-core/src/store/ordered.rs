//! Generic store for displayed kinds with an explicit order.
//!
//! Layers, base maps, tabs (directly) and links (through
//! [`LinkStore`](super::LinkStore)) are kept here. The order list holds IDs
//! and always names exactly the entities in the map; the public projection
//! follows it.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use super::{claim_id, read, write, IdAllocator, Listed};
use crate::error::{Result, StoreError};
use crate::snapshot::{Projection, StoreBlock};

/// Maps, order list, and allocator of an ordered store.
#[derive(Debug, Clone)]
pub struct OrderedState<T> {
    pub(crate) items: HashMap<u64, T>,
    pub(crate) order: Vec<u64>,
    pub(crate) ids: IdAllocator,
}

impl<T: Listed> OrderedState<T> {
    fn new() -> Self {
        Self {
            items: HashMap::new(),
            order: Vec::new(),
            ids: IdAllocator::new(),
        }
    }

    fn from_block(block: StoreBlock<T>) -> Result<Self> {
        let mut items = HashMap::with_capacity(block.data.len());
        let mut order = Vec::with_capacity(block.data.len());
        for obj in block.data {
            let id = obj.id();
            if items.insert(id, obj).is_some() {
                return Err(StoreError::corrupt(
                    T::KIND,
                    format!("duplicate ID {} in snapshot", id),
                ));
            }
            order.push(id);
        }
        Ok(Self {
            items,
            order,
            ids: IdAllocator::from_persisted(T::KIND, block.next),
        })
    }

    /// Entities in display order.
    pub(crate) fn iter_ordered(&self) -> impl Iterator<Item = &T> {
        self.order.iter().filter_map(|id| self.items.get(id))
    }

    /// Rebuild the order list: `listed` first (existing, first occurrence,
    /// in the given order), then every other entity in its current order.
    pub(crate) fn reorder(&mut self, listed: &[u64]) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.items.len());
        let mut out = Vec::with_capacity(self.items.len());
        for &id in listed {
            if self.items.contains_key(&id) && seen.insert(id) {
                out.push(id);
            }
        }
        for &id in &self.order {
            if seen.insert(id) {
                out.push(id);
            }
        }
        self.order = out;
        self.check_order()
    }

    fn check_order(&self) -> Result<()> {
        if self.order.len() != self.items.len() {
            return Err(StoreError::corrupt(
                T::KIND,
                format!(
                    "order list has {} entries for {} items",
                    self.order.len(),
                    self.items.len()
                ),
            ));
        }
        Ok(())
    }

    fn public_list(&self) -> Vec<T> {
        self.iter_ordered()
            .filter(|obj| obj.is_public())
            .map(Listed::public_copy)
            .collect()
    }
}

pub struct OrderedStore<T> {
    state: RwLock<OrderedState<T>>,
    public: Projection<T>,
}

impl<T: Listed> OrderedStore<T> {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(OrderedState::new()),
            public: Projection::new(),
        }
    }

    /// Run a mutation under the write lock, then republish the projection.
    ///
    /// The projection is republished even when `f` fails, since `f` may
    /// have changed state before failing.
    pub(crate) fn mutate<R>(&self, f: impl FnOnce(&mut OrderedState<T>) -> Result<R>) -> Result<R> {
        let mut state = write(&self.state);
        let result = f(&mut state);
        self.public.publish(state.public_list());
        result
    }

    /// Insert `obj` under a freshly allocated ID, appended to the order.
    pub fn add(&self, mut obj: T) -> Result<u64> {
        self.mutate(|state| {
            let id = claim_id(T::KIND, &mut state.ids, |id| state.items.contains_key(&id))?;
            obj.set_id(id);
            state.items.insert(id, obj);
            state.order.push(id);
            Ok(id)
        })
    }

    /// Replace an existing entity, keeping its position.
    pub fn set(&self, mut obj: T) -> Result<()> {
        self.mutate(|state| {
            let id = obj.id();
            let previous = state
                .items
                .get(&id)
                .ok_or_else(|| StoreError::not_found(T::KIND, id))?;
            obj.keep_on_update(previous);
            state.items.insert(id, obj);
            Ok(())
        })
    }

    /// Remove an entity. Missing IDs are not an error.
    pub fn del(&self, id: u64) -> Result<()> {
        self.mutate(|state| {
            if state.items.remove(&id).is_some() {
                state.order.retain(|&o| o != id);
            }
            Ok(())
        })
    }

    /// Reorder to follow `ids`; see [`OrderedState::reorder`].
    pub fn order(&self, ids: &[u64]) -> Result<()> {
        self.mutate(|state| state.reorder(ids))
    }

    pub fn get_by_id(&self, id: u64) -> Option<T> {
        read(&self.state).items.get(&id).cloned()
    }

    /// Every entity, hidden ones included, in display order.
    pub fn get_all(&self) -> Vec<T> {
        read(&self.state).iter_ordered().cloned().collect()
    }

    /// The published public list. Never blocks on the store lock.
    pub fn get_pub(&self) -> Arc<Vec<T>> {
        self.public.load()
    }

    pub fn len(&self) -> usize {
        read(&self.state).items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current order list.
    pub fn order_ids(&self) -> Vec<u64> {
        read(&self.state).order.clone()
    }

    pub fn next_id(&self) -> u64 {
        read(&self.state).ids.peek()
    }

    pub fn to_block(&self) -> StoreBlock<T> {
        let state = read(&self.state);
        StoreBlock {
            data: state.iter_ordered().cloned().collect(),
            next: state.ids.peek(),
        }
    }

    /// Replace the whole store with a snapshot block.
    ///
    /// Nothing changes if the block is rejected.
    pub fn load_block(&self, block: StoreBlock<T>) -> Result<()> {
        let loaded = OrderedState::from_block(block)?;
        self.mutate(|state| {
            *state = loaded;
            Ok(())
        })
    }
}

impl<T: Listed> Default for OrderedStore<T> {
    fn default() -> Self {
        Self::new()
    }
}
