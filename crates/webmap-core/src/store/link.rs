//! Link store: an ordered store whose entries nest by indent level.
//!
//! Two operations differ from the generic ordered store:
//!
//! - **Delete** promotes the deleted link's children. Every link right after
//!   it that is indented deeper moves up one level, stopping at the first
//!   link at or above the deleted link's level.
//! - **Order** carries a level per entry. Levels are first normalized (see
//!   [`normalize_levels`]) and then written onto the links.

use std::collections::HashSet;
use std::sync::Arc;

use super::OrderedStore;
use crate::error::Result;
use crate::model::{Link, LinkId, LinkOrder};
use crate::snapshot::StoreBlock;

/// Make submitted levels consistent.
///
/// Levels become relative to the first entry, are never negative, and never
/// exceed the previous entry's level by more than one.
pub fn normalize_levels(entries: &mut [LinkOrder]) {
    let Some(base) = entries.first().map(|e| e.level) else {
        return;
    };
    let mut prev: Option<i32> = None;
    for entry in entries.iter_mut() {
        let mut level = (entry.level - base).max(0);
        if let Some(prev) = prev {
            if level - prev > 1 {
                level = prev + 1;
            }
        }
        entry.level = level;
        prev = Some(level);
    }
}

pub struct LinkStore {
    inner: OrderedStore<Link>,
}

impl LinkStore {
    pub fn new() -> Self {
        Self {
            inner: OrderedStore::new(),
        }
    }

    pub fn add(&self, obj: Link) -> Result<LinkId> {
        self.inner.add(obj)
    }

    /// Replace a link's content. The stored indent is kept.
    pub fn set(&self, obj: Link) -> Result<()> {
        self.inner.set(obj)
    }

    /// Remove a link and promote the links nested under it.
    pub fn del(&self, id: LinkId) -> Result<()> {
        self.inner.mutate(|state| {
            let Some(removed) = state.items.remove(&id) else {
                return Ok(());
            };
            let Some(pos) = state.order.iter().position(|&o| o == id) else {
                return Ok(());
            };
            state.order.remove(pos);

            for child_id in &state.order[pos..] {
                let Some(child) = state.items.get_mut(child_id) else {
                    break;
                };
                if child.indent <= removed.indent {
                    break;
                }
                child.indent -= 1;
            }
            Ok(())
        })
    }

    /// Reorder and re-indent. A repeated ID counts only at its first entry;
    /// levels are normalized after that.
    pub fn order(&self, entries: &[LinkOrder]) -> Result<()> {
        let mut seen = HashSet::with_capacity(entries.len());
        let mut entries: Vec<LinkOrder> = entries
            .iter()
            .filter(|e| seen.insert(e.id))
            .copied()
            .collect();
        normalize_levels(&mut entries);
        log::debug!(
            "link order: {}",
            entries
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ")
        );

        let ids: Vec<LinkId> = entries.iter().map(|e| e.id).collect();
        self.inner.mutate(|state| {
            for entry in &entries {
                if let Some(link) = state.items.get_mut(&entry.id) {
                    link.indent = entry.level;
                }
            }
            state.reorder(&ids)
        })
    }

    pub fn get_by_id(&self, id: LinkId) -> Option<Link> {
        self.inner.get_by_id(id)
    }

    pub fn get_all(&self) -> Vec<Link> {
        self.inner.get_all()
    }

    pub fn get_pub(&self) -> Arc<Vec<Link>> {
        self.inner.get_pub()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn order_ids(&self) -> Vec<LinkId> {
        self.inner.order_ids()
    }

    pub fn next_id(&self) -> u64 {
        self.inner.next_id()
    }

    pub fn to_block(&self) -> StoreBlock<Link> {
        self.inner.to_block()
    }

    pub fn load_block(&self, block: StoreBlock<Link>) -> Result<()> {
        self.inner.load_block(block)
    }
}

impl Default for LinkStore {
    fn default() -> Self {
        Self::new()
    }
}
