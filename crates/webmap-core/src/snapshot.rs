//! Published projections and the per-store persistence block.
//!
//! # Projection
//!
//! Each store keeps its public view in a [`Projection`]: an immutable
//! `Arc<Vec<T>>` swapped whole with `ArcSwap`. Writers rebuild the list under
//! the store's write lock and publish it; readers load the current `Arc`
//! without touching the lock and always see a complete list.
//!
//! # StoreBlock
//!
//! On disk every store is `{"data": [...], "next": n}`. [`StoreBlock`] is that
//! shape and nothing more; stores convert to and from it explicitly.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

/// Lock-free, atomically replaced list.
pub struct Projection<T> {
    inner: ArcSwap<Vec<T>>,
}

impl<T> Projection<T> {
    pub fn new() -> Self {
        Self {
            inner: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// The last published list.
    pub fn load(&self) -> Arc<Vec<T>> {
        self.inner.load_full()
    }

    /// Replace the published list.
    pub fn publish(&self, items: Vec<T>) {
        self.inner.store(Arc::new(items));
    }
}

impl<T> Default for Projection<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialized form of one store: every entity plus the next ID to hand out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreBlock<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub next: u64,
}

impl<T> Default for StoreBlock<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            next: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_replaces_whole_list() {
        let projection = Projection::new();
        let before = projection.load();
        projection.publish(vec![1, 2, 3]);

        // Readers holding the old Arc keep their complete view
        assert!(before.is_empty());
        assert_eq!(*projection.load(), vec![1, 2, 3]);
    }

    #[test]
    fn block_defaults_when_fields_missing() {
        let block: StoreBlock<u32> = serde_json::from_str("{}").unwrap();
        assert!(block.data.is_empty());
        assert_eq!(block.next, 0);

        let block: StoreBlock<u32> = serde_json::from_str(r#"{"data":[4,5],"next":6}"#).unwrap();
        assert_eq!(block.data, vec![4, 5]);
        assert_eq!(block.next, 6);
    }
}
