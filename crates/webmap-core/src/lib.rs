//! # webmap-core
//!
//! Storage core for the webmap backend.
//!
//! Everything the backend persists (users, attachments, hooks, layers, base
//! maps, links and tabs) lives in memory, indexed for lookup, and is written
//! as a single JSON snapshot by the [`DataStore`] facade.
//!
//! ## Key Concepts
//!
//! - **Entity store**: ID map + secondary lookups + (for ordered kinds) an
//!   explicit display order, guarded by one lock per store
//! - **Projection**: the redacted, hidden-filtered list served to public
//!   readers, rebuilt after each mutation and published atomically
//! - **DataStore**: the facade owning every store, the counters, the site
//!   config and the snapshot lifecycle

pub mod clock;
pub mod content;
pub mod datastore;
pub mod dirty;
pub mod error;
pub mod model;
pub mod snapshot;
pub mod store;
pub mod token;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use datastore::{DataStore, StoreOptions};
pub use error::{Result, StoreError};
pub use model::{
    Attachment, BaseMap, HookConfig, LayerGroup, Link, LinkOrder, TabData, TmplIndex, User,
    VersionKind,
};
pub use token::{RandomTokens, TokenSource};
