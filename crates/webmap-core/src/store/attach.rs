//! Attachment store: uploads keyed by ID and by download token.
//!
//! Hidden attachments leave the web listing but still resolve by token.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{claim_id, read, write, Entity, IdAllocator};
use crate::error::{Result, StoreError};
use crate::model::{AttachId, Attachment};
use crate::snapshot::{Projection, StoreBlock};
use crate::token::{allocate_token, RandomTokens, TokenSource};

#[derive(Debug)]
struct AttachState {
    items: HashMap<AttachId, Attachment>,
    by_token: HashMap<String, AttachId>,
    ids: IdAllocator,
}

impl AttachState {
    fn new() -> Self {
        Self {
            items: HashMap::new(),
            by_token: HashMap::new(),
            ids: IdAllocator::new(),
        }
    }

    fn from_block(block: StoreBlock<Attachment>) -> Result<Self> {
        let mut state = Self {
            items: HashMap::with_capacity(block.data.len()),
            by_token: HashMap::with_capacity(block.data.len()),
            ids: IdAllocator::from_persisted(Attachment::KIND, block.next),
        };
        for obj in block.data {
            if state.items.contains_key(&obj.id) {
                return Err(StoreError::corrupt(
                    Attachment::KIND,
                    format!("duplicate ID {} in snapshot", obj.id),
                ));
            }
            if state.by_token.insert(obj.token.clone(), obj.id).is_some() {
                return Err(StoreError::corrupt(
                    Attachment::KIND,
                    format!("duplicate token on ID {} in snapshot", obj.id),
                ));
            }
            state.items.insert(obj.id, obj);
        }
        Ok(state)
    }

    fn sorted(&self) -> Vec<&Attachment> {
        let mut all: Vec<&Attachment> = self.items.values().collect();
        all.sort_by_key(|a| a.id);
        all
    }

    /// Visible uploads, newest first, without save names.
    fn web_list(&self) -> Vec<Attachment> {
        let mut list: Vec<Attachment> = self
            .items
            .values()
            .filter(|a| !a.hide)
            .map(|a| Attachment {
                save_name: String::new(),
                ..a.clone()
            })
            .collect();
        list.sort_by(|a, b| b.id.cmp(&a.id));
        list
    }
}

/// Uploaded files, keyed by ID and by download token.
pub struct AttachStore {
    state: RwLock<AttachState>,
    web: Projection<Attachment>,
    tokens: Arc<dyn TokenSource>,
}

impl AttachStore {
    pub fn new() -> Self {
        Self::with_token_source(Arc::new(RandomTokens))
    }

    pub fn with_token_source(tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            state: RwLock::new(AttachState::new()),
            web: Projection::new(),
            tokens,
        }
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut AttachState) -> Result<R>) -> Result<R> {
        let mut state = write(&self.state);
        let result = f(&mut state);
        self.web.publish(state.web_list());
        result
    }

    /// Insert an upload record under a new ID and download token.
    ///
    /// Returns the stored record.
    pub fn add(&self, mut obj: Attachment) -> Result<Attachment> {
        self.mutate(|state| {
            let token = allocate_token(Attachment::KIND, self.tokens.as_ref(), |t| {
                state.by_token.contains_key(t)
            })?;
            let id = claim_id(Attachment::KIND, &mut state.ids, |id| {
                state.items.contains_key(&id)
            })?;
            obj.id = id;
            obj.token = token;
            state.by_token.insert(obj.token.clone(), id);
            state.items.insert(id, obj.clone());
            Ok(obj)
        })
    }

    /// Replace a record. ID and token must match the stored one.
    pub fn set(&self, obj: Attachment) -> Result<()> {
        self.mutate(|state| {
            if state.by_token.get(&obj.token) != Some(&obj.id)
                || !state.items.contains_key(&obj.id)
            {
                return Err(StoreError::not_found(Attachment::KIND, obj.id));
            }
            state.items.insert(obj.id, obj);
            Ok(())
        })
    }

    /// Remove a record and return it, so the caller can delete the file.
    pub fn del(&self, id: AttachId) -> Result<Option<Attachment>> {
        self.mutate(|state| {
            let removed = state.items.remove(&id);
            if let Some(obj) = &removed {
                state.by_token.remove(&obj.token);
            }
            Ok(removed)
        })
    }

    pub fn get_by_id(&self, id: AttachId) -> Option<Attachment> {
        read(&self.state).items.get(&id).cloned()
    }

    /// Hidden attachments resolve too.
    pub fn get_by_token(&self, token: &str) -> Option<Attachment> {
        let state = read(&self.state);
        let id = state.by_token.get(token)?;
        state.items.get(id).cloned()
    }

    /// Every attachment by ascending ID.
    pub fn get_all(&self) -> Vec<Attachment> {
        read(&self.state).sorted().into_iter().cloned().collect()
    }

    pub fn get_web(&self) -> Arc<Vec<Attachment>> {
        self.web.load()
    }

    pub fn len(&self) -> usize {
        read(&self.state).items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn next_id(&self) -> u64 {
        read(&self.state).ids.peek()
    }

    pub fn to_block(&self) -> StoreBlock<Attachment> {
        let state = read(&self.state);
        StoreBlock {
            data: state.sorted().into_iter().cloned().collect(),
            next: state.ids.peek(),
        }
    }

    pub fn load_block(&self, block: StoreBlock<Attachment>) -> Result<()> {
        let loaded = AttachState::from_block(block)?;
        self.mutate(|state| {
            *state = loaded;
            Ok(())
        })
    }
}

impl Default for AttachStore {
    fn default() -> Self {
        Self::new()
    }
}
