//! Hook store.
//!
//! Each hook owns two unique tokens, one for download and one for pushing
//! data. The two are drawn from the same space: a new token must be free in
//! both lookup tables, so no token ever resolves as both kinds.
//!
//! Two projections are kept, both newest first:
//!
//! - `web`: every hook for the admin page, save name stripped
//! - `public`: enabled hooks, note, save name and auth token stripped

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{claim_id, read, write, Entity, IdAllocator};
use crate::error::{Result, StoreError};
use crate::model::{HookConfig, HookId};
use crate::snapshot::{Projection, StoreBlock};
use crate::token::{allocate_token, RandomTokens, TokenSource};

#[derive(Debug)]
struct HookState {
    items: HashMap<HookId, HookConfig>,
    by_token: HashMap<String, HookId>,
    by_auth: HashMap<String, HookId>,
    ids: IdAllocator,
}

impl HookState {
    fn new() -> Self {
        Self {
            items: HashMap::new(),
            by_token: HashMap::new(),
            by_auth: HashMap::new(),
            ids: IdAllocator::new(),
        }
    }

    fn from_block(block: StoreBlock<HookConfig>) -> Result<Self> {
        let mut state = Self {
            items: HashMap::with_capacity(block.data.len()),
            by_token: HashMap::with_capacity(block.data.len()),
            by_auth: HashMap::with_capacity(block.data.len()),
            ids: IdAllocator::from_persisted(HookConfig::KIND, block.next),
        };
        for obj in block.data {
            let id = obj.id;
            if state.items.contains_key(&id) {
                return Err(StoreError::corrupt(
                    HookConfig::KIND,
                    format!("duplicate ID {} in snapshot", id),
                ));
            }
            if state.token_taken(&obj.token)
                || state.token_taken(&obj.auth_token)
                || obj.token == obj.auth_token
            {
                return Err(StoreError::corrupt(
                    HookConfig::KIND,
                    format!("token reused by ID {} in snapshot", id),
                ));
            }
            state.by_token.insert(obj.token.clone(), id);
            state.by_auth.insert(obj.auth_token.clone(), id);
            state.items.insert(id, obj);
        }
        Ok(state)
    }

    fn token_taken(&self, token: &str) -> bool {
        self.by_token.contains_key(token) || self.by_auth.contains_key(token)
    }

    fn newest_first(&self) -> Vec<&HookConfig> {
        let mut all: Vec<&HookConfig> = self.items.values().collect();
        all.sort_by(|a, b| b.id.cmp(&a.id));
        all
    }

    fn web_list(&self) -> Vec<HookConfig> {
        self.newest_first()
            .into_iter()
            .map(|h| HookConfig {
                save_name: String::new(),
                ..h.clone()
            })
            .collect()
    }

    fn public_list(&self) -> Vec<HookConfig> {
        self.newest_first()
            .into_iter()
            .filter(|h| !h.disable)
            .map(|h| HookConfig {
                note: String::new(),
                save_name: String::new(),
                auth_token: String::new(),
                ..h.clone()
            })
            .collect()
    }

    /// The stored hook whose ID, token and auth token all match `obj`.
    fn matching(&self, obj: &HookConfig) -> Option<&HookConfig> {
        if self.by_token.get(&obj.token) != Some(&obj.id)
            || self.by_auth.get(&obj.auth_token) != Some(&obj.id)
        {
            return None;
        }
        self.items.get(&obj.id)
    }
}

pub struct HookStore {
    state: RwLock<HookState>,
    web: Projection<HookConfig>,
    public: Projection<HookConfig>,
    tokens: Arc<dyn TokenSource>,
}

impl HookStore {
    pub fn new() -> Self {
        Self::with_token_source(Arc::new(RandomTokens))
    }

    pub fn with_token_source(tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            state: RwLock::new(HookState::new()),
            web: Projection::new(),
            public: Projection::new(),
            tokens,
        }
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut HookState) -> Result<R>) -> Result<R> {
        let mut state = write(&self.state);
        let result = f(&mut state);
        self.web.publish(state.web_list());
        self.public.publish(state.public_list());
        result
    }

    /// Create a hook with a new ID, token and auth token.
    pub fn add(&self, mut obj: HookConfig) -> Result<HookConfig> {
        self.mutate(|state| {
            let source = self.tokens.as_ref();
            let token = allocate_token(HookConfig::KIND, source, |t| state.token_taken(t))?;
            let auth = allocate_token(HookConfig::KIND, source, |t| {
                t == token || state.token_taken(t)
            })?;
            let id = claim_id(HookConfig::KIND, &mut state.ids, |id| {
                state.items.contains_key(&id)
            })?;

            obj.id = id;
            obj.token = token;
            obj.auth_token = auth;
            state.by_token.insert(obj.token.clone(), id);
            state.by_auth.insert(obj.auth_token.clone(), id);
            state.items.insert(id, obj.clone());
            Ok(obj)
        })
    }

    /// Apply an admin edit: only name, note, disable and type change.
    pub fn set_config(&self, obj: &HookConfig) -> Result<()> {
        self.mutate(|state| {
            let stored = state
                .items
                .get_mut(&obj.id)
                .ok_or_else(|| StoreError::not_found(HookConfig::KIND, obj.id))?;
            stored.apply_config(obj);
            Ok(())
        })
    }

    /// Replace a hook wholesale, as after a data push. ID, token and auth
    /// token must match the stored hook.
    pub fn set(&self, obj: HookConfig) -> Result<()> {
        self.mutate(|state| {
            if state.matching(&obj).is_none() {
                return Err(StoreError::not_found(HookConfig::KIND, obj.id));
            }
            state.items.insert(obj.id, obj);
            Ok(())
        })
    }

    /// Remove a hook and return it, so the caller can delete its data file.
    pub fn del(&self, id: HookId) -> Result<Option<HookConfig>> {
        self.mutate(|state| {
            let removed = state.items.remove(&id);
            if let Some(obj) = &removed {
                state.by_token.remove(&obj.token);
                state.by_auth.remove(&obj.auth_token);
            }
            Ok(removed)
        })
    }

    pub fn get_by_id(&self, id: HookId) -> Option<HookConfig> {
        read(&self.state).items.get(&id).cloned()
    }

    pub fn get_by_token(&self, token: &str) -> Option<HookConfig> {
        let state = read(&self.state);
        let id = state.by_token.get(token)?;
        state.items.get(id).cloned()
    }

    pub fn get_by_auth_token(&self, auth: &str) -> Option<HookConfig> {
        let state = read(&self.state);
        let id = state.by_auth.get(auth)?;
        state.items.get(id).cloned()
    }

    /// Every hook by ascending ID, nothing stripped.
    pub fn get_all(&self) -> Vec<HookConfig> {
        let state = read(&self.state);
        let mut all: Vec<HookConfig> = state.items.values().cloned().collect();
        all.sort_by_key(|h| h.id);
        all
    }

    pub fn get_web(&self) -> Arc<Vec<HookConfig>> {
        self.web.load()
    }

    pub fn get_pub(&self) -> Arc<Vec<HookConfig>> {
        self.public.load()
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

    pub fn to_block(&self) -> StoreBlock<HookConfig> {
        let state = read(&self.state);
        let mut data: Vec<HookConfig> = state.items.values().cloned().collect();
        data.sort_by_key(|h| h.id);
        StoreBlock {
            data,
            next: state.ids.peek(),
        }
    }

    pub fn load_block(&self, block: StoreBlock<HookConfig>) -> Result<()> {
        let loaded = HookState::from_block(block)?;
        self.mutate(|state| {
            *state = loaded;
            Ok(())
        })
    }
}

impl Default for HookStore {
    fn default() -> Self {
        Self::new()
    }
}
