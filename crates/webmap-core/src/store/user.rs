//! User store: accounts keyed by ID and by login account.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{claim_id, read, write, Entity, IdAllocator};
use crate::error::{Result, StoreError};
use crate::model::{User, UserId};
use crate::snapshot::{Projection, StoreBlock};

#[derive(Debug)]
struct UserState {
    items: HashMap<UserId, User>,
    by_acc: HashMap<String, UserId>,
    ids: IdAllocator,
}

impl UserState {
    fn new() -> Self {
        Self {
            items: HashMap::new(),
            by_acc: HashMap::new(),
            ids: IdAllocator::new(),
        }
    }

    fn from_block(block: StoreBlock<User>) -> Result<Self> {
        let mut state = Self {
            items: HashMap::with_capacity(block.data.len()),
            by_acc: HashMap::with_capacity(block.data.len()),
            ids: IdAllocator::from_persisted(User::KIND, block.next),
        };
        for user in block.data {
            if state.items.contains_key(&user.id) {
                return Err(StoreError::corrupt(
                    User::KIND,
                    format!("duplicate ID {} in snapshot", user.id),
                ));
            }
            if state.by_acc.insert(user.acc.clone(), user.id).is_some() {
                return Err(StoreError::corrupt(
                    User::KIND,
                    format!("duplicate account {:?} in snapshot", user.acc),
                ));
            }
            state.items.insert(user.id, user);
        }
        Ok(state)
    }

    fn sorted(&self) -> Vec<&User> {
        let mut users: Vec<&User> = self.items.values().collect();
        users.sort_by_key(|u| u.id);
        users
    }

    fn listing(&self) -> Vec<User> {
        self.sorted()
            .into_iter()
            .map(|u| User {
                hash: String::new(),
                ..u.clone()
            })
            .collect()
    }
}

/// Accounts, keyed by ID and by login account.
pub struct UserStore {
    state: RwLock<UserState>,
    listing: Projection<User>,
}

impl UserStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(UserState::new()),
            listing: Projection::new(),
        }
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut UserState) -> Result<R>) -> Result<R> {
        let mut state = write(&self.state);
        let result = f(&mut state);
        self.listing.publish(state.listing());
        result
    }

    /// Insert a new account. The caller's ID is ignored.
    pub fn add(&self, mut user: User) -> Result<UserId> {
        self.mutate(|state| {
            if state.by_acc.contains_key(&user.acc) {
                return Err(StoreError::AlreadyExists {
                    kind: User::KIND,
                    key: user.acc.clone(),
                });
            }
            let id = claim_id(User::KIND, &mut state.ids, |id| state.items.contains_key(&id))?;
            user.id = id;
            state.by_acc.insert(user.acc.clone(), id);
            state.items.insert(id, user);
            Ok(id)
        })
    }

    /// Replace an account. ID and account must both match the stored user;
    /// an empty hash keeps the stored password.
    pub fn set(&self, mut user: User) -> Result<()> {
        self.mutate(|state| {
            if state.by_acc.get(&user.acc) != Some(&user.id) {
                return Err(StoreError::not_found(
                    User::KIND,
                    format!("{}/{}", user.id, user.acc),
                ));
            }
            let stored = state
                .items
                .get(&user.id)
                .ok_or_else(|| StoreError::not_found(User::KIND, user.id))?;
            if user.hash.is_empty() {
                user.hash = stored.hash.clone();
            }
            state.items.insert(user.id, user);
            Ok(())
        })
    }

    pub fn del(&self, id: UserId) -> Result<()> {
        self.mutate(|state| {
            if let Some(user) = state.items.remove(&id) {
                state.by_acc.remove(&user.acc);
            }
            Ok(())
        })
    }

    pub fn get_by_id(&self, id: UserId) -> Option<User> {
        read(&self.state).items.get(&id).cloned()
    }

    pub fn get_by_acc(&self, acc: &str) -> Option<User> {
        let state = read(&self.state);
        let id = state.by_acc.get(acc)?;
        state.items.get(id).cloned()
    }

    /// Every account by ascending ID, password hashes stripped.
    pub fn get_all(&self) -> Arc<Vec<User>> {
        self.listing.load()
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

    pub fn to_block(&self) -> StoreBlock<User> {
        let state = read(&self.state);
        StoreBlock {
            data: state.sorted().into_iter().cloned().collect(),
            next: state.ids.peek(),
        }
    }

    pub fn load_block(&self, block: StoreBlock<User>) -> Result<()> {
        let loaded = UserState::from_block(block)?;
        self.mutate(|state| {
            *state = loaded;
            Ok(())
        })
    }
}

impl Default for UserStore {
    fn default() -> Self {
        Self::new()
    }
}
