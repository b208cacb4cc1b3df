//! Login accounts.

use serde::{Deserialize, Serialize};

use super::is_false;
use crate::store::Entity;

pub type UserId = u64;

/// bcrypt cost for stored passwords. Raise with server performance.
pub const DEFAULT_HASH_COST: u32 = 12;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    #[serde(rename = "uid")]
    pub id: UserId,

    /// Login account, unique and fixed after creation.
    pub acc: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub hash: String,

    pub name: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub note: String,

    /// May manage other users.
    #[serde(rename = "su", skip_serializing_if = "is_false")]
    pub is_super: bool,

    /// Login and API access disabled, account kept.
    #[serde(rename = "fz", skip_serializing_if = "is_false")]
    pub freeze: bool,
}

impl User {
    pub fn new(acc: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            acc: acc.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Replace the stored hash with a bcrypt hash of `pwd`.
    pub fn set_password(&mut self, pwd: &str, cost: u32) -> Result<(), bcrypt::BcryptError> {
        self.hash = bcrypt::hash(pwd, cost)?;
        Ok(())
    }

    pub fn check_password(&self, pwd: &str) -> bool {
        if self.hash.is_empty() {
            return false;
        }
        bcrypt::verify(pwd, &self.hash).unwrap_or(false)
    }
}

impl Entity for User {
    const KIND: &'static str = "user";

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
}
