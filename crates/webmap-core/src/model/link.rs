//! Link list entries.
//!
//! Links form a tree through their `indent` level alone: an entry nests under
//! the closest preceding entry with a smaller indent.

use serde::{Deserialize, Serialize};

use super::{is_false, is_zero_i32};
use crate::store::{Entity, Listed};

pub type LinkId = u64;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Link {
    #[serde(rename = "lkid")]
    pub id: LinkId,

    /// Link text or category name.
    pub name: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub note: String,

    #[serde(skip_serializing_if = "is_false")]
    pub hide: bool,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub url: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,

    #[serde(skip_serializing_if = "is_zero_i32")]
    pub indent: i32,
}

impl Entity for Link {
    const KIND: &'static str = "link";

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
}

impl Listed for Link {
    fn is_public(&self) -> bool {
        !self.hide
    }

    fn redact(&mut self) {
        self.note.clear();
    }

    /// Indent only changes through reordering.
    fn keep_on_update(&mut self, previous: &Self) {
        self.indent = previous.indent;
    }
}

/// One entry of a link reorder request: the link and its new indent level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkOrder {
    pub id: LinkId,
    #[serde(rename = "lv")]
    pub level: i32,
}

impl LinkOrder {
    pub fn new(id: LinkId, level: i32) -> Self {
        Self { id, level }
    }
}

impl std::fmt::Display for LinkOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{}/{}>", self.id, self.level)
    }
}
