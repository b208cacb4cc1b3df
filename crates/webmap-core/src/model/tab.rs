//! Side panel tabs.

use serde::{Deserialize, Serialize};

use super::is_false;
use crate::store::{Entity, Listed};

pub type TabId = u64;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TabData {
    #[serde(rename = "tbid")]
    pub id: TabId,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,

    /// Tabs are opt-in: only shown tabs are public.
    #[serde(skip_serializing_if = "is_false")]
    pub show: bool,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub note: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub icon: String,

    #[serde(rename = "cicon", skip_serializing_if = "String::is_empty")]
    pub close_icon: String,

    /// Rich text content (editor delta).
    #[serde(skip_serializing_if = "String::is_empty")]
    pub data: String,
}

impl Entity for TabData {
    const KIND: &'static str = "tab";

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
}

impl Listed for TabData {
    fn is_public(&self) -> bool {
        self.show
    }

    fn redact(&mut self) {
        self.note.clear();
    }
}
