//! Overlay layer groups.

use serde::{Deserialize, Serialize};

use super::{is_false, is_zero_f32};
use crate::store::{Entity, Listed};

pub type LayerId = u64;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerGroup {
    #[serde(rename = "lyid")]
    pub id: LayerId,

    pub name: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub note: String,

    #[serde(skip_serializing_if = "is_false")]
    pub hide: bool,

    /// Visible when the map opens.
    #[serde(skip_serializing_if = "is_false")]
    pub show: bool,

    #[serde(rename = "attr", skip_serializing_if = "String::is_empty")]
    pub attribution: String,

    /// Attachment or hook token the layer data is served from.
    pub token: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub color: String,

    #[serde(rename = "fillcolor", skip_serializing_if = "String::is_empty")]
    pub fill_color: String,

    #[serde(skip_serializing_if = "is_zero_f32")]
    pub opacity: f32,

    /// Render as a UV vector field (wind map etc).
    #[serde(skip_serializing_if = "is_false")]
    pub uv: bool,

    #[serde(rename = "velocityScale", skip_serializing_if = "is_zero_f32")]
    pub velocity_scale: f32,

    /// Data comes from a hook and refreshes.
    #[serde(rename = "dyn", skip_serializing_if = "is_false")]
    pub dynamic: bool,
}

impl Entity for LayerGroup {
    const KIND: &'static str = "layer";

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
}

impl Listed for LayerGroup {
    fn is_public(&self) -> bool {
        !self.hide
    }

    fn redact(&mut self) {
        self.note.clear();
    }
}
