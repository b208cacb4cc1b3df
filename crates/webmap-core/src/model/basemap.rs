//! Base map tile sources.

use serde::{Deserialize, Serialize};

use super::is_false;
use crate::store::{Entity, Listed};

pub type MapId = u64;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseMap {
    #[serde(rename = "mid")]
    pub id: MapId,

    pub name: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub note: String,

    #[serde(skip_serializing_if = "is_false")]
    pub hide: bool,

    #[serde(rename = "attr", skip_serializing_if = "String::is_empty")]
    pub attribution: String,

    /// Tile URL template.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub url: String,

    #[serde(rename = "subdomains", skip_serializing_if = "String::is_empty")]
    pub sub_domain: String,

    #[serde(rename = "errorTileUrl", skip_serializing_if = "String::is_empty")]
    pub err_tile: String,

    #[serde(rename = "maxZoom")]
    pub max_zoom: i32,
}

impl Entity for BaseMap {
    const KIND: &'static str = "map";

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
}

impl Listed for BaseMap {
    fn is_public(&self) -> bool {
        !self.hide
    }

    fn redact(&mut self) {
        self.note.clear();
    }
}
