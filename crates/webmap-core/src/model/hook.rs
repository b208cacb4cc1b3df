//! Data feeds pushed by external scripts (wind grids, ocean currents, ...).
//!
//! A hook is created by an admin, which mints two tokens: `token` for
//! anonymous download and `auth` for the script that pushes new data. The
//! data fields (`sz`, `time`, `hash`, `sn`, `ext`) change only on a push.

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{clean_name, is_false, is_zero_u64};
use crate::clock::{format_timestamp, truncate_to_secs};
use crate::content;
use crate::error::Result;
use crate::store::Entity;
use crate::token::gen_save_suffix;

pub type HookId = u64;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookConfig {
    #[serde(rename = "hid", skip_serializing_if = "is_zero_u64")]
    pub id: HookId,

    /// Public download token.
    pub token: String,

    /// Credential for pushing data.
    #[serde(rename = "auth")]
    pub auth_token: String,

    #[serde(rename = "sz")]
    pub size: i64,

    #[serde(rename = "time")]
    pub update_time: DateTime<Utc>,

    #[serde(rename = "hash")]
    pub checksum: String,

    #[serde(rename = "sn", skip_serializing_if = "String::is_empty")]
    pub save_name: String,

    #[serde(rename = "ext", skip_serializing_if = "String::is_empty")]
    pub ext_name: String,

    pub name: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub note: String,

    #[serde(skip_serializing_if = "is_false")]
    pub disable: bool,

    /// geojson, UV json, UV png, UV bin
    #[serde(rename = "type", skip_serializing_if = "String::is_empty")]
    pub render_type: String,
}

impl HookConfig {
    pub fn new(name: impl Into<String>, render_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            render_type: render_type.into(),
            ..Self::default()
        }
    }

    /// Record a data push. The caller fills `checksum` once the bytes are
    /// written to [`HookConfig::stored_path`].
    pub fn set_data(&mut self, name: &str, size: i64, now: DateTime<Utc>) -> &mut Self {
        self.ext_name = clean_name(name);
        self.size = size;
        self.update_time = truncate_to_secs(now);
        self.save_name = format!("{}-{}", format_timestamp(now), gen_save_suffix());
        self
    }

    /// Copy the admin-editable fields from `other`.
    pub fn apply_config(&mut self, other: &HookConfig) {
        self.name = other.name.clone();
        self.note = other.note.clone();
        self.disable = other.disable;
        self.render_type = other.render_type.clone();
    }

    pub fn stored_path(&self, base_dir: &Path) -> PathBuf {
        content::stored_path(base_dir, &self.save_name)
    }

    pub fn remove_from(&self, base_dir: &Path) -> std::io::Result<()> {
        std::fs::remove_file(self.stored_path(base_dir))
    }

    pub fn open_verified(&self, base_dir: &Path) -> Result<File> {
        content::open_verified(&self.stored_path(base_dir), self.size, &self.checksum)
    }
}

impl Entity for HookConfig {
    const KIND: &'static str = "hook";

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
}
