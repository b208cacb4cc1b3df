//! Uploaded files.

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{clean_name, is_false, is_zero_u64, UserId};
use crate::clock::{format_timestamp, truncate_to_secs};
use crate::content;
use crate::error::Result;
use crate::store::Entity;
use crate::token::gen_save_suffix;

pub type AttachId = u64;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attachment {
    #[serde(rename = "aid", skip_serializing_if = "is_zero_u64")]
    pub id: AttachId,

    /// Download token, unique, assigned on add.
    pub token: String,

    #[serde(rename = "uid", skip_serializing_if = "is_zero_u64")]
    pub upload_uid: UserId,

    #[serde(rename = "on")]
    pub original_name: String,

    #[serde(rename = "sz")]
    pub size: i64,

    /// Also served as Last-Modified.
    #[serde(rename = "time")]
    pub upload_time: DateTime<Utc>,

    /// Hex SHA-256, also served as the ETag.
    #[serde(rename = "hash")]
    pub checksum: String,

    /// File name under the upload directory.
    #[serde(rename = "sn", skip_serializing_if = "String::is_empty")]
    pub save_name: String,

    /// Soft delete: still downloadable by token, gone from listings.
    #[serde(skip_serializing_if = "is_false")]
    pub hide: bool,
}

impl Attachment {
    /// Record for a fresh upload. ID and token are filled in by the store.
    pub fn new(name: &str, size: i64, now: DateTime<Utc>) -> Self {
        Self {
            original_name: clean_name(name),
            size,
            upload_time: truncate_to_secs(now),
            save_name: format!("{}-{}", format_timestamp(now), gen_save_suffix()),
            ..Self::default()
        }
    }

    pub fn stored_path(&self, base_dir: &Path) -> PathBuf {
        content::stored_path(base_dir, &self.save_name)
    }

    pub fn remove_from(&self, base_dir: &Path) -> std::io::Result<()> {
        std::fs::remove_file(self.stored_path(base_dir))
    }

    /// Open the stored file, rejecting it if size or checksum drifted.
    pub fn open_verified(&self, base_dir: &Path) -> Result<File> {
        content::open_verified(&self.stored_path(base_dir), self.size, &self.checksum)
    }
}

impl Entity for Attachment {
    const KIND: &'static str = "attachment";

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn new_sanitizes_and_stamps() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 8, 7, 6).unwrap();
        let a = Attachment::new("../secret/../track.gpx", 1024, now);

        assert_eq!(a.original_name, "track.gpx");
        assert_eq!(a.size, 1024);
        assert_eq!(a.upload_time, now);
        assert!(a.save_name.starts_with("20240309T080706-"));
        assert_eq!(a.save_name.len(), "20240309T080706-".len() + 16);
        assert_eq!(a.id, 0);
        assert!(a.token.is_empty());
    }

    #[test]
    fn open_verified_uses_save_name() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 8, 7, 6).unwrap();
        let mut a = Attachment::new("hello.txt", 5, now);
        std::fs::write(a.stored_path(dir.path()), b"hello").unwrap();
        a.checksum = content::sha256_reader(&b"hello"[..]).unwrap();

        assert!(a.open_verified(dir.path()).is_ok());

        a.remove_from(dir.path()).unwrap();
        assert!(!a.stored_path(dir.path()).exists());
    }
}
