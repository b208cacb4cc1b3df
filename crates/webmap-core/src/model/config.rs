//! Site configuration and cache-busting version stamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{is_false, is_zero_i64};
use crate::clock::format_timestamp;
use crate::token::gen_short;

/// Template parameters for the public page, plus three version stamps that
/// clients compare to detect changes without diffing payloads.
///
/// Missing fields read as empty. The site defaults come from
/// [`TmplIndex::site_default`] and apply only when no config was ever set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TmplIndex {
    #[serde(rename = "title", skip_serializing_if = "String::is_empty")]
    pub site_title: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub logo: String,

    /// e.g. `zh-Hant`
    #[serde(skip_serializing_if = "String::is_empty")]
    pub lang: String,

    /// Web app manifest, raw JSON string.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub manifest: String,

    /// Raw HTML injected into `<head>`.
    #[serde(rename = "head", skip_serializing_if = "String::is_empty")]
    pub html_head: String,

    #[serde(rename = "cstats", skip_serializing_if = "is_false")]
    pub count_stats: bool,

    #[serde(rename = "stats", skip_serializing_if = "is_false")]
    pub show_stats: bool,

    #[serde(rename = "link", skip_serializing_if = "is_false")]
    pub show_link: bool,

    #[serde(rename = "load", skip_serializing_if = "is_false")]
    pub show_user_load: bool,

    #[serde(rename = "loadfs", skip_serializing_if = "is_zero_i64")]
    pub load_limit: i64,

    /// Attachment / resource tokens changed.
    #[serde(rename = "verD", skip_serializing_if = "String::is_empty")]
    pub version_d: String,

    /// Layer, map, link or tab config changed.
    #[serde(rename = "verC", skip_serializing_if = "String::is_empty")]
    pub version_c: String,

    /// Base template or site title changed.
    #[serde(rename = "verA", skip_serializing_if = "String::is_empty")]
    pub version_a: String,
}

/// Which version stamp a change bumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionKind {
    /// `verD`
    Data,
    /// `verC`
    Config,
    /// `verA`
    Assets,
}

impl TmplIndex {
    /// Config served before an admin saves one.
    pub fn site_default() -> Self {
        Self {
            site_title: "map site".to_string(),
            logo: "res/Logo.png".to_string(),
            ..Self::default()
        }
    }

    pub fn version(&self, kind: VersionKind) -> &str {
        match kind {
            VersionKind::Data => &self.version_d,
            VersionKind::Config => &self.version_c,
            VersionKind::Assets => &self.version_a,
        }
    }

    pub fn bump(&mut self, kind: VersionKind, now: DateTime<Utc>) {
        let stamp = gen_version(now);
        match kind {
            VersionKind::Data => self.version_d = stamp,
            VersionKind::Config => self.version_c = stamp,
            VersionKind::Assets => self.version_a = stamp,
        }
    }
}

/// `YYYYMMDDTHHMMSS-xxxxxxxx`
pub fn gen_version(now: DateTime<Utc>) -> String {
    format!("{}-{}", format_timestamp(now), gen_short())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn bump_touches_one_stamp() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let mut conf = TmplIndex::default();
        conf.bump(VersionKind::Config, now);

        assert!(conf.version_c.starts_with("20250601T120000-"));
        assert_eq!(conf.version_c.len(), 24);
        assert!(conf.version_d.is_empty());
        assert!(conf.version_a.is_empty());
    }

    #[test]
    fn consecutive_bumps_differ() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let mut conf = TmplIndex::default();
        conf.bump(VersionKind::Data, now);
        let first = conf.version(VersionKind::Data).to_string();
        conf.bump(VersionKind::Data, now);
        assert_ne!(conf.version(VersionKind::Data), first);
    }

    #[test]
    fn reads_short_names() {
        let conf: TmplIndex =
            serde_json::from_str(r#"{"title":"Wind","stats":true,"verC":"x"}"#).unwrap();
        assert_eq!(conf.site_title, "Wind");
        assert!(conf.show_stats);
        assert_eq!(conf.version_c, "x");
        // Missing fields stay empty
        assert!(conf.logo.is_empty());
    }

    #[test]
    fn empty_title_and_logo_survive_a_round_trip() {
        let conf = TmplIndex {
            lang: "en".to_string(),
            ..TmplIndex::default()
        };
        let json = serde_json::to_string(&conf).unwrap();
        let back: TmplIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(back, conf);
        assert!(back.site_title.is_empty());

        let site = TmplIndex::site_default();
        assert_eq!(site.site_title, "map site");
        assert_eq!(site.logo, "res/Logo.png");
    }
}
