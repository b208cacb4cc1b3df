//! Entity types and their on-disk JSON shape.
//!
//! Field names follow the snapshot format (`lyid`, `sn`, `fz`, ...); empty
//! and false fields are omitted when written and defaulted when read.

pub mod attachment;
pub mod basemap;
pub mod config;
pub mod hook;
pub mod layer;
pub mod link;
pub mod tab;
pub mod user;

pub use attachment::{AttachId, Attachment};
pub use basemap::{BaseMap, MapId};
pub use config::{TmplIndex, VersionKind};
pub use hook::{HookConfig, HookId};
pub use layer::{LayerGroup, LayerId};
pub use link::{Link, LinkId, LinkOrder};
pub use tab::{TabData, TabId};
pub use user::{User, UserId};

/// Strip directory components from a client-supplied name.
///
/// `..` segments climb at most to the root and the result is always
/// relative, so it can be joined under a storage directory safely.
pub fn clean_name(name: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in name.split(|c| c == '/' || c == '\\') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            p => parts.push(p),
        }
    }
    parts.join("/")
}

pub(crate) fn is_false(v: &bool) -> bool {
    !*v
}

pub(crate) fn is_zero_i32(v: &i32) -> bool {
    *v == 0
}

pub(crate) fn is_zero_i64(v: &i64) -> bool {
    *v == 0
}

pub(crate) fn is_zero_u64(v: &u64) -> bool {
    *v == 0
}

pub(crate) fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_name_removes_traversal() {
        assert_eq!(clean_name("../../etc/passwd"), "etc/passwd");
        assert_eq!(clean_name("/abs/./file.geojson"), "abs/file.geojson");
        assert_eq!(clean_name("a/b/../c.png"), "a/c.png");
        assert_eq!(clean_name("..\\..\\win.ini"), "win.ini");
        assert_eq!(clean_name("wind.json"), "wind.json");
        assert_eq!(clean_name("../"), "");
    }
}
