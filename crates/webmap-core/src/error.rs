//! Error type shared by every store and the facade.
//!
//! | Variant | Meaning | Typical response |
//! |---------|---------|------------------|
//! | `NotFound` | ID or key does not exist | 404 |
//! | `AlreadyExists` | Unique key taken on create | 400 / 409 |
//! | `TokenGeneration` | Random token retries exhausted | 500, retry later |
//! | `Json` / `Io` | Snapshot could not be read or written | Abort startup / log |
//! | `Corrupt` | Duplicate keys, allocator overflow, order mismatch | Refuse to run |
//! | `Password` | bcrypt failure | 500 |
//! | `ContentMismatch` | Stored file size or checksum differs | 419 |

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    #[error("{kind} already exists: {key}")]
    AlreadyExists { kind: &'static str, key: String },

    #[error("failed to generate a unique {kind} token")]
    TokenGeneration { kind: &'static str },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The in-memory or on-disk state violates a store invariant.
    ///
    /// Never recoverable: the process must not keep serving from a store
    /// that reported this.
    #[error("corrupted {kind} store: {reason}")]
    Corrupt { kind: &'static str, reason: String },

    #[error("password hashing failed: {0}")]
    Password(#[from] bcrypt::BcryptError),

    #[error("stored content does not match its record: {name}")]
    ContentMismatch { name: String },
}

impl StoreError {
    pub(crate) fn not_found(kind: &'static str, key: impl ToString) -> Self {
        StoreError::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    pub(crate) fn corrupt(kind: &'static str, reason: impl Into<String>) -> Self {
        let err = StoreError::Corrupt {
            kind,
            reason: reason.into(),
        };
        log::error!("{}", err);
        err
    }

    /// True for conditions that mean the data can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Corrupt { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_corruption_is_fatal() {
        assert!(StoreError::corrupt("layer", "duplicate ID 3").is_fatal());
        assert!(!StoreError::not_found("layer", 3).is_fatal());
        assert!(!StoreError::TokenGeneration { kind: "hook" }.is_fatal());
    }

    #[test]
    fn display_names_kind_and_key() {
        let err = StoreError::not_found("attachment", 42);
        assert_eq!(err.to_string(), "attachment not found: 42");
        assert!(err.is_not_found());
    }
}
