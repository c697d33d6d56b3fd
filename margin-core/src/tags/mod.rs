//! Tags and the repository-wide tag index.

mod tags_db;

pub use tags_db::TagsDB;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::datastore::DatastoreError;

/// Errors from tag parsing and tag-index persistence.
#[derive(Debug, Error)]
pub enum TagsError {
    #[error("invalid tag label {label:?}: {reason}")]
    InvalidLabel { label: String, reason: &'static str },

    #[error("failed to decode the stored tag index: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to encode the tag index: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to persist the tag index")]
    Persist(#[from] DatastoreError),
}

/// A tag known to the repository.
///
/// `id` and `label` hold the canonical parsed form; a leading `#` typed by
/// a user is not part of either.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub label: String,
}

impl Tag {
    /// Parses a user-supplied label into a tag.
    ///
    /// Trims surrounding whitespace and strips one leading `#`. Labels that
    /// are empty after that, or contain whitespace or commas, are rejected.
    pub fn parse(label: &str) -> Result<Self, TagsError> {
        let label = label.trim();
        let label = label.strip_prefix('#').unwrap_or(label);

        if label.is_empty() {
            return Err(TagsError::InvalidLabel {
                label: label.to_string(),
                reason: "empty",
            });
        }

        if label.chars().any(|c| c.is_whitespace() || c == ',') {
            return Err(TagsError::InvalidLabel {
                label: label.to_string(),
                reason: "contains whitespace or commas",
            });
        }

        Ok(Self {
            id: label.to_string(),
            label: label.to_string(),
        })
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_label() {
        let tag = Tag::parse("linux").unwrap();
        assert_eq!(tag.id, "linux");
        assert_eq!(tag.label, "linux");
    }

    #[test]
    fn test_parse_strips_hash_and_whitespace() {
        let tag = Tag::parse("  #reading ").unwrap();
        assert_eq!(tag.label, "reading");
    }

    #[test]
    fn test_parse_keeps_folder_tags() {
        let tag = Tag::parse("papers/compilers").unwrap();
        assert_eq!(tag.label, "papers/compilers");
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(Tag::parse("").is_err());
        assert!(Tag::parse("#").is_err());
        assert!(Tag::parse("   ").is_err());
    }

    #[test]
    fn test_parse_rejects_whitespace_and_commas() {
        assert!(Tag::parse("two words").is_err());
        assert!(Tag::parse("a,b").is_err());
    }
}
