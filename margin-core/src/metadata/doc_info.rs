//! Document-level metadata.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tags::Tag;

/// Document-level metadata: identity, timestamps, and the derived
/// annotation counters.
///
/// Persisted as the `docInfo` object of the stored record. The counters
/// are recomputed from the page content on every write; nothing here is
/// incrementally maintained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocInfo {
    /// Stable content-derived identifier. Never changes across writes.
    pub fingerprint: String,

    /// Write-sequence marker. Regenerated on every successful write so that
    /// racing writers are detectable downstream.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,

    /// Display title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Name of the imported source file in the stash backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Number of pages in the document.
    pub nr_pages: u32,

    /// Set on the first write, preserved by every later one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added: Option<DateTime<Utc>>,

    /// Set on every write.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,

    pub nr_comments: u32,
    pub nr_notes: u32,
    pub nr_flashcards: u32,
    pub nr_text_highlights: u32,
    pub nr_area_highlights: u32,

    /// Always the sum of the five category counters.
    pub nr_annotations: u32,

    /// Document-level tags keyed by tag id.
    #[serde(default)]
    pub tags: BTreeMap<String, Tag>,
}

impl DocInfo {
    /// Creates metadata for a document that has never been written.
    pub fn new(fingerprint: impl Into<String>, nr_pages: u32) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            uuid: None,
            title: None,
            filename: None,
            nr_pages,
            added: None,
            last_updated: None,
            nr_comments: 0,
            nr_notes: 0,
            nr_flashcards: 0,
            nr_text_highlights: 0,
            nr_area_highlights: 0,
            nr_annotations: 0,
            tags: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_doc_info() {
        let info = DocInfo::new("0xabc", 7);
        assert_eq!(info.fingerprint, "0xabc");
        assert_eq!(info.nr_pages, 7);
        assert_eq!(info.nr_annotations, 0);
        assert!(info.uuid.is_none());
        assert!(info.added.is_none());
    }

    #[test]
    fn test_wire_field_names() {
        let info = DocInfo::new("0xabc", 1);
        let value = serde_json::to_value(&info).unwrap();
        assert!(value.get("nrComments").is_some());
        assert!(value.get("nrAnnotations").is_some());
        assert!(value.get("nrPages").is_some());
        // unset optionals are omitted, not serialized as null
        assert!(value.get("uuid").is_none());
        assert!(value.get("added").is_none());
    }
}
