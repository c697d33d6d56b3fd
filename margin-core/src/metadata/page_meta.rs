//! Per-page annotation containers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Map of annotation id to the raw annotation record.
///
/// The persistence core never interprets annotation bodies; it counts them
/// and scans them for tags. Ordered so the stored form is diff-stable.
pub type AnnotationMap = BTreeMap<String, Value>;

/// Page-level facts independent of annotation content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    /// 1-based page number.
    pub num: u32,
}

/// Per-page container of the five annotation categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub page_info: PageInfo,
    #[serde(default)]
    pub comments: AnnotationMap,
    #[serde(default)]
    pub notes: AnnotationMap,
    #[serde(default)]
    pub flashcards: AnnotationMap,
    #[serde(default)]
    pub text_highlights: AnnotationMap,
    #[serde(default)]
    pub area_highlights: AnnotationMap,
}

impl PageMeta {
    /// Creates an empty page container for page `num`.
    pub fn new(num: u32) -> Self {
        Self {
            page_info: PageInfo { num },
            comments: AnnotationMap::new(),
            notes: AnnotationMap::new(),
            flashcards: AnnotationMap::new(),
            text_highlights: AnnotationMap::new(),
            area_highlights: AnnotationMap::new(),
        }
    }

    /// Total number of annotations on this page across all categories.
    pub fn annotation_count(&self) -> usize {
        self.comments.len()
            + self.notes.len()
            + self.flashcards.len()
            + self.text_highlights.len()
            + self.area_highlights.len()
    }
}
