//! The full annotation record for one document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tags::Tag;

use super::{AnnotationMap, DocInfo, MetadataError, PageMeta};

/// The complete annotation record for a document: document-level metadata
/// plus per-page annotation content, keyed by 1-based page number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocMeta {
    pub doc_info: DocInfo,
    #[serde(default)]
    pub page_metas: BTreeMap<u32, PageMeta>,
}

impl DocMeta {
    /// Creates a fresh record for a document with `nr_pages` empty pages.
    pub fn create(fingerprint: impl Into<String>, nr_pages: u32) -> Self {
        let fingerprint = fingerprint.into();
        let page_metas = (1..=nr_pages)
            .map(|num| (num, PageMeta::new(num)))
            .collect();
        Self {
            doc_info: DocInfo::new(fingerprint, nr_pages),
            page_metas,
        }
    }

    /// Serializes to the stored form.
    ///
    /// Always pretty-printed with a fixed field order so tools that diff
    /// the stored records line by line stay usable.
    pub fn serialize(&self) -> Result<String, MetadataError> {
        serde_json::to_string_pretty(self).map_err(MetadataError::Serialize)
    }

    /// Parses the stored form fetched under `fingerprint`.
    ///
    /// The record's own fingerprint must agree with the key it was fetched
    /// under.
    pub fn deserialize(text: &str, fingerprint: &str) -> Result<Self, MetadataError> {
        let doc_meta: DocMeta =
            serde_json::from_str(text).map_err(|source| MetadataError::Deserialize {
                fingerprint: fingerprint.to_string(),
                source,
            })?;

        if doc_meta.doc_info.fingerprint != fingerprint {
            return Err(MetadataError::FingerprintMismatch {
                expected: fingerprint.to_string(),
                actual: doc_meta.doc_info.fingerprint,
            });
        }

        Ok(doc_meta)
    }

    /// Structural well-formedness check applied at the write boundary.
    ///
    /// Guards against records assembled outside the creation path: the
    /// fingerprint must be present, and each page entry must be keyed by
    /// its own page number.
    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.doc_info.fingerprint.is_empty() {
            return Err(MetadataError::Malformed(
                "docInfo.fingerprint is empty".to_string(),
            ));
        }

        for (key, page) in &self.page_metas {
            if page.page_info.num != *key {
                return Err(MetadataError::Malformed(format!(
                    "page {} carries pageInfo.num {}",
                    key, page.page_info.num
                )));
            }
        }

        Ok(())
    }

    /// Number of annotations in one category, summed across all pages.
    pub fn count_of<F>(&self, category: F) -> u32
    where
        F: Fn(&PageMeta) -> &AnnotationMap,
    {
        self.page_metas
            .values()
            .map(|page| category(page).len())
            .sum::<usize>() as u32
    }

    /// Total number of annotations across all pages and categories.
    pub fn annotation_count(&self) -> usize {
        self.page_metas
            .values()
            .map(PageMeta::annotation_count)
            .sum()
    }

    /// Collects the document's tag set: document-level tags plus any tag
    /// maps embedded in the (otherwise opaque) annotation records.
    pub fn tags(&self) -> Vec<Tag> {
        let mut tags: BTreeMap<String, Tag> = self.doc_info.tags.clone();

        for page in self.page_metas.values() {
            for value in page
                .comments
                .values()
                .chain(page.notes.values())
                .chain(page.flashcards.values())
                .chain(page.text_highlights.values())
                .chain(page.area_highlights.values())
            {
                collect_annotation_tags(value, &mut tags);
            }
        }

        tags.into_values().collect()
    }
}

/// Best-effort: annotation records are opaque, but when one carries a
/// `tags` object of tag-shaped values, those belong to the document's tag
/// set too.
fn collect_annotation_tags(value: &Value, out: &mut BTreeMap<String, Tag>) {
    let Some(map) = value.get("tags").and_then(Value::as_object) else {
        return;
    };

    for tag_value in map.values() {
        if let Ok(tag) = serde_json::from_value::<Tag>(tag_value.clone()) {
            out.entry(tag.id.clone()).or_insert(tag);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_numbers_pages_from_one() {
        let doc = DocMeta::create("0xfp", 3);
        assert_eq!(doc.page_metas.len(), 3);
        assert_eq!(doc.page_metas[&1].page_info.num, 1);
        assert_eq!(doc.page_metas[&3].page_info.num, 3);
        assert_eq!(doc.doc_info.nr_pages, 3);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let mut doc = DocMeta::create("0xfp", 2);
        doc.page_metas
            .get_mut(&1)
            .unwrap()
            .comments
            .insert("c1".to_string(), json!({"text": "first"}));

        let text = doc.serialize().unwrap();
        assert!(text.contains("\"docInfo\""));
        assert!(text.contains("\"pageMetas\""));
        // pretty-printed, one field per line
        assert!(text.lines().count() > 10);

        let parsed = DocMeta::deserialize(&text, "0xfp").unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn test_serialize_is_stable() {
        let doc = DocMeta::create("0xfp", 2);
        assert_eq!(doc.serialize().unwrap(), doc.serialize().unwrap());
    }

    #[test]
    fn test_deserialize_rejects_foreign_fingerprint() {
        let doc = DocMeta::create("0xother", 1);
        let text = doc.serialize().unwrap();
        let err = DocMeta::deserialize(&text, "0xfp").unwrap_err();
        assert!(matches!(err, MetadataError::FingerprintMismatch { .. }));
    }

    #[test]
    fn test_validate_rejects_empty_fingerprint() {
        let doc = DocMeta::create("", 1);
        assert!(matches!(
            doc.validate(),
            Err(MetadataError::Malformed(_))
        ));
    }

    #[test]
    fn test_validate_rejects_mismatched_page_key() {
        let mut doc = DocMeta::create("0xfp", 1);
        let page = doc.page_metas.remove(&1).unwrap();
        doc.page_metas.insert(9, page);
        assert!(matches!(
            doc.validate(),
            Err(MetadataError::Malformed(_))
        ));
    }

    #[test]
    fn test_count_of() {
        let mut doc = DocMeta::create("0xfp", 2);
        let page1 = doc.page_metas.get_mut(&1).unwrap();
        page1.comments.insert("c1".to_string(), json!({}));
        page1.notes.insert("n1".to_string(), json!({}));
        let page2 = doc.page_metas.get_mut(&2).unwrap();
        page2.comments.insert("c2".to_string(), json!({}));

        assert_eq!(doc.count_of(|p| &p.comments), 2);
        assert_eq!(doc.count_of(|p| &p.notes), 1);
        assert_eq!(doc.count_of(|p| &p.flashcards), 0);
        assert_eq!(doc.annotation_count(), 3);
    }

    #[test]
    fn test_tags_include_annotation_tags() {
        let mut doc = DocMeta::create("0xfp", 1);
        doc.doc_info.tags.insert(
            "rust".to_string(),
            Tag {
                id: "rust".to_string(),
                label: "rust".to_string(),
            },
        );
        doc.page_metas.get_mut(&1).unwrap().text_highlights.insert(
            "t1".to_string(),
            json!({
                "text": "ownership",
                "tags": {
                    "borrowck": {"id": "borrowck", "label": "borrowck"}
                }
            }),
        );

        let mut labels: Vec<String> = doc.tags().into_iter().map(|t| t.label).collect();
        labels.sort();
        assert_eq!(labels, vec!["borrowck", "rust"]);
    }

    #[test]
    fn test_tags_ignore_malformed_annotation_tags() {
        let mut doc = DocMeta::create("0xfp", 1);
        doc.page_metas.get_mut(&1).unwrap().comments.insert(
            "c1".to_string(),
            json!({"tags": {"oops": 42}}),
        );
        assert!(doc.tags().is_empty());
    }
}
