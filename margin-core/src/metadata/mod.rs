//! Annotation metadata model and its stored form.
//!
//! A [`DocMeta`] is the full annotation record for one document:
//! document-level [`DocInfo`] plus per-page [`PageMeta`] containers. The
//! stored form is pretty-printed JSON with a fixed field order so that
//! line-oriented diffs of consecutive writes stay readable.

mod doc_info;
mod doc_meta;
mod page_meta;

pub use doc_info::DocInfo;
pub use doc_meta::DocMeta;
pub use page_meta::{AnnotationMap, PageInfo, PageMeta};

use thiserror::Error;

/// Errors in the metadata model and its serialization boundary.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("failed to serialize document metadata: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to parse stored metadata for {fingerprint}: {source}")]
    Deserialize {
        fingerprint: String,
        #[source]
        source: serde_json::Error,
    },

    /// The stored record does not belong to the key it was fetched under.
    #[error("record fetched for {expected} carries fingerprint {actual:?}")]
    FingerprintMismatch { expected: String, actual: String },

    /// A record that was not assembled through the creation path.
    #[error("malformed document record: {0}")]
    Malformed(String),
}
