//! The persistence layer.
//!
//! [`PersistenceLayer`] is the single coherent read/write/delete/file
//! surface for document annotation metadata, independent of which storage
//! backend is active. It centralizes three concerns the backends never see:
//! timestamp and identity bookkeeping, derived-count recomputation, and
//! tag-index maintenance. Everything else delegates.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::datastore::{
    null_error_listener, Backend, Datastore, DatastoreCapabilities, DatastoreError,
    DatastoreMutation, DatastoreOverview, DeleteResult, DocFileMeta, DocMetaFileRef, DocMetaRef,
    ErrorListener, FileRef, SnapshotListener, SnapshotResult,
};
use crate::metadata::{DocInfo, DocMeta, MetadataError};
use crate::tags::{TagsDB, TagsError};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("the persistence layer is not initialized")]
    NotInitialized,

    #[error("the persistence layer has been stopped")]
    Stopped,

    #[error("fingerprint must not be empty")]
    MissingFingerprint,

    /// The fingerprint argument and the record's own fingerprint disagree.
    #[error("fingerprint {argument:?} does not match the record's {record:?}")]
    FingerprintMismatch { argument: String, record: String },

    /// The backend contract promises serialized text; anything else is a
    /// backend defect, not an expected runtime condition.
    #[error("stored record for {fingerprint} is not text")]
    NonTextPayload {
        fingerprint: String,
        #[source]
        source: std::str::Utf8Error,
    },

    #[error("failed to load the tag index")]
    Tags(#[from] TagsError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Datastore(#[from] DatastoreError),
}

/// Options threaded through [`PersistenceLayer::write`].
#[derive(Default)]
pub struct WriteOpts {
    /// Completion handle resolved with the updated [`DocInfo`] once the
    /// backend write has acknowledged, and rejected when it fails.
    pub datastore_mutation: Option<Arc<DatastoreMutation<DocInfo>>>,
}

enum Lifecycle {
    Uninitialized,
    Active { tags_db: Arc<TagsDB> },
    Stopped,
}

pub struct PersistenceLayer {
    datastore: Arc<dyn Datastore>,
    lifecycle: RwLock<Lifecycle>,
}

impl PersistenceLayer {
    pub fn new(datastore: Arc<dyn Datastore>) -> Self {
        Self {
            datastore,
            lifecycle: RwLock::new(Lifecycle::Uninitialized),
        }
    }

    /// Initializes the backend, then loads the tag index from its
    /// preference store. Must complete before any other operation.
    pub async fn init(&self) -> Result<(), PersistenceError> {
        match &*self.lifecycle.read() {
            Lifecycle::Uninitialized => {}
            Lifecycle::Active { .. } => return Ok(()),
            Lifecycle::Stopped => return Err(PersistenceError::Stopped),
        }

        self.datastore.init().await?;

        let tags_db = Arc::new(TagsDB::new(self.datastore.prefs()));
        tags_db.init()?;

        *self.lifecycle.write() = Lifecycle::Active { tags_db };
        Ok(())
    }

    /// Tears down the backend. Terminal: no operation is valid afterwards.
    pub async fn stop(&self) -> Result<(), PersistenceError> {
        self.tags_db()?;
        self.datastore.stop().await?;
        *self.lifecycle.write() = Lifecycle::Stopped;
        Ok(())
    }

    /// The repository-wide tag index. Valid once initialized.
    pub fn tags_db(&self) -> Result<Arc<TagsDB>, PersistenceError> {
        match &*self.lifecycle.read() {
            Lifecycle::Uninitialized => Err(PersistenceError::NotInitialized),
            Lifecycle::Active { tags_db } => Ok(tags_db.clone()),
            Lifecycle::Stopped => Err(PersistenceError::Stopped),
        }
    }

    fn ensure_active(&self) -> Result<(), PersistenceError> {
        self.tags_db().map(|_| ())
    }

    pub async fn contains(&self, fingerprint: &str) -> Result<bool, PersistenceError> {
        self.ensure_active()?;
        Ok(self.datastore.contains(fingerprint).await?)
    }

    /// The stored record for `fingerprint`, or `None` when absent.
    pub async fn get_doc_meta(
        &self,
        fingerprint: &str,
    ) -> Result<Option<DocMeta>, PersistenceError> {
        self.ensure_active()?;

        if fingerprint.is_empty() {
            return Err(PersistenceError::MissingFingerprint);
        }

        let Some(bytes) = self.datastore.get_doc_meta(fingerprint).await? else {
            return Ok(None);
        };

        let text =
            std::str::from_utf8(&bytes).map_err(|source| PersistenceError::NonTextPayload {
                fingerprint: fingerprint.to_string(),
                source,
            })?;

        Ok(Some(DocMeta::deserialize(text, fingerprint)?))
    }

    /// Derives the bookkeeping fields of `doc_meta`, persists the record,
    /// and returns the updated document metadata.
    ///
    /// The caller's record is never touched; derivation happens on an owned
    /// copy. On every call, in order: `last_updated` is set, the five
    /// category counters are recomputed from scratch across all pages,
    /// `nr_annotations` becomes their sum, `added` is set on the first
    /// write only, and a fresh `uuid` marks this write in the document's
    /// write sequence. The record is then serialized and handed to the
    /// backend together with the updated `DocInfo`.
    pub async fn write(
        &self,
        fingerprint: &str,
        doc_meta: &DocMeta,
        opts: WriteOpts,
    ) -> Result<DocInfo, PersistenceError> {
        match self.do_write(fingerprint, doc_meta).await {
            Ok(doc_info) => {
                if let Some(mutation) = &opts.datastore_mutation {
                    mutation.resolve(doc_info.clone());
                }
                Ok(doc_info)
            }
            Err(e) => {
                if let Some(mutation) = &opts.datastore_mutation {
                    mutation.reject(e.to_string());
                }
                Err(e)
            }
        }
    }

    async fn do_write(
        &self,
        fingerprint: &str,
        doc_meta: &DocMeta,
    ) -> Result<DocInfo, PersistenceError> {
        self.ensure_active()?;

        if fingerprint.is_empty() {
            return Err(PersistenceError::MissingFingerprint);
        }
        doc_meta.validate()?;
        if doc_meta.doc_info.fingerprint != fingerprint {
            return Err(PersistenceError::FingerprintMismatch {
                argument: fingerprint.to_string(),
                record: doc_meta.doc_info.fingerprint.clone(),
            });
        }

        let mut updated = doc_meta.clone();
        let now = Utc::now();

        let nr_comments = updated.count_of(|page| &page.comments);
        let nr_notes = updated.count_of(|page| &page.notes);
        let nr_flashcards = updated.count_of(|page| &page.flashcards);
        let nr_text_highlights = updated.count_of(|page| &page.text_highlights);
        let nr_area_highlights = updated.count_of(|page| &page.area_highlights);

        let uuid = Uuid::new_v4();

        let info = &mut updated.doc_info;
        info.last_updated = Some(now);
        info.nr_comments = nr_comments;
        info.nr_notes = nr_notes;
        info.nr_flashcards = nr_flashcards;
        info.nr_text_highlights = nr_text_highlights;
        info.nr_area_highlights = nr_area_highlights;
        info.nr_annotations =
            nr_comments + nr_notes + nr_flashcards + nr_text_highlights + nr_area_highlights;
        if info.added.is_none() {
            info.added = Some(now);
        }
        info.uuid = Some(uuid);

        info!(fingerprint, %uuid, "writing document metadata");

        // Pretty-printed with a fixed field order; anything else makes
        // line-oriented diffing of the stored records useless.
        let data = updated.serialize()?;
        let doc_info = updated.doc_info;

        self.datastore
            .write(fingerprint, data, doc_info.clone())
            .await?;

        Ok(doc_info)
    }

    /// Convenience over [`write`](Self::write) that takes the fingerprint
    /// from the record itself and maintains the tag index on the way.
    ///
    /// Index maintenance is best-effort: a tag-index failure is logged and
    /// swallowed, and the primary write proceeds unaffected.
    pub async fn write_doc_meta(
        &self,
        doc_meta: &DocMeta,
        datastore_mutation: Option<Arc<DatastoreMutation<DocInfo>>>,
    ) -> Result<DocInfo, PersistenceError> {
        self.ensure_active()?;

        if doc_meta.doc_info.fingerprint.is_empty() {
            return Err(PersistenceError::MissingFingerprint);
        }

        self.write_doc_meta_tags(doc_meta).await;

        let fingerprint = doc_meta.doc_info.fingerprint.clone();
        self.write(&fingerprint, doc_meta, WriteOpts { datastore_mutation })
            .await
    }

    async fn write_doc_meta_tags(&self, doc_meta: &DocMeta) {
        let Ok(tags_db) = self.tags_db() else {
            return;
        };

        let tags = doc_meta.tags();
        for tag in &tags {
            tags_db.register_when_absent(tag.clone());
        }

        match tags_db.persist().await {
            Ok(()) => debug!(count = tags.len(), "wrote document tags to the tag index"),
            Err(e) => warn!(error = %e, "failed to write document tags"),
        }
    }

    pub async fn delete(&self, doc_ref: &DocMetaFileRef) -> Result<DeleteResult, PersistenceError> {
        self.ensure_active()?;
        Ok(self.datastore.delete(doc_ref).await?)
    }

    pub async fn synchronize_docs(&self, refs: &[DocMetaRef]) -> Result<(), PersistenceError> {
        self.ensure_active()?;
        Ok(self.datastore.synchronize_docs(refs).await?)
    }

    pub async fn get_doc_meta_refs(&self) -> Result<Vec<DocMetaRef>, PersistenceError> {
        self.ensure_active()?;
        Ok(self.datastore.get_doc_meta_refs().await?)
    }

    /// Subscribes to the backend's change stream: one event with current
    /// state immediately, then one per mutation until unsubscribed. This
    /// layer adds no buffering or coalescing.
    pub async fn snapshot(
        &self,
        listener: SnapshotListener,
        error_listener: Option<ErrorListener>,
    ) -> Result<SnapshotResult, PersistenceError> {
        self.ensure_active()?;
        let error_listener = error_listener.unwrap_or_else(null_error_listener);
        Ok(self.datastore.snapshot(listener, error_listener).await?)
    }

    pub fn add_doc_meta_snapshot_event_listener(
        &self,
        listener: SnapshotListener,
    ) -> Result<(), PersistenceError> {
        self.ensure_active()?;
        self.datastore.add_doc_meta_snapshot_event_listener(listener);
        Ok(())
    }

    pub async fn create_backup(&self) -> Result<(), PersistenceError> {
        self.ensure_active()?;
        Ok(self.datastore.create_backup().await?)
    }

    pub async fn write_file(
        &self,
        backend: Backend,
        file_ref: &FileRef,
        data: Vec<u8>,
    ) -> Result<DocFileMeta, PersistenceError> {
        self.ensure_active()?;
        Ok(self.datastore.write_file(backend, file_ref, data).await?)
    }

    pub async fn contains_file(
        &self,
        backend: Backend,
        file_ref: &FileRef,
    ) -> Result<bool, PersistenceError> {
        self.ensure_active()?;
        Ok(self.datastore.contains_file(backend, file_ref).await?)
    }

    pub async fn get_file(
        &self,
        backend: Backend,
        file_ref: &FileRef,
    ) -> Result<Vec<u8>, PersistenceError> {
        self.ensure_active()?;
        Ok(self.datastore.get_file(backend, file_ref).await?)
    }

    pub async fn delete_file(
        &self,
        backend: Backend,
        file_ref: &FileRef,
    ) -> Result<(), PersistenceError> {
        self.ensure_active()?;
        Ok(self.datastore.delete_file(backend, file_ref).await?)
    }

    pub async fn overview(&self) -> Result<Option<DatastoreOverview>, PersistenceError> {
        self.ensure_active()?;
        Ok(self.datastore.overview().await?)
    }

    pub fn capabilities(&self) -> Result<DatastoreCapabilities, PersistenceError> {
        self.ensure_active()?;
        Ok(self.datastore.capabilities())
    }

    pub async fn deactivate(&self) -> Result<(), PersistenceError> {
        self.ensure_active()?;
        Ok(self.datastore.deactivate().await?)
    }
}
