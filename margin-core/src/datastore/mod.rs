//! Storage backends for annotation metadata.
//!
//! [`Datastore`] is the contract the persistence layer writes through. A
//! backend stores the serialized text of each document record under its
//! fingerprint, binary attachments under a [`Backend`] tag, and a small
//! preference store; it advertises every mutation to snapshot listeners.
//!
//! Two implementations ship here: [`MemoryDatastore`] for tests and
//! ephemeral use, [`DiskDatastore`] for a local repository directory.

mod disk;
mod error;
mod memory;
mod mutation;
mod prefs;
mod snapshot;

pub use disk::DiskDatastore;
pub use error::DatastoreError;
pub use memory::MemoryDatastore;
pub use mutation::{DatastoreMutation, MutationError};
pub use prefs::{DiskPrefs, MemoryPrefs, PrefsProvider, SharedPrefs};
pub use snapshot::{
    null_error_listener, ErrorListener, SnapshotEvent, SnapshotListener, SnapshotResult,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metadata::DocInfo;

/// Reference to a document's metadata record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocMetaRef {
    pub fingerprint: String,
}

impl DocMetaRef {
    pub fn new(fingerprint: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
        }
    }
}

/// Reference used when deleting a document: the metadata record plus,
/// optionally, the imported source file that should go with it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocMetaFileRef {
    pub fingerprint: String,
    pub doc_file: Option<FileRef>,
}

/// Reference to a stored attachment within a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub name: String,
}

impl FileRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Attachment backends, each its own namespace of file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Imported source documents.
    Stash,
    /// Extracted page and screenshot images.
    Image,
    /// Everything else attached to a document.
    Attachment,
}

impl Backend {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Backend::Stash => "stash",
            Backend::Image => "image",
            Backend::Attachment => "attachment",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

/// Descriptor of a stored attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocFileMeta {
    pub backend: Backend,
    pub file_ref: FileRef,
    /// Location the attachment can be fetched from.
    pub url: String,
}

/// Outcome of a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeleteResult {
    pub doc_meta_deleted: bool,
    pub doc_file_deleted: bool,
}

/// How a backend reaches its storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkLayer {
    Local,
    Web,
}

/// What the caller is allowed to do with the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatastoreCapabilities {
    pub network_layer: NetworkLayer,
    pub permission: Permission,
}

/// Repository-level facts about a backend's contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatastoreOverview {
    /// When the repository was first initialized, if known.
    pub created: Option<DateTime<Utc>>,
    pub nr_docs: u64,
}

/// Contract every storage backend satisfies.
///
/// Records travel across this boundary in their serialized textual form;
/// the backend never interprets them beyond storing bytes. The `DocInfo`
/// passed to `write` is the already-derived document metadata, carried
/// separately so the backend can advertise it to snapshot listeners
/// without parsing the payload.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Prepares the backend. Must complete before any other operation.
    async fn init(&self) -> Result<(), DatastoreError>;

    /// Tears the backend down; no operation is valid afterwards.
    async fn stop(&self) -> Result<(), DatastoreError>;

    async fn contains(&self, fingerprint: &str) -> Result<bool, DatastoreError>;

    /// The stored record in serialized form, or `None` when absent.
    async fn get_doc_meta(&self, fingerprint: &str) -> Result<Option<Vec<u8>>, DatastoreError>;

    async fn write(
        &self,
        fingerprint: &str,
        data: String,
        doc_info: DocInfo,
    ) -> Result<(), DatastoreError>;

    async fn delete(&self, doc_ref: &DocMetaFileRef) -> Result<DeleteResult, DatastoreError>;

    async fn synchronize_docs(&self, refs: &[DocMetaRef]) -> Result<(), DatastoreError>;

    async fn get_doc_meta_refs(&self) -> Result<Vec<DocMetaRef>, DatastoreError>;

    /// Subscribes `listener` to the change stream. The listener first
    /// receives a single event describing current state, then one event per
    /// mutation until the returned handle is used to unsubscribe.
    async fn snapshot(
        &self,
        listener: SnapshotListener,
        error_listener: ErrorListener,
    ) -> Result<SnapshotResult, DatastoreError>;

    /// Enrolls a listener in mutation events without an initial snapshot.
    fn add_doc_meta_snapshot_event_listener(&self, listener: SnapshotListener);

    async fn create_backup(&self) -> Result<(), DatastoreError>;

    async fn write_file(
        &self,
        backend: Backend,
        file_ref: &FileRef,
        data: Vec<u8>,
    ) -> Result<DocFileMeta, DatastoreError>;

    async fn contains_file(
        &self,
        backend: Backend,
        file_ref: &FileRef,
    ) -> Result<bool, DatastoreError>;

    async fn get_file(&self, backend: Backend, file_ref: &FileRef)
        -> Result<Vec<u8>, DatastoreError>;

    async fn delete_file(
        &self,
        backend: Backend,
        file_ref: &FileRef,
    ) -> Result<(), DatastoreError>;

    async fn overview(&self) -> Result<Option<DatastoreOverview>, DatastoreError>;

    fn capabilities(&self) -> DatastoreCapabilities;

    /// Releases any claim the backend holds on its storage without a full
    /// `stop`.
    async fn deactivate(&self) -> Result<(), DatastoreError>;

    /// The backend's preference store. Used once, at persistence-layer
    /// init, to build the tag index.
    fn prefs(&self) -> SharedPrefs;
}

/// Returns an error unless `name` is safe to use inside a backend's
/// storage layout.
pub(crate) fn checked_file_name(name: &str) -> Result<&str, DatastoreError> {
    let safe = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\');

    if safe {
        Ok(name)
    } else {
        Err(DatastoreError::InvalidFileName(name.to_string()))
    }
}

/// Returns an error unless `fingerprint` is usable as a storage key.
pub(crate) fn checked_fingerprint(fingerprint: &str) -> Result<&str, DatastoreError> {
    if crate::fingerprint::is_well_formed(fingerprint) {
        Ok(fingerprint)
    } else {
        Err(DatastoreError::InvalidFingerprint(fingerprint.to_string()))
    }
}
