//! Margin core library
//!
//! Annotation metadata for documents in a personal repository: the
//! [`DocMeta`] record model, content fingerprints, storage backends behind
//! the [`Datastore`] contract, the repository-wide tag index, and the
//! [`PersistenceLayer`] that mediates every read and write.

pub mod datastore;
pub mod fingerprint;
pub mod metadata;
pub mod persistence;
pub mod tags;

pub use datastore::{
    Backend, Datastore, DatastoreCapabilities, DatastoreError, DatastoreMutation,
    DatastoreOverview, DeleteResult, DiskDatastore, DocFileMeta, DocMetaFileRef, DocMetaRef,
    FileRef, MemoryDatastore, MutationError, NetworkLayer, Permission, SnapshotEvent,
    SnapshotResult,
};
pub use metadata::{DocInfo, DocMeta, MetadataError, PageMeta};
pub use persistence::{PersistenceError, PersistenceLayer, WriteOpts};
pub use tags::{Tag, TagsDB, TagsError};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
