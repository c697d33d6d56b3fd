//! In-process datastore.
//!
//! Holds everything in maps. Used by tests and as the ephemeral backend;
//! `create_backup` keeps a copy of the document set in memory.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

use crate::metadata::DocInfo;

use super::snapshot::ListenerSet;
use super::{
    checked_file_name, checked_fingerprint, Backend, Datastore, DatastoreCapabilities,
    DatastoreError, DatastoreOverview, DeleteResult, DocFileMeta, DocMetaFileRef, DocMetaRef,
    ErrorListener, FileRef, MemoryPrefs, NetworkLayer, Permission, SharedPrefs, SnapshotEvent,
    SnapshotListener, SnapshotResult,
};

struct StoredDoc {
    data: String,
    doc_info: DocInfo,
}

pub struct MemoryDatastore {
    docs: RwLock<BTreeMap<String, StoredDoc>>,
    files: RwLock<BTreeMap<String, Vec<u8>>>,
    backups: RwLock<Vec<BTreeMap<String, String>>>,
    prefs: Arc<MemoryPrefs>,
    listeners: Arc<ListenerSet>,
    created: RwLock<Option<DateTime<Utc>>>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(BTreeMap::new()),
            files: RwLock::new(BTreeMap::new()),
            backups: RwLock::new(Vec::new()),
            prefs: Arc::new(MemoryPrefs::new()),
            listeners: Arc::new(ListenerSet::new()),
            created: RwLock::new(None),
        }
    }

    /// Number of backups taken so far.
    pub fn backup_count(&self) -> usize {
        self.backups.read().len()
    }

    fn file_key(backend: Backend, file_ref: &FileRef) -> Result<String, DatastoreError> {
        let name = checked_file_name(&file_ref.name)?;
        Ok(format!("{}/{}", backend.dir_name(), name))
    }

    fn doc_infos(&self) -> Vec<DocInfo> {
        self.docs
            .read()
            .values()
            .map(|doc| doc.doc_info.clone())
            .collect()
    }
}

impl Default for MemoryDatastore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn init(&self) -> Result<(), DatastoreError> {
        let mut created = self.created.write();
        if created.is_none() {
            *created = Some(Utc::now());
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), DatastoreError> {
        Ok(())
    }

    async fn contains(&self, fingerprint: &str) -> Result<bool, DatastoreError> {
        let fingerprint = checked_fingerprint(fingerprint)?;
        Ok(self.docs.read().contains_key(fingerprint))
    }

    async fn get_doc_meta(&self, fingerprint: &str) -> Result<Option<Vec<u8>>, DatastoreError> {
        let fingerprint = checked_fingerprint(fingerprint)?;
        Ok(self
            .docs
            .read()
            .get(fingerprint)
            .map(|doc| doc.data.clone().into_bytes()))
    }

    async fn write(
        &self,
        fingerprint: &str,
        data: String,
        doc_info: DocInfo,
    ) -> Result<(), DatastoreError> {
        let fingerprint = checked_fingerprint(fingerprint)?;

        let existed = {
            let mut docs = self.docs.write();
            docs.insert(
                fingerprint.to_string(),
                StoredDoc {
                    data,
                    doc_info: doc_info.clone(),
                },
            )
            .is_some()
        };

        let event = if existed {
            SnapshotEvent::Updated(doc_info)
        } else {
            SnapshotEvent::Created(doc_info)
        };
        self.listeners.emit(&event);

        Ok(())
    }

    async fn delete(&self, doc_ref: &DocMetaFileRef) -> Result<DeleteResult, DatastoreError> {
        let fingerprint = checked_fingerprint(&doc_ref.fingerprint)?;

        let doc_meta_deleted = self.docs.write().remove(fingerprint).is_some();

        let doc_file_deleted = match &doc_ref.doc_file {
            Some(file_ref) => {
                let key = Self::file_key(Backend::Stash, file_ref)?;
                self.files.write().remove(&key).is_some()
            }
            None => false,
        };

        if doc_meta_deleted {
            self.listeners.emit(&SnapshotEvent::Deleted {
                fingerprint: fingerprint.to_string(),
            });
        }

        Ok(DeleteResult {
            doc_meta_deleted,
            doc_file_deleted,
        })
    }

    async fn synchronize_docs(&self, _refs: &[DocMetaRef]) -> Result<(), DatastoreError> {
        // nothing to reconcile with: this backend is its own source of truth
        Ok(())
    }

    async fn get_doc_meta_refs(&self) -> Result<Vec<DocMetaRef>, DatastoreError> {
        Ok(self.docs.read().keys().map(DocMetaRef::new).collect())
    }

    async fn snapshot(
        &self,
        listener: SnapshotListener,
        _error_listener: ErrorListener,
    ) -> Result<SnapshotResult, DatastoreError> {
        listener(&SnapshotEvent::Initial {
            doc_infos: self.doc_infos(),
        });

        let id = self.listeners.add(listener);
        Ok(SnapshotResult::new(id, self.listeners.clone()))
    }

    fn add_doc_meta_snapshot_event_listener(&self, listener: SnapshotListener) {
        self.listeners.add(listener);
    }

    async fn create_backup(&self) -> Result<(), DatastoreError> {
        let copy: BTreeMap<String, String> = self
            .docs
            .read()
            .iter()
            .map(|(fingerprint, doc)| (fingerprint.clone(), doc.data.clone()))
            .collect();

        debug!(nr_docs = copy.len(), "created in-memory backup");
        self.backups.write().push(copy);
        Ok(())
    }

    async fn write_file(
        &self,
        backend: Backend,
        file_ref: &FileRef,
        data: Vec<u8>,
    ) -> Result<DocFileMeta, DatastoreError> {
        let key = Self::file_key(backend, file_ref)?;
        self.files.write().insert(key.clone(), data);

        Ok(DocFileMeta {
            backend,
            file_ref: file_ref.clone(),
            url: format!("memory://{}", key),
        })
    }

    async fn contains_file(
        &self,
        backend: Backend,
        file_ref: &FileRef,
    ) -> Result<bool, DatastoreError> {
        let key = Self::file_key(backend, file_ref)?;
        Ok(self.files.read().contains_key(&key))
    }

    async fn get_file(
        &self,
        backend: Backend,
        file_ref: &FileRef,
    ) -> Result<Vec<u8>, DatastoreError> {
        let key = Self::file_key(backend, file_ref)?;
        self.files
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| DatastoreError::FileNotFound {
                backend: backend.to_string(),
                name: file_ref.name.clone(),
            })
    }

    async fn delete_file(
        &self,
        backend: Backend,
        file_ref: &FileRef,
    ) -> Result<(), DatastoreError> {
        let key = Self::file_key(backend, file_ref)?;
        self.files.write().remove(&key);
        Ok(())
    }

    async fn overview(&self) -> Result<Option<DatastoreOverview>, DatastoreError> {
        Ok(Some(DatastoreOverview {
            created: *self.created.read(),
            nr_docs: self.docs.read().len() as u64,
        }))
    }

    fn capabilities(&self) -> DatastoreCapabilities {
        DatastoreCapabilities {
            network_layer: NetworkLayer::Local,
            permission: Permission::ReadWrite,
        }
    }

    async fn deactivate(&self) -> Result<(), DatastoreError> {
        Ok(())
    }

    fn prefs(&self) -> SharedPrefs {
        self.prefs.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::null_error_listener;
    use crate::metadata::DocMeta;
    use parking_lot::Mutex;

    fn doc_info(fingerprint: &str) -> DocInfo {
        DocMeta::create(fingerprint, 1).doc_info
    }

    #[tokio::test]
    async fn test_write_and_read_back() {
        let store = MemoryDatastore::new();
        store.init().await.unwrap();

        store
            .write("0xfp", "{}".to_string(), doc_info("0xfp"))
            .await
            .unwrap();

        assert!(store.contains("0xfp").await.unwrap());
        assert_eq!(store.get_doc_meta("0xfp").await.unwrap(), Some(b"{}".to_vec()));
        assert_eq!(store.get_doc_meta("0xother").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rejects_malformed_fingerprint() {
        let store = MemoryDatastore::new();
        let result = store.write("../fp", "{}".to_string(), doc_info("../fp")).await;
        assert!(matches!(result, Err(DatastoreError::InvalidFingerprint(_))));
    }

    #[tokio::test]
    async fn test_delete_removes_doc_and_stash_file() {
        let store = MemoryDatastore::new();
        store
            .write("0xfp", "{}".to_string(), doc_info("0xfp"))
            .await
            .unwrap();
        store
            .write_file(Backend::Stash, &FileRef::new("paper.pdf"), vec![1, 2])
            .await
            .unwrap();

        let result = store
            .delete(&DocMetaFileRef {
                fingerprint: "0xfp".to_string(),
                doc_file: Some(FileRef::new("paper.pdf")),
            })
            .await
            .unwrap();

        assert!(result.doc_meta_deleted);
        assert!(result.doc_file_deleted);
        assert!(!store.contains("0xfp").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_absent_doc() {
        let store = MemoryDatastore::new();
        let result = store
            .delete(&DocMetaFileRef {
                fingerprint: "0xgone".to_string(),
                doc_file: None,
            })
            .await
            .unwrap();
        assert!(!result.doc_meta_deleted);
    }

    #[tokio::test]
    async fn test_snapshot_initial_then_incremental() {
        let store = MemoryDatastore::new();
        store
            .write("0xa", "{}".to_string(), doc_info("0xa"))
            .await
            .unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let result = store
            .snapshot(
                Arc::new(move |event| sink.lock().push(format!("{:?}", event))),
                null_error_listener(),
            )
            .await
            .unwrap();

        store
            .write("0xb", "{}".to_string(), doc_info("0xb"))
            .await
            .unwrap();
        store
            .write("0xb", "{}".to_string(), doc_info("0xb"))
            .await
            .unwrap();

        {
            let events = events.lock();
            assert_eq!(events.len(), 3);
            assert!(events[0].starts_with("Initial"));
            assert!(events[1].starts_with("Created"));
            assert!(events[2].starts_with("Updated"));
        }

        result.unsubscribe();
        store
            .write("0xc", "{}".to_string(), doc_info("0xc"))
            .await
            .unwrap();
        assert_eq!(events.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_file_roundtrip() {
        let store = MemoryDatastore::new();
        let file_ref = FileRef::new("page-1.png");

        assert!(!store.contains_file(Backend::Image, &file_ref).await.unwrap());

        let meta = store
            .write_file(Backend::Image, &file_ref, vec![9, 9, 9])
            .await
            .unwrap();
        assert_eq!(meta.url, "memory://image/page-1.png");

        assert!(store.contains_file(Backend::Image, &file_ref).await.unwrap());
        assert_eq!(
            store.get_file(Backend::Image, &file_ref).await.unwrap(),
            vec![9, 9, 9]
        );

        store.delete_file(Backend::Image, &file_ref).await.unwrap();
        assert!(matches!(
            store.get_file(Backend::Image, &file_ref).await,
            Err(DatastoreError::FileNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_overview_and_backup() {
        let store = MemoryDatastore::new();
        store.init().await.unwrap();
        store
            .write("0xfp", "{}".to_string(), doc_info("0xfp"))
            .await
            .unwrap();

        let overview = store.overview().await.unwrap().unwrap();
        assert_eq!(overview.nr_docs, 1);
        assert!(overview.created.is_some());

        store.create_backup().await.unwrap();
        assert_eq!(store.backup_count(), 1);
    }
}
