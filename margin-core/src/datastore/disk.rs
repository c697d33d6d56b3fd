//! Local filesystem datastore.
//!
//! Repository layout under the root directory:
//!
//! ```text
//! docs/<fingerprint>.json      stored document records
//! files/<backend>/<name>       binary attachments
//! backups/<timestamp>/         copies of docs/ taken by create_backup
//! prefs.json                   preference store
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::metadata::{DocInfo, DocMeta};

use super::snapshot::ListenerSet;
use super::{
    checked_file_name, checked_fingerprint, Backend, Datastore, DatastoreCapabilities,
    DatastoreError, DatastoreOverview, DeleteResult, DiskPrefs, DocFileMeta, DocMetaFileRef,
    DocMetaRef, ErrorListener, FileRef, NetworkLayer, Permission, PrefsProvider, SharedPrefs,
    SnapshotEvent, SnapshotListener, SnapshotResult,
};

/// Preference key recording when the repository was first initialized.
const CREATED_PREF_KEY: &str = "created";

pub struct DiskDatastore {
    root: PathBuf,
    prefs: Arc<DiskPrefs>,
    listeners: Arc<ListenerSet>,
}

impl DiskDatastore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let prefs = Arc::new(DiskPrefs::new(root.join("prefs.json")));
        Self {
            root,
            prefs,
            listeners: Arc::new(ListenerSet::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn docs_dir(&self) -> PathBuf {
        self.root.join("docs")
    }

    fn backups_dir(&self) -> PathBuf {
        self.root.join("backups")
    }

    fn doc_path(&self, fingerprint: &str) -> Result<PathBuf, DatastoreError> {
        let fingerprint = checked_fingerprint(fingerprint)?;
        Ok(self.docs_dir().join(format!("{}.json", fingerprint)))
    }

    fn file_path(&self, backend: Backend, file_ref: &FileRef) -> Result<PathBuf, DatastoreError> {
        let name = checked_file_name(&file_ref.name)?;
        Ok(self.root.join("files").join(backend.dir_name()).join(name))
    }

    /// Reads every stored record's `DocInfo`, reporting unparseable files
    /// through `error_listener` and skipping them.
    fn scan_doc_infos(&self, error_listener: &ErrorListener) -> Vec<DocInfo> {
        let mut doc_infos = Vec::new();

        for doc_ref in self.list_refs().unwrap_or_default() {
            let path = match self.doc_path(&doc_ref.fingerprint) {
                Ok(path) => path,
                Err(e) => {
                    error_listener(&e);
                    continue;
                }
            };

            let text = match fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    error_listener(&DatastoreError::Io(path, e));
                    continue;
                }
            };

            match DocMeta::deserialize(&text, &doc_ref.fingerprint) {
                Ok(doc_meta) => doc_infos.push(doc_meta.doc_info),
                Err(e) => {
                    error_listener(&DatastoreError::Corrupt(path, e.to_string()));
                }
            }
        }

        doc_infos
    }

    fn list_refs(&self) -> Result<Vec<DocMetaRef>, DatastoreError> {
        let docs_dir = self.docs_dir();

        let entries = match fs::read_dir(&docs_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DatastoreError::Io(docs_dir, e)),
        };

        let mut refs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DatastoreError::Io(docs_dir.clone(), e))?;
            let name = entry.file_name();
            if let Some(fingerprint) = name.to_string_lossy().strip_suffix(".json") {
                refs.push(DocMetaRef::new(fingerprint));
            }
        }

        refs.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        Ok(refs)
    }
}

#[async_trait]
impl Datastore for DiskDatastore {
    async fn init(&self) -> Result<(), DatastoreError> {
        fs::create_dir_all(self.docs_dir())
            .map_err(|e| DatastoreError::Io(self.docs_dir(), e))?;

        self.prefs.load()?;
        if self.prefs.get(CREATED_PREF_KEY).is_none() {
            self.prefs
                .set(CREATED_PREF_KEY, Utc::now().to_rfc3339());
            self.prefs.commit().await?;
        }

        debug!(root = %self.root.display(), "initialized disk datastore");
        Ok(())
    }

    async fn stop(&self) -> Result<(), DatastoreError> {
        Ok(())
    }

    async fn contains(&self, fingerprint: &str) -> Result<bool, DatastoreError> {
        Ok(self.doc_path(fingerprint)?.exists())
    }

    async fn get_doc_meta(&self, fingerprint: &str) -> Result<Option<Vec<u8>>, DatastoreError> {
        let path = self.doc_path(fingerprint)?;

        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DatastoreError::Io(path, e)),
        }
    }

    async fn write(
        &self,
        fingerprint: &str,
        data: String,
        doc_info: DocInfo,
    ) -> Result<(), DatastoreError> {
        let path = self.doc_path(fingerprint)?;
        let existed = path.exists();

        fs::create_dir_all(self.docs_dir())
            .map_err(|e| DatastoreError::Io(self.docs_dir(), e))?;
        fs::write(&path, data).map_err(|e| DatastoreError::Io(path, e))?;

        let event = if existed {
            SnapshotEvent::Updated(doc_info)
        } else {
            SnapshotEvent::Created(doc_info)
        };
        self.listeners.emit(&event);

        Ok(())
    }

    async fn delete(&self, doc_ref: &DocMetaFileRef) -> Result<DeleteResult, DatastoreError> {
        let path = self.doc_path(&doc_ref.fingerprint)?;

        let doc_meta_deleted = match fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(DatastoreError::Io(path, e)),
        };

        let doc_file_deleted = match &doc_ref.doc_file {
            Some(file_ref) => {
                let file_path = self.file_path(Backend::Stash, file_ref)?;
                match fs::remove_file(&file_path) {
                    Ok(()) => true,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => false,
                    Err(e) => return Err(DatastoreError::Io(file_path, e)),
                }
            }
            None => false,
        };

        if doc_meta_deleted {
            self.listeners.emit(&SnapshotEvent::Deleted {
                fingerprint: doc_ref.fingerprint.clone(),
            });
        }

        Ok(DeleteResult {
            doc_meta_deleted,
            doc_file_deleted,
        })
    }

    async fn synchronize_docs(&self, _refs: &[DocMetaRef]) -> Result<(), DatastoreError> {
        // local backend: the filesystem is already the source of truth
        Ok(())
    }

    async fn get_doc_meta_refs(&self) -> Result<Vec<DocMetaRef>, DatastoreError> {
        self.list_refs()
    }

    async fn snapshot(
        &self,
        listener: SnapshotListener,
        error_listener: ErrorListener,
    ) -> Result<SnapshotResult, DatastoreError> {
        listener(&SnapshotEvent::Initial {
            doc_infos: self.scan_doc_infos(&error_listener),
        });

        let id = self.listeners.add(listener);
        Ok(SnapshotResult::new(id, self.listeners.clone()))
    }

    fn add_doc_meta_snapshot_event_listener(&self, listener: SnapshotListener) {
        self.listeners.add(listener);
    }

    async fn create_backup(&self) -> Result<(), DatastoreError> {
        let stamp = Utc::now().format("%Y%m%d-%H%M%S").to_string();
        let backup_dir = self.backups_dir().join(&stamp);

        fs::create_dir_all(&backup_dir)
            .map_err(|e| DatastoreError::Io(backup_dir.clone(), e))?;

        let refs = self.list_refs()?;
        for doc_ref in &refs {
            let source = self.doc_path(&doc_ref.fingerprint)?;
            let target = backup_dir.join(format!("{}.json", doc_ref.fingerprint));
            fs::copy(&source, &target).map_err(|e| DatastoreError::Io(source, e))?;
        }

        info!(backup = %backup_dir.display(), nr_docs = refs.len(), "created backup");
        Ok(())
    }

    async fn write_file(
        &self,
        backend: Backend,
        file_ref: &FileRef,
        data: Vec<u8>,
    ) -> Result<DocFileMeta, DatastoreError> {
        let path = self.file_path(backend, file_ref)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| DatastoreError::Io(parent.to_path_buf(), e))?;
        }
        fs::write(&path, data).map_err(|e| DatastoreError::Io(path.clone(), e))?;

        Ok(DocFileMeta {
            backend,
            file_ref: file_ref.clone(),
            url: format!("file://{}", path.display()),
        })
    }

    async fn contains_file(
        &self,
        backend: Backend,
        file_ref: &FileRef,
    ) -> Result<bool, DatastoreError> {
        Ok(self.file_path(backend, file_ref)?.exists())
    }

    async fn get_file(
        &self,
        backend: Backend,
        file_ref: &FileRef,
    ) -> Result<Vec<u8>, DatastoreError> {
        let path = self.file_path(backend, file_ref)?;

        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(DatastoreError::FileNotFound {
                backend: backend.to_string(),
                name: file_ref.name.clone(),
            }),
            Err(e) => Err(DatastoreError::Io(path, e)),
        }
    }

    async fn delete_file(
        &self,
        backend: Backend,
        file_ref: &FileRef,
    ) -> Result<(), DatastoreError> {
        let path = self.file_path(backend, file_ref)?;

        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DatastoreError::Io(path, e)),
        }
    }

    async fn overview(&self) -> Result<Option<DatastoreOverview>, DatastoreError> {
        let created = self
            .prefs
            .get(CREATED_PREF_KEY)
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|parsed| parsed.with_timezone(&Utc));

        Ok(Some(DatastoreOverview {
            created,
            nr_docs: self.list_refs()?.len() as u64,
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
    use parking_lot::Mutex;
    use tempfile::TempDir;

    fn test_store() -> (DiskDatastore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskDatastore::new(temp_dir.path().join("repo"));
        (store, temp_dir)
    }

    fn stored_doc(fingerprint: &str) -> (String, DocInfo) {
        let doc = DocMeta::create(fingerprint, 1);
        (doc.serialize().unwrap(), doc.doc_info)
    }

    #[tokio::test]
    async fn test_init_creates_layout() {
        let (store, _temp) = test_store();
        store.init().await.unwrap();

        assert!(store.root().join("docs").is_dir());
        assert!(store.root().join("prefs.json").is_file());
    }

    #[tokio::test]
    async fn test_write_read_contains() {
        let (store, _temp) = test_store();
        store.init().await.unwrap();

        let (data, doc_info) = stored_doc("0xfp");
        store.write("0xfp", data.clone(), doc_info).await.unwrap();

        assert!(store.contains("0xfp").await.unwrap());
        assert_eq!(
            store.get_doc_meta("0xfp").await.unwrap(),
            Some(data.into_bytes())
        );
        assert_eq!(store.get_doc_meta("0xmissing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rejects_escaping_fingerprint() {
        let (store, _temp) = test_store();
        store.init().await.unwrap();

        assert!(matches!(
            store.get_doc_meta("../../etc/passwd").await,
            Err(DatastoreError::InvalidFingerprint(_))
        ));
    }

    #[tokio::test]
    async fn test_get_doc_meta_refs_sorted() {
        let (store, _temp) = test_store();
        store.init().await.unwrap();

        for fingerprint in ["0xb", "0xa", "0xc"] {
            let (data, doc_info) = stored_doc(fingerprint);
            store.write(fingerprint, data, doc_info).await.unwrap();
        }

        let refs: Vec<String> = store
            .get_doc_meta_refs()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.fingerprint)
            .collect();
        assert_eq!(refs, vec!["0xa", "0xb", "0xc"]);
    }

    #[tokio::test]
    async fn test_delete_doc_and_stash_file() {
        let (store, _temp) = test_store();
        store.init().await.unwrap();

        let (data, doc_info) = stored_doc("0xfp");
        store.write("0xfp", data, doc_info).await.unwrap();
        store
            .write_file(Backend::Stash, &FileRef::new("paper.pdf"), vec![1])
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

        // deleting again reports nothing left to delete
        let again = store
            .delete(&DocMetaFileRef {
                fingerprint: "0xfp".to_string(),
                doc_file: None,
            })
            .await
            .unwrap();
        assert!(!again.doc_meta_deleted);
    }

    #[tokio::test]
    async fn test_file_roundtrip() {
        let (store, _temp) = test_store();
        store.init().await.unwrap();

        let file_ref = FileRef::new("shot.png");
        let meta = store
            .write_file(Backend::Image, &file_ref, vec![3, 1, 4])
            .await
            .unwrap();
        assert!(meta.url.starts_with("file://"));

        assert!(store.contains_file(Backend::Image, &file_ref).await.unwrap());
        assert_eq!(
            store.get_file(Backend::Image, &file_ref).await.unwrap(),
            vec![3, 1, 4]
        );

        store.delete_file(Backend::Image, &file_ref).await.unwrap();
        assert!(!store.contains_file(Backend::Image, &file_ref).await.unwrap());
    }

    #[tokio::test]
    async fn test_snapshot_reports_existing_docs() {
        let (store, _temp) = test_store();
        store.init().await.unwrap();

        let (data, doc_info) = stored_doc("0xfp");
        store.write("0xfp", data, doc_info).await.unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        store
            .snapshot(
                Arc::new(move |event| sink.lock().push(format!("{:?}", event))),
                null_error_listener(),
            )
            .await
            .unwrap();

        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert!(events[0].starts_with("Initial"));
        assert!(events[0].contains("0xfp"));
    }

    #[tokio::test]
    async fn test_snapshot_reports_corrupt_record_via_error_listener() {
        let (store, _temp) = test_store();
        store.init().await.unwrap();

        fs::write(store.root().join("docs").join("0xbad.json"), "not json").unwrap();

        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        store
            .snapshot(
                Arc::new(|_| {}),
                Arc::new(move |error| sink.lock().push(error.to_string())),
            )
            .await
            .unwrap();

        let errors = errors.lock();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("0xbad"));
    }

    #[tokio::test]
    async fn test_create_backup_copies_docs() {
        let (store, _temp) = test_store();
        store.init().await.unwrap();

        let (data, doc_info) = stored_doc("0xfp");
        store.write("0xfp", data.clone(), doc_info).await.unwrap();
        store.create_backup().await.unwrap();

        let backups: Vec<_> = fs::read_dir(store.root().join("backups"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(backups.len(), 1);

        let copied = fs::read_to_string(backups[0].join("0xfp.json")).unwrap();
        assert_eq!(copied, data);
    }

    #[tokio::test]
    async fn test_overview_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("repo");

        let created = {
            let store = DiskDatastore::new(&root);
            store.init().await.unwrap();
            store.overview().await.unwrap().unwrap().created.unwrap()
        };

        let reopened = DiskDatastore::new(&root);
        reopened.init().await.unwrap();
        let overview = reopened.overview().await.unwrap().unwrap();
        assert_eq!(overview.created, Some(created));
        assert_eq!(overview.nr_docs, 0);
    }
}
