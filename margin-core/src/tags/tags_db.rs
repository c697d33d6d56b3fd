//! Repository-wide tag index.
//!
//! The index lives in the datastore's preference store and is maintained
//! alongside primary writes. Maintenance is best-effort: the persistence
//! layer logs and swallows index failures rather than failing the write
//! that triggered them.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::datastore::PrefsProvider;

use super::{Tag, TagsError};

/// Preference key under which the index is stored.
const PREF_KEY: &str = "tags";

pub struct TagsDB {
    prefs: Arc<dyn PrefsProvider>,
    tags: RwLock<BTreeMap<String, Tag>>,
}

impl TagsDB {
    pub fn new(prefs: Arc<dyn PrefsProvider>) -> Self {
        Self {
            prefs,
            tags: RwLock::new(BTreeMap::new()),
        }
    }

    /// Loads the persisted index. An absent entry means an empty index.
    pub fn init(&self) -> Result<(), TagsError> {
        if let Some(raw) = self.prefs.get(PREF_KEY) {
            let loaded: BTreeMap<String, Tag> =
                serde_json::from_str(&raw).map_err(TagsError::Decode)?;
            *self.tags.write() = loaded;
        }
        Ok(())
    }

    /// Registers a tag unless an identically-keyed one is already known.
    pub fn register_when_absent(&self, tag: Tag) {
        self.tags.write().entry(tag.id.clone()).or_insert(tag);
    }

    /// Snapshot of the known tags, ordered by id.
    pub fn tags(&self) -> Vec<Tag> {
        self.tags.read().values().cloned().collect()
    }

    /// Writes the index back to the preference store and commits it.
    pub async fn persist(&self) -> Result<(), TagsError> {
        let (serialized, count) = {
            let tags = self.tags.read();
            let serialized = serde_json::to_string(&*tags).map_err(TagsError::Encode)?;
            (serialized, tags.len())
        };

        self.prefs.set(PREF_KEY, serialized);
        self.prefs.commit().await?;

        debug!(count, "persisted tag index");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::MemoryPrefs;

    fn tag(label: &str) -> Tag {
        Tag::parse(label).unwrap()
    }

    #[tokio::test]
    async fn test_register_and_list() {
        let db = TagsDB::new(Arc::new(MemoryPrefs::new()));
        db.register_when_absent(tag("zig"));
        db.register_when_absent(tag("ada"));
        db.register_when_absent(tag("zig"));

        let labels: Vec<String> = db.tags().into_iter().map(|t| t.label).collect();
        assert_eq!(labels, vec!["ada", "zig"]);
    }

    #[tokio::test]
    async fn test_persist_and_reload() {
        let prefs = Arc::new(MemoryPrefs::new());

        let db = TagsDB::new(prefs.clone());
        db.register_when_absent(tag("compilers"));
        db.persist().await.unwrap();

        let reloaded = TagsDB::new(prefs);
        reloaded.init().unwrap();
        assert_eq!(reloaded.tags(), db.tags());
    }

    #[tokio::test]
    async fn test_init_rejects_corrupt_index() {
        let prefs = Arc::new(MemoryPrefs::new());
        prefs.set(PREF_KEY, "not json".to_string());

        let db = TagsDB::new(prefs);
        assert!(matches!(db.init(), Err(TagsError::Decode(_))));
    }
}
