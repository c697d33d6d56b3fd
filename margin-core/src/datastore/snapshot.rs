//! Snapshot events and listener registration.
//!
//! Every datastore mutation is advertised to registered listeners. A new
//! `snapshot` subscriber first receives a single [`SnapshotEvent::Initial`]
//! describing the current state, then one event per subsequent mutation
//! until it unsubscribes.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::metadata::DocInfo;

use super::DatastoreError;

/// Callback invoked with every snapshot event.
pub type SnapshotListener = Arc<dyn Fn(&SnapshotEvent) + Send + Sync>;

/// Callback invoked with asynchronous backend errors that have no other
/// channel back to the subscriber (e.g. a corrupt record encountered while
/// building the initial snapshot).
pub type ErrorListener = Arc<dyn Fn(&DatastoreError) + Send + Sync>;

/// An error listener that discards everything.
pub fn null_error_listener() -> ErrorListener {
    Arc::new(|_| {})
}

/// A change to the set of stored documents.
#[derive(Debug, Clone)]
pub enum SnapshotEvent {
    /// Current state, delivered once to a new subscriber before any
    /// incremental event.
    Initial { doc_infos: Vec<DocInfo> },

    /// A document was written for the first time.
    Created(DocInfo),

    /// An existing document was overwritten.
    Updated(DocInfo),

    /// A document was removed.
    Deleted { fingerprint: String },
}

/// Handle returned by `snapshot`; dropping it does not unsubscribe.
pub struct SnapshotResult {
    id: u64,
    listeners: Arc<ListenerSet>,
}

impl SnapshotResult {
    pub(crate) fn new(id: u64, listeners: Arc<ListenerSet>) -> Self {
        Self { id, listeners }
    }

    /// Stops delivery of further events to this subscriber.
    pub fn unsubscribe(self) {
        self.listeners.remove(self.id);
    }
}

/// Registry of snapshot listeners shared by a datastore's mutation paths.
pub(crate) struct ListenerSet {
    inner: Mutex<ListenerSetInner>,
}

struct ListenerSetInner {
    next_id: u64,
    listeners: BTreeMap<u64, SnapshotListener>,
}

impl ListenerSet {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(ListenerSetInner {
                next_id: 0,
                listeners: BTreeMap::new(),
            }),
        }
    }

    pub(crate) fn add(&self, listener: SnapshotListener) -> u64 {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.insert(id, listener);
        id
    }

    pub(crate) fn remove(&self, id: u64) {
        self.inner.lock().listeners.remove(&id);
    }

    /// Delivers `event` to every registered listener.
    ///
    /// Listeners are cloned out of the lock first so a listener that
    /// subscribes or unsubscribes from inside its callback cannot deadlock.
    pub(crate) fn emit(&self, event: &SnapshotEvent) {
        let listeners: Vec<SnapshotListener> =
            self.inner.lock().listeners.values().cloned().collect();
        for listener in listeners {
            listener(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_emit_reaches_all_listeners() {
        let set = Arc::new(ListenerSet::new());
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let count = count.clone();
            set.add(Arc::new(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            }));
        }

        set.emit(&SnapshotEvent::Deleted {
            fingerprint: "0xfp".to_string(),
        });
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let set = Arc::new(ListenerSet::new());
        let count = Arc::new(AtomicUsize::new(0));

        let id = {
            let count = count.clone();
            set.add(Arc::new(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            }))
        };

        let result = SnapshotResult::new(id, set.clone());
        result.unsubscribe();

        set.emit(&SnapshotEvent::Deleted {
            fingerprint: "0xfp".to_string(),
        });
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
