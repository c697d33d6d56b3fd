//! Datastore error type shared by all backends.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatastoreError {
    /// I/O error reading or writing a path.
    #[error("I/O error for {0}: {1}")]
    Io(PathBuf, #[source] io::Error),

    /// A stored record that no longer parses.
    #[error("corrupt stored record at {0}: {1}")]
    Corrupt(PathBuf, String),

    /// A fingerprint that is empty or could escape the storage layout.
    #[error("invalid fingerprint: {0:?}")]
    InvalidFingerprint(String),

    /// A file reference whose name could escape the storage layout.
    #[error("invalid file name: {0:?}")]
    InvalidFileName(String),

    /// Attachment lookup for a file that is not stored.
    #[error("no such file in backend {backend}: {name}")]
    FileNotFound { backend: String, name: String },

    /// Preference store failure.
    #[error("preference store error: {0}")]
    Prefs(String),
}
