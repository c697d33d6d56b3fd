//! Content-derived document fingerprints.
//!
//! A fingerprint is the stable primary key for a document: the SHA-256 of
//! the document bytes rendered as lowercase hex. It is assigned once, when
//! the document enters the repository, and never changes across writes.

use sha2::{Digest, Sha256};

/// Computes the fingerprint for a document's raw content.
pub fn from_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Returns true if `fingerprint` is usable as a storage key.
///
/// Datastores refuse keys that could escape their storage layout. External
/// sources may hand us fingerprints that are not plain hex, so anything
/// alphanumeric (plus `-` and `:`) is accepted.
pub fn is_well_formed(fingerprint: &str) -> bool {
    !fingerprint.is_empty()
        && fingerprint
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == ':')
}
