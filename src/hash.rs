//! Content fingerprinting.
//!
//! A fingerprint is the lowercase hex SHA-256 digest of a document's raw
//! bytes. Two documents are treated as identical exactly when their
//! fingerprints match; the sync engine compares fingerprints before doing
//! any loader, embedding, or index work.

use sha2::{Digest, Sha256};
use std::path::Path;

/// Fingerprint a byte slice. Deterministic, total (empty input is fine).
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Fingerprint a file's current content.
pub fn fingerprint_file(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(fingerprint(&bytes))
}
