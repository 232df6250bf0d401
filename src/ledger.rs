//! Persisted path → fingerprint ledger.
//!
//! The ledger records, for every document already committed to the vector
//! index, the fingerprint of the bytes that were indexed and the ids of
//! the chunks written for it. It is the sync engine's memory between runs:
//! a path whose current fingerprint matches its ledger entry is skipped
//! entirely.
//!
//! Two rules keep it trustworthy:
//! - an entry is mutated only after the corresponding index mutation has
//!   succeeded, so the ledger lags the index and never leads it;
//! - [`Ledger::save`] writes to a temp file in the same directory and
//!   renames it over the target, so a concurrent load never observes a
//!   half-written file.
//!
//! A missing or corrupt ledger file degrades to an empty ledger with a
//! warning: everything gets re-embedded, which is wasteful but correct.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Ledger entry for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Fingerprint of the bytes that were last committed to the index.
    pub content_hash: String,
    /// Ids of every vector record written for this document, in chunk
    /// order. Deleting these ids removes the document from the index.
    pub chunk_ids: Vec<String>,
}

/// In-memory ledger state, keyed by logical document path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    entries: BTreeMap<String, DocumentRecord>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the ledger from disk.
    ///
    /// A missing file is a normal first run and yields an empty ledger.
    /// An unreadable or unparsable file also yields an empty ledger, with
    /// a warning on stderr — ingestion must proceed regardless.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::new(),
            Err(e) => {
                eprintln!(
                    "warning: ledger {} unreadable ({}), starting from empty ledger",
                    path.display(),
                    e
                );
                return Self::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(ledger) => ledger,
            Err(e) => {
                eprintln!(
                    "warning: ledger {} corrupt ({}), starting from empty ledger",
                    path.display(),
                    e
                );
                Self::new()
            }
        }
    }

    /// Atomically replace the persisted ledger.
    ///
    /// Writes to `<path>.tmp` in the same directory, then renames over the
    /// target so a partially written file is never visible under `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&DocumentRecord> {
        self.entries.get(path)
    }

    pub fn insert(&mut self, path: String, record: DocumentRecord) {
        self.entries.insert(path, record);
    }

    pub fn remove(&mut self, path: &str) -> Option<DocumentRecord> {
        self.entries.remove(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(hash: &str, ids: &[&str]) -> DocumentRecord {
        DocumentRecord {
            content_hash: hash.to_string(),
            chunk_ids: ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_missing_file_is_empty_ledger() {
        let tmp = tempfile::TempDir::new().unwrap();
        let ledger = Ledger::load(&tmp.path().join("nope.json"));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("ledger.json");

        let mut ledger = Ledger::new();
        ledger.insert("docs/a.md".to_string(), record("h1", &["a#0000", "a#0001"]));
        ledger.insert("docs/b.txt".to_string(), record("h2", &["b#0000"]));
        ledger.save(&path).unwrap();

        let loaded = Ledger::load(&path);
        assert_eq!(loaded, ledger);
        assert_eq!(loaded.get("docs/a.md").unwrap().chunk_ids.len(), 2);
    }

    #[test]
    fn test_corrupt_file_degrades_to_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("ledger.json");
        std::fs::write(&path, "{not json").unwrap();

        let ledger = Ledger::load(&path);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested/dir/ledger.json");
        Ledger::new().save(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("ledger.json");
        let mut ledger = Ledger::new();
        ledger.insert("a".to_string(), record("h", &[]));
        ledger.save(&path).unwrap();
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_save_replaces_previous_content() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("ledger.json");

        let mut first = Ledger::new();
        first.insert("a".to_string(), record("h1", &["a#0000"]));
        first.save(&path).unwrap();

        let mut second = Ledger::new();
        second.insert("b".to_string(), record("h2", &["b#0000"]));
        second.save(&path).unwrap();

        let loaded = Ledger::load(&path);
        assert!(!loaded.contains("a"));
        assert!(loaded.contains("b"));
    }
}
