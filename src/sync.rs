//! Reconciliation and batch sync engine.
//!
//! One sync run reconciles the file system against the ledger and the
//! vector index:
//!
//! 1. enumerate candidate files and fingerprint their bytes;
//! 2. classify each path as New, Changed, or Unchanged against the
//!    ledger, and compute Deleted (in ledger, gone from disk);
//! 3. process New ∪ Changed concurrently under a bounded semaphore:
//!    load → chunk → embed → upsert (replacing records by id) → delete
//!    surplus old chunk ids → stage the new ledger entry;
//! 4. purge Deleted paths from the index and drop their ledger entries;
//! 5. persist the ledger once, atomically, after all work settles.
//!
//! Unchanged documents cost nothing: no loader, embedder, or index I/O.
//! Hashing before embedding is the whole point — embedding calls dominate
//! cost, and a fingerprint comparison avoids them for stable content.
//!
//! Failure semantics: a per-document failure (unreadable file, provider
//! error after retries) is reported and skipped; its ledger entry stays
//! untouched so the document is retried next run. An unreachable vector
//! index or a dimension mismatch is fatal and aborts the run before the
//! ledger is saved, leaving the previous ledger authoritative. Ledger
//! entries are staged only after the index upsert for that document
//! succeeded, so the ledger always lags the index.
//!
//! The same batch entry point serves manual runs, timers, and the file
//! watcher; there is no separate incremental code path.

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::embedding::{self, Embedder};
use crate::hash;
use crate::index::{IndexError, SqliteIndex, VectorIndex, VectorRecord};
use crate::ledger::{DocumentRecord, Ledger};
use crate::loader;
use crate::scan::{self, Candidate};

/// A candidate file with its current content fingerprint.
#[derive(Debug, Clone)]
pub struct HashedCandidate {
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub content_hash: String,
}

/// Classification of the current file-system state against the ledger.
#[derive(Debug, Default)]
pub struct SyncPlan {
    pub new: Vec<HashedCandidate>,
    pub changed: Vec<HashedCandidate>,
    pub unchanged: Vec<String>,
    pub deleted: Vec<String>,
    /// Present on disk but unreadable this run. Counted as failed, never
    /// as deleted: their ledger entries and index records stay put.
    pub unreadable: Vec<String>,
}

/// Counters reported at the end of a run.
#[derive(Debug, Default, Clone)]
pub struct SyncSummary {
    pub new: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub failed: usize,
    pub chunks_written: usize,
}

/// Tuning knobs for [`execute_plan`].
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub max_tokens: usize,
    pub concurrency: usize,
}

/// Fingerprint every candidate. A file that vanished between enumeration
/// and hashing is treated as if it were never enumerated — if the ledger
/// knows it, the plan will classify it Deleted. Any other read error
/// lands the path in the unreadable list: still present, just failed.
pub fn hash_candidates(candidates: Vec<Candidate>) -> (Vec<HashedCandidate>, Vec<String>) {
    let mut hashed = Vec::with_capacity(candidates.len());
    let mut unreadable = Vec::new();

    for candidate in candidates {
        match hash::fingerprint_file(&candidate.abs_path) {
            Ok(content_hash) => hashed.push(HashedCandidate {
                rel_path: candidate.rel_path,
                abs_path: candidate.abs_path,
                content_hash,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Vanished mid-run: equivalent to Deleted
            }
            Err(e) => {
                eprintln!("warning: cannot hash {}: {}", candidate.rel_path, e);
                unreadable.push(candidate.rel_path);
            }
        }
    }

    (hashed, unreadable)
}

/// Pure classification of hashed candidates against the ledger.
///
/// With `full`, every candidate is forced into New or Changed regardless
/// of its fingerprint. `unreadable` paths exist on disk but could not be
/// hashed; they count as present, so a ledgered path is classified
/// Deleted only when it is truly gone, not when a read failed.
pub fn plan(
    candidates: Vec<HashedCandidate>,
    unreadable: &[String],
    ledger: &Ledger,
    full: bool,
) -> SyncPlan {
    let mut plan = SyncPlan::default();
    let mut seen: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();

    for candidate in candidates {
        seen.insert(candidate.rel_path.clone());
        match ledger.get(&candidate.rel_path) {
            None => plan.new.push(candidate),
            Some(record) if full || record.content_hash != candidate.content_hash => {
                plan.changed.push(candidate);
            }
            Some(_) => plan.unchanged.push(candidate.rel_path),
        }
    }

    for path in unreadable {
        seen.insert(path.clone());
        plan.unreadable.push(path.clone());
    }

    for path in ledger.paths() {
        if !seen.contains(path) {
            plan.deleted.push(path.clone());
        }
    }

    plan
}

enum DocError {
    /// Per-document: skip, leave ledger entry untouched, retry next run.
    Skip(String),
    /// Run-level: abort before the ledger is saved.
    Fatal(IndexError),
}

/// Process one New or Changed document end to end.
///
/// Chunk ids are deterministic per (path, index), so the upsert replaces
/// the prior version's records in place. Surplus old ids (a document
/// that shrank) are deleted only after the upsert succeeds; if embedding
/// or the upsert fails, the index keeps serving the prior version and
/// the ledger entry still matches what is committed.
async fn process_document(
    doc: HashedCandidate,
    old_chunk_ids: Vec<String>,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    max_tokens: usize,
) -> Result<(String, DocumentRecord, usize), (String, DocError)> {
    let path = doc.rel_path.clone();

    let text = loader::load_text(&doc.abs_path)
        .map_err(|e| (path.clone(), DocError::Skip(e.to_string())))?;

    let chunks = chunk_text(&doc.rel_path, &text, max_tokens);

    // A document with no extractable text is valid: it simply owns no
    // vector records. Any prior records are purged first.
    if chunks.is_empty() {
        if !old_chunk_ids.is_empty() {
            index
                .delete_ids(&old_chunk_ids)
                .await
                .map_err(|e| (path.clone(), index_doc_error(e)))?;
        }
        let record = DocumentRecord {
            content_hash: doc.content_hash,
            chunk_ids: Vec::new(),
        };
        return Ok((path, record, 0));
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder
        .embed(&texts)
        .await
        .map_err(|e| (path.clone(), DocError::Skip(e.to_string())))?;

    if vectors.len() != chunks.len() {
        return Err((
            path,
            DocError::Skip(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )),
        ));
    }

    let now = chrono::Utc::now().timestamp();
    let records: Vec<VectorRecord> = chunks
        .iter()
        .zip(vectors)
        .map(|(chunk, vector)| VectorRecord {
            id: chunk.id.clone(),
            path: chunk.path.clone(),
            chunk_index: chunk.chunk_index,
            text: chunk.text.clone(),
            vector,
            indexed_at: now,
        })
        .collect();

    index
        .upsert(&records)
        .await
        .map_err(|e| (path.clone(), index_doc_error(e)))?;

    let new_ids: std::collections::BTreeSet<&str> =
        records.iter().map(|r| r.id.as_str()).collect();
    let stale: Vec<String> = old_chunk_ids
        .into_iter()
        .filter(|id| !new_ids.contains(id.as_str()))
        .collect();
    if !stale.is_empty() {
        // Upsert is already committed; a failed prune here leaves extra
        // records that the retry prunes again next run.
        index
            .delete_ids(&stale)
            .await
            .map_err(|e| (path.clone(), index_doc_error(e)))?;
    }

    let chunk_ids = records.iter().map(|r| r.id.clone()).collect();
    let record = DocumentRecord {
        content_hash: doc.content_hash,
        chunk_ids,
    };
    let written = records.len();

    Ok((path, record, written))
}

fn index_doc_error(e: IndexError) -> DocError {
    match e {
        // Connectivity loss and a wrong-dimension index poison every
        // remaining document; stop instead of failing them one by one.
        IndexError::Connection(_) | IndexError::DimensionMismatch { .. } => DocError::Fatal(e),
        IndexError::Storage(_) => DocError::Skip(e.to_string()),
    }
}

/// Execute a classified plan against the index and embedder.
///
/// Returns the updated ledger and the run counters. The ledger value is
/// mutated only from this single collector task, entry by entry as each
/// document's index mutation succeeds; the caller persists it afterwards.
pub async fn execute_plan(
    plan: SyncPlan,
    mut ledger: Ledger,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    options: &SyncOptions,
) -> Result<(Ledger, SyncSummary)> {
    index
        .ping()
        .await
        .map_err(|e| anyhow::anyhow!("{} — aborting run before any ledger change", e))?;

    let mut summary = SyncSummary {
        unchanged: plan.unchanged.len(),
        failed: plan.unreadable.len(),
        ..Default::default()
    };

    let new_paths: std::collections::BTreeSet<String> =
        plan.new.iter().map(|d| d.rel_path.clone()).collect();

    let semaphore = Arc::new(Semaphore::new(options.concurrency));
    let mut tasks = JoinSet::new();

    for doc in plan.new.into_iter().chain(plan.changed) {
        let old_chunk_ids = ledger
            .get(&doc.rel_path)
            .map(|r| r.chunk_ids.clone())
            .unwrap_or_default();
        let index = Arc::clone(&index);
        let embedder = Arc::clone(&embedder);
        let semaphore = Arc::clone(&semaphore);
        let max_tokens = options.max_tokens;

        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            process_document(doc, old_chunk_ids, index, embedder, max_tokens).await
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let outcome = joined.map_err(|e| anyhow::anyhow!("sync task panicked: {}", e))?;
        match outcome {
            Ok((path, record, written)) => {
                if new_paths.contains(&path) {
                    summary.new += 1;
                } else {
                    summary.changed += 1;
                }
                summary.chunks_written += written;
                ledger.insert(path, record);
            }
            Err((path, DocError::Skip(reason))) => {
                eprintln!("warning: skipped {}: {}", path, reason);
                summary.failed += 1;
            }
            Err((_, DocError::Fatal(e))) => {
                // In-flight tasks are aborted when the set drops; their
                // ledger entries were never staged, so retry is safe.
                bail!("{} — aborting run, previous ledger remains authoritative", e);
            }
        }
    }

    for path in plan.deleted {
        let chunk_ids = ledger
            .get(&path)
            .map(|r| r.chunk_ids.clone())
            .unwrap_or_default();
        match index.delete_ids(&chunk_ids).await {
            Ok(()) => {
                ledger.remove(&path);
                summary.deleted += 1;
            }
            Err(e) => match index_doc_error(e) {
                DocError::Skip(reason) => {
                    eprintln!("warning: could not purge {}: {}", path, reason);
                    summary.failed += 1;
                }
                DocError::Fatal(e) => {
                    bail!("{} — aborting run, previous ledger remains authoritative", e)
                }
            },
        }
    }

    // Unchanged entries are already in the ledger and were never touched;
    // unreadable paths kept their entries and were counted failed above.

    Ok((ledger, summary))
}

/// Full CLI sync run: scan, classify, execute, persist, report.
pub async fn run_sync(config: &Config, full: bool, dry_run: bool) -> Result<()> {
    let ledger = Ledger::load(&config.ledger.path);

    let candidates = scan::scan_documents(&config.documents)?;
    let candidate_count = candidates.len();
    let (hashed, unreadable) = hash_candidates(candidates);
    let plan = plan(hashed, &unreadable, &ledger, full);

    println!("sync {}", config.documents.root.display());
    println!("  candidates: {}", candidate_count);
    println!(
        "  new: {}  changed: {}  unchanged: {}  deleted: {}",
        plan.new.len(),
        plan.changed.len(),
        plan.unchanged.len(),
        plan.deleted.len()
    );

    if dry_run {
        println!("  (dry-run: no embedding or index changes)");
        println!("ok");
        return Ok(());
    }

    let index = SqliteIndex::connect(
        &config.index.path,
        config.embedding.dims.unwrap_or_default(),
    )
    .await?;
    index.init_schema().await?;
    let index: Arc<dyn VectorIndex> = Arc::new(index);

    let embedder: Arc<dyn Embedder> = Arc::from(embedding::create_embedder(&config.embedding)?);

    let options = SyncOptions {
        max_tokens: config.chunking.max_tokens,
        concurrency: config.sync.concurrency,
    };

    let (ledger, summary) = execute_plan(plan, ledger, index, embedder, &options).await?;

    ledger.save(&config.ledger.path)?;

    println!("  chunks written: {}", summary.chunks_written);
    if summary.failed > 0 {
        println!("  failed (will retry next run): {}", summary.failed);
    }
    println!("ok");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hashed(path: &str, hash: &str) -> HashedCandidate {
        HashedCandidate {
            rel_path: path.to_string(),
            abs_path: PathBuf::from(path),
            content_hash: hash.to_string(),
        }
    }

    fn ledger_with(entries: &[(&str, &str, &[&str])]) -> Ledger {
        let mut ledger = Ledger::new();
        for (path, hash, ids) in entries {
            ledger.insert(
                path.to_string(),
                DocumentRecord {
                    content_hash: hash.to_string(),
                    chunk_ids: ids.iter().map(|s| s.to_string()).collect(),
                },
            );
        }
        ledger
    }

    #[test]
    fn test_plan_new_and_unchanged() {
        // ledger = {a.txt: h1}, fs has a.txt@h1 and new b.txt@h2
        let ledger = ledger_with(&[("a.txt", "h1", &["a#0000"])]);
        let plan = plan(
            vec![hashed("a.txt", "h1"), hashed("b.txt", "h2")],
            &[],
            &ledger,
            false,
        );

        assert!(plan.new.iter().any(|d| d.rel_path == "b.txt"));
        assert_eq!(plan.unchanged, vec!["a.txt".to_string()]);
        assert!(plan.changed.is_empty());
        assert!(plan.deleted.is_empty());
    }

    #[test]
    fn test_plan_deleted() {
        // ledger = {a.txt: h1, c.txt: h3}, fs has only a.txt@h1
        let ledger = ledger_with(&[("a.txt", "h1", &[]), ("c.txt", "h3", &["c#0000"])]);
        let plan = plan(vec![hashed("a.txt", "h1")], &[], &ledger, false);

        assert_eq!(plan.deleted, vec!["c.txt".to_string()]);
        assert_eq!(plan.unchanged, vec!["a.txt".to_string()]);
    }

    #[test]
    fn test_plan_changed_on_hash_difference() {
        let ledger = ledger_with(&[("a.txt", "h1", &["a#0000"])]);
        let plan = plan(vec![hashed("a.txt", "h2")], &[], &ledger, false);

        assert_eq!(plan.changed.len(), 1);
        assert_eq!(plan.changed[0].rel_path, "a.txt");
        assert!(plan.unchanged.is_empty());
    }

    #[test]
    fn test_plan_full_forces_reingest() {
        let ledger = ledger_with(&[("a.txt", "h1", &["a#0000"])]);
        let plan = plan(
            vec![hashed("a.txt", "h1"), hashed("b.txt", "h2")],
            &[],
            &ledger,
            true,
        );

        assert_eq!(plan.changed.len(), 1);
        assert_eq!(plan.new.len(), 1);
        assert!(plan.unchanged.is_empty());
    }

    #[test]
    fn test_plan_empty_ledger_all_new() {
        let plan = plan(
            vec![hashed("a.txt", "h1"), hashed("b.txt", "h2")],
            &[],
            &Ledger::new(),
            false,
        );
        assert_eq!(plan.new.len(), 2);
        assert!(plan.changed.is_empty() && plan.deleted.is_empty());
    }

    #[test]
    fn test_plan_unreadable_path_is_not_deleted() {
        // A read failure on a present file must not purge it
        let ledger = ledger_with(&[("a.txt", "h1", &["a#0000"]), ("b.txt", "h2", &[])]);
        let plan = plan(
            vec![hashed("b.txt", "h2")],
            &["a.txt".to_string()],
            &ledger,
            false,
        );

        assert!(plan.deleted.is_empty());
        assert_eq!(plan.unreadable, vec!["a.txt".to_string()]);
        assert_eq!(plan.unchanged, vec!["b.txt".to_string()]);
    }

    #[test]
    fn test_hash_candidates_unreadable_is_not_vanished() {
        // A directory with a document name reads as an error, not NotFound
        let tmp = tempfile::TempDir::new().unwrap();
        let dir_path = tmp.path().join("a.txt");
        std::fs::create_dir(&dir_path).unwrap();

        let candidates = vec![Candidate {
            rel_path: "a.txt".to_string(),
            abs_path: dir_path,
        }];

        let (hashed, unreadable) = hash_candidates(candidates);
        assert!(hashed.is_empty());
        assert_eq!(unreadable, vec!["a.txt".to_string()]);
    }

    #[test]
    fn test_hash_candidates_skips_vanished_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        let present = tmp.path().join("here.txt");
        std::fs::write(&present, "content").unwrap();

        let candidates = vec![
            Candidate {
                rel_path: "here.txt".to_string(),
                abs_path: present,
            },
            Candidate {
                rel_path: "gone.txt".to_string(),
                abs_path: tmp.path().join("gone.txt"),
            },
        ];

        let (hashed, unreadable) = hash_candidates(candidates);
        assert_eq!(hashed.len(), 1);
        assert_eq!(hashed[0].rel_path, "here.txt");
        assert!(unreadable.is_empty());
    }
}
