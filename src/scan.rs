use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::PathBuf;
use walkdir::WalkDir;

use crate::config::DocumentsConfig;

/// A file found under the documents root that passes the extension
/// allow-list. `rel_path` is the logical document identity used in the
/// ledger and the index; `abs_path` is where to read the bytes.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub rel_path: String,
    pub abs_path: PathBuf,
}

/// Enumerate candidate documents under the configured root.
///
/// Traverses recursively, keeps files whose lowercase extension is in the
/// allow-list, and drops anything matching an exclude glob. Results are
/// sorted by relative path for deterministic ordering.
pub fn scan_documents(config: &DocumentsConfig) -> Result<Vec<Candidate>> {
    let root = &config.root;
    if !root.exists() {
        bail!("Documents root does not exist: {}", root.display());
    }

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut candidates = Vec::new();

    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) {
            continue;
        }

        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !config.extensions.iter().any(|allowed| allowed == &ext) {
            continue;
        }

        candidates.push(Candidate {
            rel_path: rel_str,
            abs_path: path.to_path_buf(),
        });
    }

    candidates.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));

    Ok(candidates)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
