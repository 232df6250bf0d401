//! File-watch trigger for the sync engine.
//!
//! Watches the documents root and re-runs the identical batch sync after
//! a debounced quiet period. The watcher is only a trigger: it never
//! classifies or processes files itself, so watch mode, timers, and
//! manual `sync` share one code path and one set of guarantees.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::time::Duration;

use crate::config::Config;
use crate::sync;

/// Watch the documents root and re-sync on changes. Runs until killed.
pub async fn run_watch(config: &Config) -> Result<()> {
    // Catch up with anything that changed while not watching.
    sync::run_sync(config, false, false).await?;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        },
        notify::Config::default(),
    )
    .context("Failed to create file watcher")?;

    watcher
        .watch(&config.documents.root, RecursiveMode::Recursive)
        .with_context(|| {
            format!(
                "Failed to watch documents root: {}",
                config.documents.root.display()
            )
        })?;

    println!("watching {}", config.documents.root.display());

    let debounce = Duration::from_millis(config.sync.debounce_ms);

    while let Some(res) = rx.recv().await {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                eprintln!("warning: watch error: {}", e);
                continue;
            }
        };

        if !is_relevant(&event, config) {
            continue;
        }

        // Editors fire bursts of events per save; wait for a quiet
        // period so one burst becomes one sync run.
        loop {
            match tokio::time::timeout(debounce, rx.recv()).await {
                Ok(Some(_)) => continue,
                _ => break,
            }
        }

        println!("change detected");
        if let Err(e) = sync::run_sync(config, false, false).await {
            eprintln!("warning: sync run failed: {}", e);
        }
    }

    Ok(())
}

/// Only create/modify/remove events on allow-listed extensions trigger a
/// sync; everything else (metadata churn, unrelated files) is ignored.
fn is_relevant(event: &Event, config: &Config) -> bool {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {}
        _ => return false,
    }

    event.paths.iter().any(|p| {
        let ext = p
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        config.documents.extensions.iter().any(|a| a == &ext)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        ChunkingConfig, DocumentsConfig, IndexConfig, LedgerConfig, SyncConfig,
    };
    use notify::event::{CreateKind, MetadataKind, ModifyKind};
    use std::path::PathBuf;

    fn test_config() -> Config {
        Config {
            documents: DocumentsConfig {
                root: PathBuf::from("docs"),
                extensions: vec!["md".to_string()],
                exclude_globs: vec![],
                follow_symlinks: false,
            },
            ledger: LedgerConfig {
                path: PathBuf::from("ledger.json"),
            },
            index: IndexConfig {
                path: PathBuf::from("index.sqlite"),
            },
            embedding: Default::default(),
            sync: SyncConfig::default(),
            chunking: ChunkingConfig::default(),
        }
    }

    #[test]
    fn test_relevant_create_on_allowed_extension() {
        let config = test_config();
        let mut event = Event::new(EventKind::Create(CreateKind::File));
        event.paths.push(PathBuf::from("docs/note.md"));
        assert!(is_relevant(&event, &config));
    }

    #[test]
    fn test_irrelevant_extension_ignored() {
        let config = test_config();
        let mut event = Event::new(EventKind::Create(CreateKind::File));
        event.paths.push(PathBuf::from("docs/index.sqlite"));
        assert!(!is_relevant(&event, &config));
    }

    #[test]
    fn test_access_events_ignored() {
        let config = test_config();
        let mut event = Event::new(EventKind::Modify(ModifyKind::Metadata(
            MetadataKind::AccessTime,
        )));
        event.paths.push(PathBuf::from("docs/note.md"));
        // Metadata modify still counts as Modify; only kind gating here
        assert!(is_relevant(&event, &config));

        let mut access = Event::new(EventKind::Access(notify::event::AccessKind::Read));
        access.paths.push(PathBuf::from("docs/note.md"));
        assert!(!is_relevant(&access, &config));
    }
}
