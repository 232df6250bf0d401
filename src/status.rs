use anyhow::Result;

use crate::config::Config;
use crate::index::{SqliteIndex, VectorIndex};
use crate::ledger::Ledger;

/// Print ledger and index counts so drift between them is visible.
///
/// The ledger lagging the index (more index records than ledger chunk
/// ids) is normal after an interrupted run and heals on the next sync.
pub async fn run_status(config: &Config) -> Result<()> {
    let ledger = Ledger::load(&config.ledger.path);
    let tracked_chunks: usize = ledger
        .paths()
        .filter_map(|p| ledger.get(p))
        .map(|r| r.chunk_ids.len())
        .sum();

    println!("ledger {}", config.ledger.path.display());
    println!("  documents tracked: {}", ledger.len());
    println!("  chunks tracked: {}", tracked_chunks);

    let index = SqliteIndex::connect(
        &config.index.path,
        config.embedding.dims.unwrap_or_default(),
    )
    .await?;
    index.init_schema().await?;

    println!("index {}", config.index.path.display());
    println!("  records: {}", index.count().await?);

    index.close().await;
    Ok(())
}
