use anyhow::Result;

use crate::config::Config;
use crate::embedding;
use crate::index::{SqliteIndex, VectorIndex};

/// Semantic search: embed the query, rank index records by cosine
/// similarity, print the top hits.
pub async fn run_search(
    config: &Config,
    query: &str,
    limit: usize,
    path_filter: Option<&str>,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let embedder = embedding::create_embedder(&config.embedding)?;

    let query_vec = embedder
        .embed(&[query.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))?;

    let index = SqliteIndex::connect(
        &config.index.path,
        config.embedding.dims.unwrap_or_default(),
    )
    .await?;
    index.init_schema().await?;

    let hits = index.search(&query_vec, limit, path_filter).await?;

    if hits.is_empty() {
        println!("No results.");
        index.close().await;
        return Ok(());
    }

    for (rank, hit) in hits.iter().enumerate() {
        let snippet: String = hit.text.chars().take(240).collect();
        println!(
            "{}. {} [chunk {}] (score {:.3})",
            rank + 1,
            hit.path,
            hit.chunk_index,
            hit.score
        );
        println!("   {}", snippet.replace('\n', " "));
    }

    index.close().await;
    Ok(())
}
