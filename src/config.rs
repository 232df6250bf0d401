use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub documents: DocumentsConfig,
    pub ledger: LedgerConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    /// Root directory scanned recursively for candidate documents.
    pub root: PathBuf,
    /// Lowercase extensions accepted for ingestion.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_extensions() -> Vec<String> {
    ["md", "txt", "pdf", "docx", "html"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    /// Path of the persisted path → fingerprint ledger (JSON).
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Path of the SQLite vector index database.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Maximum number of documents embedded/upserted in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Quiet period after a file-system event before a watch-triggered sync.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}
fn default_debounce_ms() -> u64 {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_max_tokens() -> usize {
    500
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.documents.extensions.is_empty() {
        anyhow::bail!("documents.extensions must not be empty");
    }

    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }

    if config.sync.concurrency == 0 {
        anyhow::bail!("sync.concurrency must be > 0");
    }

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("docsync.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_minimal_config_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[documents]
root = "./docs"

[ledger]
path = "./data/ledger.json"

[index]
path = "./data/index.sqlite"
"#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.embedding.provider, "disabled");
        assert_eq!(cfg.sync.concurrency, 4);
        assert_eq!(cfg.chunking.max_tokens, 500);
        assert!(cfg.documents.extensions.contains(&"md".to_string()));
    }

    #[test]
    fn test_enabled_provider_requires_model_and_dims() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[documents]
root = "./docs"

[ledger]
path = "./data/ledger.json"

[index]
path = "./data/index.sqlite"

[embedding]
provider = "ollama"
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[documents]
root = "./docs"

[ledger]
path = "./data/ledger.json"

[index]
path = "./data/index.sqlite"

[embedding]
batch_size = 0
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[documents]
root = "./docs"

[ledger]
path = "./data/ledger.json"

[index]
path = "./data/index.sqlite"

[embedding]
provider = "milvus"
model = "m"
dims = 8
"#,
        );
        assert!(load_config(&path).is_err());
    }
}
