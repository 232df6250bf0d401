//! # docsync
//!
//! Incremental document ingestion and vector-index synchronization for
//! local knowledge bases.
//!
//! docsync scans a directory of documents (markdown, plain text, PDF,
//! DOCX, HTML), fingerprints their content, and keeps a vector index in
//! step with the file system: only new or changed documents are re-chunked
//! and re-embedded, and documents removed from disk are purged from the
//! index. A persisted hash ledger records what has already been indexed so
//! repeated runs over an unchanged corpus cost nothing.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌───────────┐   ┌──────────────────┐
//! │ File scan │──▶│   Sync    │──▶│ Loader + Chunker │
//! │ (walkdir) │   │  Engine   │   └────────┬─────────┘
//! └───────────┘   │           │            ▼
//!                 │ consults  │   ┌──────────────────┐
//! ┌───────────┐   │  ledger,  │──▶│ Embedder (HTTP)  │
//! │  Ledger   │◀──│ commits   │   └────────┬─────────┘
//! │  (JSON)   │   │  last     │            ▼
//! └───────────┘   └───────────┘   ┌──────────────────┐
//!                                 │   Vector index   │
//!                                 │  (SQLite blobs)  │
//!                                 └──────────────────┘
//! ```
//!
//! The ledger is a lagging reflection of the index: an entry is updated
//! only after the index upsert for that document has succeeded. A crash
//! between upsert and ledger save causes redundant re-embedding on the
//! next run, never a stale search result the ledger claims is current.
//!
//! ## Quick Start
//!
//! ```bash
//! docsync init                  # create the vector index database
//! docsync sync                  # reconcile documents against the index
//! docsync search "tariff impact on equities"
//! docsync watch                 # re-sync on file-system changes
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`hash`] | Content fingerprinting |
//! | [`ledger`] | Persisted path → fingerprint ledger |
//! | [`scan`] | Candidate file enumeration |
//! | [`loader`] | Multi-format text extraction |
//! | [`chunk`] | Paragraph-boundary chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Vector index abstraction + SQLite backend |
//! | [`sync`] | Reconciliation and batch sync engine |
//! | [`search`] | Semantic search over the index |
//! | [`watch`] | File-watch trigger for the sync engine |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod hash;
pub mod index;
pub mod ledger;
pub mod loader;
pub mod scan;
pub mod search;
pub mod status;
pub mod sync;
pub mod watch;
