//! Scholar Ingest Library
//!
//! Resumable bulk loader for a dated, gzip-compressed JSON-lines snapshot of
//! scholarly entities (works, authors, institutions, ...) into a searchable
//! document store.
//!
//! # Pipeline
//!
//! - [`orchestrator`]: walks `<root>/<entity>/<date>/<chunk>.gz`, oldest date
//!   first, with bounded parallelism inside a date and a barrier between dates
//! - [`worker`]: decodes one file, filters, enriches and bulk-writes it
//! - [`batcher`]: windowed embedding of work abstracts
//! - [`ledger`]: one provenance record per finished file; the resume point
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use scholar_ingest::config::IngestConfig;
//! use scholar_ingest::embedding::HttpEmbeddingClient;
//! use scholar_ingest::filter::DefaultEntityFilter;
//! use scholar_ingest::orchestrator::IngestOrchestrator;
//! use scholar_ingest::store::ElasticsearchStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::from_env()?;
//!     let store = Arc::new(ElasticsearchStore::new(&config.store)?);
//!     let embedder = Arc::new(HttpEmbeddingClient::new(config.embedding_url.clone())?);
//!
//!     let orchestrator =
//!         IngestOrchestrator::new(config, store, embedder, Arc::new(DefaultEntityFilter))?;
//!     let summary = orchestrator.run().await?;
//!     println!("{} files ingested", summary.files_ingested);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod batcher;
pub mod budget;
pub mod config;
pub mod embedding;
pub mod entity;
pub mod filter;
pub mod ledger;
pub mod orchestrator;
pub mod schema;
pub mod store;
pub mod worker;

pub use config::IngestConfig;
pub use entity::{EntityRecord, EntityType};
pub use orchestrator::{IngestOrchestrator, RunSummary};
