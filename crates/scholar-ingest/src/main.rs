//! Scholar Ingest - bulk loader for the scholarly dataset snapshot

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use scholar_common::logging::{init_logging, LogConfig, LogLevel};
use scholar_ingest::config::{parse_entities, IngestConfig};
use scholar_ingest::embedding::HttpEmbeddingClient;
use scholar_ingest::filter::DefaultEntityFilter;
use scholar_ingest::store::ElasticsearchStore;
use scholar_ingest::IngestOrchestrator;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "scholar-ingest")]
#[command(author, version, about = "Load the scholarly dataset snapshot into the search store")]
struct Cli {
    /// Delete and recreate the entity indexes (and the ledger) before loading
    #[arg(long)]
    reset_indexes: bool,

    /// With --reset-indexes, keep the provenance ledger
    #[arg(long, requires = "reset_indexes")]
    keep_ledger: bool,

    /// Comma-separated entity types, overriding ENTITIES_TO_INGEST
    #[arg(short, long)]
    entities: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flag
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("scholar-ingest")
        .build()
        .merge_env()?;
    let _guard = init_logging(&log_config)?;

    let mut config = IngestConfig::from_env()?;
    if let Some(entities) = cli.entities.as_deref() {
        config.entities = parse_entities(entities)?;
        config.validate()?;
    }

    info!(
        data_root = %config.data_root().display(),
        entities = ?config.entities,
        max_concurrent_files = config.max_concurrent_files,
        "Starting ingestion"
    );

    let store = Arc::new(
        ElasticsearchStore::new(&config.store).context("Failed to set up the document store")?,
    );
    let embedder = Arc::new(
        HttpEmbeddingClient::new(config.embedding_url.clone())
            .context("Failed to set up the embedding client")?,
    );

    let entities = config.entities.clone();
    let orchestrator =
        IngestOrchestrator::new(config, store, embedder, Arc::new(DefaultEntityFilter))?;

    if cli.reset_indexes {
        orchestrator
            .reset_indexes(&entities, !cli.keep_ledger)
            .await?;
    }

    let summary = orchestrator.run().await?;

    info!(
        ingested = summary.files_ingested,
        skipped = summary.files_skipped,
        failed = summary.files_failed,
        written = summary.documents_written,
        errors = summary.documents_failed,
        filtered = summary.records_filtered,
        "Ingestion complete"
    );
    if !summary.is_clean() {
        warn!(
            failed = summary.files_failed,
            "Some files failed; run again to retry them"
        );
    }

    Ok(())
}
