//! Ingestion orchestrator
//!
//! Drives the load across entity types and update dates:
//!
//! ```text
//! for entity in config.entities:
//!     ensure entity index
//!     for date in sorted(<root>/<entity>/*):      // oldest first
//!         for file in date:                       // bounded parallel
//!             skip if in ledger, else admit a FileWorker
//!         wait for every worker of this date      // barrier
//! ```
//!
//! Dates must be processed in ascending order: documents are upserted by key,
//! so a later date's corrected version only wins if it is written last.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::budget::ConcurrencyBudget;
use crate::config::IngestConfig;
use crate::embedding::EmbeddingService;
use crate::entity::EntityType;
use crate::filter::EntityFilter;
use crate::ledger::{relative_file_path, ProvenanceLedger};
use crate::schema::IndexSchema;
use crate::store::{self, DocumentStore};
use crate::worker::{FileOutcome, FileWorker, WorkerSettings};

/// Totals for one run (or one entity type)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Files streamed to the end and recorded in the ledger
    pub files_ingested: u64,
    /// Files skipped because the ledger already had them
    pub files_skipped: u64,
    /// Files that failed and stay eligible for the next run
    pub files_failed: u64,
    pub documents_written: u64,
    pub documents_failed: u64,
    /// Records dropped by the entity filter
    pub records_filtered: u64,
    /// Lines that could not be decoded
    pub decode_errors: u64,
}

impl RunSummary {
    fn absorb(&mut self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::AlreadyIngested => self.files_skipped += 1,
            FileOutcome::Ingested { stats, .. } => {
                self.files_ingested += 1;
                self.documents_written += stats.successes;
                self.documents_failed += stats.errors;
                self.records_filtered += stats.filtered;
                self.decode_errors += stats.decode_errors;
            },
        }
    }

    fn merge(&mut self, other: &RunSummary) {
        self.files_ingested += other.files_ingested;
        self.files_skipped += other.files_skipped;
        self.files_failed += other.files_failed;
        self.documents_written += other.documents_written;
        self.documents_failed += other.documents_failed;
        self.records_filtered += other.records_filtered;
        self.decode_errors += other.decode_errors;
    }

    /// Whether every attempted file made it into the ledger
    pub fn is_clean(&self) -> bool {
        self.files_failed == 0
    }
}

/// Coordinates file workers across entity types and dates
pub struct IngestOrchestrator {
    config: IngestConfig,
    store: Arc<dyn DocumentStore>,
    ledger: ProvenanceLedger,
    worker: Arc<FileWorker>,
    budget: ConcurrencyBudget,
}

impl IngestOrchestrator {
    pub fn new(
        config: IngestConfig,
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn EmbeddingService>,
        filter: Arc<dyn EntityFilter>,
    ) -> Result<Self> {
        config.validate()?;

        let ledger = ProvenanceLedger::new(Arc::clone(&store), config.ledger_index.clone());
        let worker = Arc::new(FileWorker::new(
            Arc::clone(&store),
            ledger.clone(),
            embedder,
            filter,
            WorkerSettings::from(&config),
        ));
        let budget = ConcurrencyBudget::new(config.max_concurrent_files);

        Ok(Self {
            config,
            store,
            ledger,
            worker,
            budget,
        })
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn budget(&self) -> &ConcurrencyBudget {
        &self.budget
    }

    pub fn ledger(&self) -> &ProvenanceLedger {
        &self.ledger
    }

    /// Delete and recreate the indexes of `entities`, and the ledger if asked
    ///
    /// Destructive: every stored document of those types is lost.
    pub async fn reset_indexes(&self, entities: &[EntityType], reset_ledger: bool) -> Result<()> {
        for &entity in entities {
            warn!(index = entity.as_str(), "Resetting index");
            store::recreate_index(self.store.as_ref(), entity.as_str(), &self.schema_for(entity))
                .await
                .with_context(|| format!("Failed to reset index '{}'", entity))?;
        }

        if reset_ledger {
            warn!(index = %self.ledger.index(), "Resetting provenance ledger");
            self.ledger
                .reset()
                .await
                .context("Failed to reset the provenance ledger")?;
        }

        Ok(())
    }

    /// Run the full load over every configured entity type
    ///
    /// Setup failures (ledger or entity index creation, unreadable dataset
    /// layout) abort the run. Failures of single files are counted in the
    /// summary and never abort it.
    pub async fn run(&self) -> Result<RunSummary> {
        self.ledger
            .ensure_index()
            .await
            .context("Failed to prepare the provenance ledger")?;

        let mut summary = RunSummary::default();
        for &entity in &self.config.entities {
            let entity_summary = self.ingest_entity(entity).await?;
            info!(
                entity = %entity,
                ingested = entity_summary.files_ingested,
                skipped = entity_summary.files_skipped,
                failed = entity_summary.files_failed,
                written = entity_summary.documents_written,
                errors = entity_summary.documents_failed,
                "Finished entity type"
            );
            summary.merge(&entity_summary);
        }

        Ok(summary)
    }

    /// Load every dated batch of one entity type, oldest first
    pub async fn ingest_entity(&self, entity: EntityType) -> Result<RunSummary> {
        store::ensure_index(self.store.as_ref(), entity.as_str(), &self.schema_for(entity))
            .await
            .with_context(|| format!("Failed to prepare index '{}'", entity))?;

        let entity_dir = self.config.entity_dir(entity);
        let dates = list_sorted(&entity_dir, EntryKind::Dir)
            .with_context(|| format!("Failed to list {}", entity_dir.display()))?;

        info!(entity = %entity, dates = dates.len(), "Ingesting entity type");

        let mut summary = RunSummary::default();
        let total = dates.len();
        for (i, date_dir) in dates.iter().enumerate() {
            info!(
                entity = %entity,
                date = %dir_name(date_dir),
                "Directory {} of {} ({:.1}%)",
                i + 1,
                total,
                progress_percent(i + 1, total)
            );
            let date_summary = self.ingest_date(entity, date_dir).await?;
            summary.merge(&date_summary);
        }

        Ok(summary)
    }

    /// Process every file of one dated directory and wait for all of them
    async fn ingest_date(&self, entity: EntityType, date_dir: &Path) -> Result<RunSummary> {
        let files = list_sorted(date_dir, EntryKind::File)
            .with_context(|| format!("Failed to list {}", date_dir.display()))?;

        let mut summary = RunSummary::default();
        let mut workers = JoinSet::new();

        for path in files {
            let relative = relative_file_path(&path);
            match self.ledger.is_ingested(&relative).await {
                Ok(true) => {
                    summary.files_skipped += 1;
                    continue;
                },
                Ok(false) => {},
                Err(e) => {
                    // The worker checks again and fails the file if the store stays down
                    warn!(file = %relative, error = %e, "Ledger lookup failed");
                },
            }

            let slot = self
                .budget
                .admit()
                .await
                .context("Concurrency budget closed")?;
            let worker = Arc::clone(&self.worker);

            workers.spawn(async move {
                let _slot = slot;
                let outcome = worker.process(entity, &path).await;
                (relative, outcome)
            });
        }

        // Barrier: the next date starts only once every file of this one is done
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((_, Ok(outcome))) => summary.absorb(&outcome),
                Ok((file, Err(e))) => {
                    let reason = format!("{:#}", e);
                    error!(file = %file, error = %reason, "File failed, left for the next run");
                    summary.files_failed += 1;
                },
                Err(e) => {
                    error!(error = %e, "File worker panicked");
                    summary.files_failed += 1;
                },
            }
        }

        Ok(summary)
    }

    fn schema_for(&self, entity: EntityType) -> IndexSchema {
        IndexSchema::for_entity(entity, self.config.embedding_dims)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Dir,
    File,
}

/// Entries of `dir` of one kind, sorted by name; hidden entries are ignored
fn list_sorted(dir: &Path, kind: EntryKind) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let file_type = entry.file_type()?;
        let wanted = match kind {
            EntryKind::Dir => file_type.is_dir(),
            EntryKind::File => file_type.is_file(),
        };
        if wanted {
            entries.push(entry.path());
        }
    }
    entries.sort();
    Ok(entries)
}

/// Share of `total` directories done once `done` of them are finished
fn progress_percent(done: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    done as f64 * 100.0 / total as f64
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
