//! File worker
//!
//! Processes one gzip-compressed JSON-lines chunk end to end:
//! ledger check, decode and filter, windowed enrichment, keyed bulk writes,
//! and finally one provenance record.
//!
//! Decoding runs on a blocking thread and feeds the async side through a
//! bounded channel, so a large file is never held in memory.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use flate2::read::MultiGzDecoder;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::batcher::InferenceBatcher;
use crate::config::IngestConfig;
use crate::embedding::EmbeddingService;
use crate::entity::{EntityRecord, EntityType};
use crate::filter::EntityFilter;
use crate::ledger::{relative_file_path, ProvenanceLedger, ProvenanceRecord};
use crate::store::{BulkDocument, DocumentStore};

/// Records buffered between the decoder thread and the async pipeline
const DECODE_CHANNEL_CAPACITY: usize = 1024;

/// Per-file tuning taken from [`IngestConfig`]
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub inference_chunk_size: usize,
    pub bulk_chunk_size: usize,
    pub bulk_request_timeout: Duration,
    pub id_prefix: String,
}

impl From<&IngestConfig> for WorkerSettings {
    fn from(config: &IngestConfig) -> Self {
        Self {
            inference_chunk_size: config.inference_chunk_size,
            bulk_chunk_size: config.bulk_chunk_size.max(1),
            bulk_request_timeout: config.bulk_request_timeout(),
            id_prefix: config.id_prefix.clone(),
        }
    }
}

/// Counters for one processed file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStats {
    /// Non-empty lines read from the file
    pub lines: u64,
    /// Lines that were not valid JSON objects
    pub decode_errors: u64,
    /// Records the entity filter dropped
    pub filtered: u64,
    /// Documents the store accepted
    pub successes: u64,
    /// Documents the store rejected or that had no usable key
    pub errors: u64,
}

impl FileStats {
    /// Records handed to the bulk protocol
    pub fn submitted(&self) -> u64 {
        self.successes + self.errors
    }
}

/// What happened to one file
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    /// A provenance record already existed; nothing was done
    AlreadyIngested,
    /// The file was streamed to the end and recorded in the ledger
    Ingested {
        record: ProvenanceRecord,
        stats: FileStats,
    },
}

/// Counters filled in by the decoder thread
#[derive(Debug, Default)]
struct DecodeStats {
    lines: u64,
    decode_errors: u64,
    filtered: u64,
}

/// Processes single source files
pub struct FileWorker {
    store: Arc<dyn DocumentStore>,
    ledger: ProvenanceLedger,
    embedder: Arc<dyn EmbeddingService>,
    filter: Arc<dyn EntityFilter>,
    settings: WorkerSettings,
}

impl FileWorker {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        ledger: ProvenanceLedger,
        embedder: Arc<dyn EmbeddingService>,
        filter: Arc<dyn EntityFilter>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            store,
            ledger,
            embedder,
            filter,
            settings,
        }
    }

    /// Ingest one file
    ///
    /// An `Err` means the file was not fully ingested and has no provenance
    /// record, so the next run picks it up again.
    pub async fn process(&self, entity: EntityType, path: &Path) -> Result<FileOutcome> {
        let relative = relative_file_path(path);
        let span = info_span!("ingest_file", file = %relative, entity = %entity);
        self.process_inner(entity, path, &relative)
            .instrument(span)
            .await
    }

    async fn process_inner(
        &self,
        entity: EntityType,
        path: &Path,
        relative: &str,
    ) -> Result<FileOutcome> {
        if self
            .ledger
            .is_ingested(relative)
            .await
            .context("Failed to query the provenance ledger")?
        {
            debug!("Already ingested, skipping");
            return Ok(FileOutcome::AlreadyIngested);
        }

        let started = Utc::now();
        let file = File::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        debug!("Ingesting file");

        let (records, decoder) = spawn_decoder(file, path.to_path_buf(), entity, Arc::clone(&self.filter));

        let batcher = InferenceBatcher::new(
            Arc::clone(&self.embedder),
            entity,
            self.settings.inference_chunk_size,
        );
        let (successes, errors) = self.write_all(entity, batcher.enrich(records)).await?;

        let decoded = decoder
            .await
            .context("Decoder task panicked")?
            .with_context(|| format!("Failed to decode {}", path.display()))?;

        let finished = Utc::now();
        let record = self
            .ledger
            .record(relative, started, finished, successes, errors)
            .await
            .context("Failed to write provenance record")?;

        let stats = FileStats {
            lines: decoded.lines,
            decode_errors: decoded.decode_errors,
            filtered: decoded.filtered,
            successes,
            errors,
        };

        info!(
            successes,
            errors,
            filtered = stats.filtered,
            decode_errors = stats.decode_errors,
            seconds = record.ingestion_duration_seconds,
            "Ingested file"
        );

        Ok(FileOutcome::Ingested { record, stats })
    }

    /// Stream enriched records into the store in bulk chunks
    ///
    /// Rejected items are counted and logged; the stream continues. An
    /// enrichment failure or a failed bulk request aborts the file.
    async fn write_all<S>(&self, entity: EntityType, records: S) -> Result<(u64, u64)>
    where
        S: Stream<Item = scholar_common::Result<EntityRecord>>,
    {
        let mut successes = 0u64;
        let mut errors = 0u64;
        let mut chunks = Box::pin(records.chunks(self.settings.bulk_chunk_size));

        while let Some(chunk) = chunks.next().await {
            let mut documents = Vec::with_capacity(chunk.len());
            for item in chunk {
                let record = item.context("Enrichment failed")?;
                match record.store_key(&self.settings.id_prefix) {
                    Ok(key) => documents.push(BulkDocument {
                        key,
                        document: record.into_value(),
                    }),
                    Err(e) => {
                        warn!(error = %e, "Record has no usable key");
                        errors += 1;
                    },
                }
            }

            let outcomes = self
                .store
                .bulk_upsert(entity.as_str(), documents, self.settings.bulk_request_timeout)
                .await
                .context("Bulk request failed")?;

            for outcome in outcomes {
                match outcome.error {
                    None => successes += 1,
                    Some(reason) => {
                        error!(key = %outcome.key, reason = %reason, "Document rejected");
                        errors += 1;
                    },
                }
            }
        }

        Ok((successes, errors))
    }
}

/// Decode `file` on a blocking thread, sending filtered records downstream
///
/// Malformed lines, including ones that are not valid UTF-8, are logged and
/// counted, never fatal. An unreadable gzip stream ends decoding with an
/// error returned from the join handle. If the
/// receiving side goes away the decoder stops early.
fn spawn_decoder(
    file: File,
    path: PathBuf,
    entity: EntityType,
    filter: Arc<dyn EntityFilter>,
) -> (
    ReceiverStream<EntityRecord>,
    tokio::task::JoinHandle<Result<DecodeStats>>,
) {
    let (tx, rx) = mpsc::channel(DECODE_CHANNEL_CAPACITY);

    let handle = tokio::task::spawn_blocking(move || {
        let mut stats = DecodeStats::default();
        let mut reader = BufReader::new(MultiGzDecoder::new(BufReader::new(file)));
        let mut buf = Vec::new();
        let mut line_no = 0usize;

        loop {
            buf.clear();
            let read = reader.read_until(b'\n', &mut buf).with_context(|| {
                format!("Read error after line {} of {}", line_no, path.display())
            })?;
            if read == 0 {
                break;
            }
            line_no += 1;
            if buf.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            stats.lines += 1;

            // Bytes are parsed as-is so a non-UTF-8 line only costs itself
            let mut record = match EntityRecord::from_json_slice(&buf) {
                Ok(record) => record,
                Err(e) => {
                    warn!(line = line_no, error = %e, "Skipping malformed line");
                    stats.decode_errors += 1;
                    continue;
                },
            };

            if !filter.ingest_entity(&mut record, entity) {
                stats.filtered += 1;
                continue;
            }

            if tx.blocking_send(record).is_err() {
                debug!("Pipeline closed, decoder stopping");
                break;
            }
        }

        Ok(stats)
    });

    (ReceiverStream::new(rx), handle)
}
