//! Shared helpers for loader integration tests
//!
//! - [`MemoryStore`]: in-process [`DocumentStore`] with keyed upserts,
//!   append-only ledger documents, injectable item failures and bulk delays
//!   used to observe worker concurrency and write order
//! - [`ScriptedEmbedder`]: embedding service returning `[text length]` per
//!   text, optionally failing
//! - fixture writers for `<root>/<entity>/<date>/<chunk>.gz`

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;

use scholar_common::{Result, ScholarError};
use scholar_ingest::config::IngestConfig;
use scholar_ingest::embedding::EmbeddingService;
use scholar_ingest::entity::EntityType;
use scholar_ingest::filter::{DefaultEntityFilter, EntityFilter};
use scholar_ingest::schema::IndexSchema;
use scholar_ingest::store::{BulkDocument, BulkItemOutcome, DocumentStore};
use scholar_ingest::IngestOrchestrator;

pub const LEDGER: &str = "ingested_files";

// ============================================================================
// In-memory document store
// ============================================================================

#[derive(Default)]
struct IndexState {
    schema: Option<Value>,
    keyed: BTreeMap<String, Value>,
    appended: Vec<Value>,
}

#[derive(Default)]
pub struct MemoryStore {
    indexes: Mutex<HashMap<String, IndexState>>,
    failing_keys: HashSet<String>,
    bulk_delay: Option<Duration>,
    slow_documents: Option<(String, Value, Duration)>,
    bulk_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject bulk items with these keys
    pub fn with_failing_keys(mut self, keys: &[&str]) -> Self {
        self.failing_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    /// Hold every bulk request for `delay`
    pub fn with_bulk_delay(mut self, delay: Duration) -> Self {
        self.bulk_delay = Some(delay);
        self
    }

    /// Hold bulk requests carrying a document whose `field` equals `value`
    pub fn with_slow_documents(mut self, field: &str, value: Value, delay: Duration) -> Self {
        self.slow_documents = Some((field.to_string(), value, delay));
        self
    }

    /// Make every call fail as if the cluster were down
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(ScholarError::Network("connection refused".to_string()))
        } else {
            Ok(())
        }
    }

    pub fn has_index(&self, index: &str) -> bool {
        self.indexes.lock().unwrap().contains_key(index)
    }

    pub fn schema(&self, index: &str) -> Option<Value> {
        self.indexes
            .lock()
            .unwrap()
            .get(index)
            .and_then(|state| state.schema.clone())
    }

    pub fn document(&self, index: &str, key: &str) -> Option<Value> {
        self.indexes
            .lock()
            .unwrap()
            .get(index)
            .and_then(|state| state.keyed.get(key).cloned())
    }

    pub fn keys(&self, index: &str) -> Vec<String> {
        self.indexes
            .lock()
            .unwrap()
            .get(index)
            .map(|state| state.keyed.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Documents added with [`DocumentStore::append`]
    pub fn appended(&self, index: &str) -> Vec<Value> {
        self.indexes
            .lock()
            .unwrap()
            .get(index)
            .map(|state| state.appended.clone())
            .unwrap_or_default()
    }

    pub fn bulk_calls(&self) -> usize {
        self.bulk_calls.load(Ordering::SeqCst)
    }

    /// Highest number of bulk requests seen in flight at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn index_exists(&self, index: &str) -> Result<bool> {
        self.check_available()?;
        Ok(self.has_index(index))
    }

    async fn create_index(&self, index: &str, schema: &IndexSchema) -> Result<()> {
        self.check_available()?;
        self.indexes
            .lock()
            .unwrap()
            .entry(index.to_string())
            .or_insert_with(|| IndexState {
                schema: Some(schema.body().clone()),
                ..Default::default()
            });
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        self.check_available()?;
        self.indexes.lock().unwrap().remove(index);
        Ok(())
    }

    async fn bulk_upsert(
        &self,
        index: &str,
        documents: Vec<BulkDocument>,
        _timeout: Duration,
    ) -> Result<Vec<BulkItemOutcome>> {
        self.check_available()?;
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        let mut delay = self.bulk_delay.unwrap_or_default();
        if let Some((field, value, slow)) = &self.slow_documents {
            if documents.iter().any(|doc| doc.document.get(field) == Some(value)) {
                delay += *slow;
            }
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut indexes = self.indexes.lock().unwrap();
        let state = indexes.entry(index.to_string()).or_default();
        let outcomes = documents
            .into_iter()
            .map(|doc| {
                if self.failing_keys.contains(&doc.key) {
                    BulkItemOutcome::failed(doc.key, "mapper_parsing_exception: rejected")
                } else {
                    state.keyed.insert(doc.key.clone(), doc.document);
                    BulkItemOutcome::ok(doc.key)
                }
            })
            .collect();
        Ok(outcomes)
    }

    async fn count_term(&self, index: &str, field: &str, value: &str) -> Result<u64> {
        self.check_available()?;
        let indexes = self.indexes.lock().unwrap();
        let count = indexes
            .get(index)
            .map(|state| {
                state
                    .appended
                    .iter()
                    .filter(|doc| doc.get(field).and_then(Value::as_str) == Some(value))
                    .count()
            })
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn append(&self, index: &str, document: Value) -> Result<()> {
        self.check_available()?;
        self.indexes
            .lock()
            .unwrap()
            .entry(index.to_string())
            .or_default()
            .appended
            .push(document);
        Ok(())
    }
}

// ============================================================================
// Scripted embedding service
// ============================================================================

/// Returns `[text length]` for every text and records each request
#[derive(Default)]
pub struct ScriptedEmbedder {
    calls: Mutex<Vec<Vec<String>>>,
    failing: AtomicBool,
}

impl ScriptedEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let embedder = Self::default();
        embedder.set_failing(true);
        embedder
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Every text sent so far, in request order
    pub fn texts(&self) -> Vec<String> {
        self.calls().into_iter().flatten().collect()
    }
}

#[async_trait]
impl EmbeddingService for ScriptedEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        self.calls.lock().unwrap().push(texts.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(ScholarError::Enrichment("service unavailable".to_string()));
        }
        Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
    }
}

// ============================================================================
// Dataset fixtures
// ============================================================================

/// Write `records` as one gzip JSON-lines chunk and return its path
pub fn write_chunk(
    root: &Path,
    entity: EntityType,
    date: &str,
    name: &str,
    records: &[Value],
) -> PathBuf {
    let lines: Vec<String> = records.iter().map(Value::to_string).collect();
    write_raw_chunk(root, entity, date, name, &(lines.join("\n") + "\n"))
}

/// Write arbitrary bytes as one gzip chunk
pub fn write_raw_chunk(
    root: &Path,
    entity: EntityType,
    date: &str,
    name: &str,
    content: impl AsRef<[u8]>,
) -> PathBuf {
    let dir = root.join(entity.as_str()).join(date);
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
    encoder.write_all(content.as_ref()).unwrap();
    encoder.finish().unwrap();
    path
}

pub fn openalex_id(key: &str) -> String {
    format!("https://openalex.org/{}", key)
}

// ============================================================================
// Orchestrator wiring
// ============================================================================

pub fn test_config(root: &Path, entities: &[EntityType]) -> IngestConfig {
    let mut config = IngestConfig::new(root);
    config.entities = entities.to_vec();
    config.ledger_index = LEDGER.to_string();
    config.max_concurrent_files = 2;
    config.inference_chunk_size = 2;
    config.bulk_chunk_size = 2;
    config
}

pub fn orchestrator(
    config: IngestConfig,
    store: &Arc<MemoryStore>,
    embedder: &Arc<ScriptedEmbedder>,
) -> IngestOrchestrator {
    orchestrator_with_filter(config, store, embedder, Arc::new(DefaultEntityFilter))
}

pub fn orchestrator_with_filter(
    config: IngestConfig,
    store: &Arc<MemoryStore>,
    embedder: &Arc<ScriptedEmbedder>,
    filter: Arc<dyn EntityFilter>,
) -> IngestOrchestrator {
    IngestOrchestrator::new(config, store.clone(), embedder.clone(), filter).unwrap()
}
