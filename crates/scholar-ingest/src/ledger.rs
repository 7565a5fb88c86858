//! Provenance ledger
//!
//! One append-only record per fully ingested source file. A file is identified
//! by its last three path segments (`<entity>/<date>/<chunk>`), joined with
//! `/` whatever the host OS, so the ledger survives moving the dataset root.
//! The absence of a record is what makes a file eligible on the next run.

use std::path::{Component, Path};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use scholar_common::Result;

use crate::schema::IndexSchema;
use crate::store::{self, DocumentStore};

/// Keyword field holding the relative file path
pub const FILE_FIELD: &str = "file";

/// Proof that a source file was streamed to the end and its writes settled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub file: String,
    pub ingestion_started: DateTime<Utc>,
    pub ingestion_finished: DateTime<Utc>,
    pub ingestion_duration_seconds: f64,
    pub successes: u64,
    pub errors: u64,
}

impl ProvenanceRecord {
    pub fn new(
        file: impl Into<String>,
        started: DateTime<Utc>,
        finished: DateTime<Utc>,
        successes: u64,
        errors: u64,
    ) -> Self {
        let duration = (finished - started)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Self {
            file: file.into(),
            ingestion_started: started,
            ingestion_finished: finished,
            ingestion_duration_seconds: duration,
            successes,
            errors,
        }
    }
}

/// Stable identity of a source file: its last three path segments
pub fn relative_file_path(path: &Path) -> String {
    let segments: Vec<String> = path
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    let start = segments.len().saturating_sub(3);
    segments[start..].join("/")
}

/// Ledger of ingested files, kept in its own store index
#[derive(Clone)]
pub struct ProvenanceLedger {
    store: Arc<dyn DocumentStore>,
    index: String,
}

impl ProvenanceLedger {
    pub fn new(store: Arc<dyn DocumentStore>, index: impl Into<String>) -> Self {
        Self {
            store,
            index: index.into(),
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    /// Create the ledger index if missing, with `file` as an exact-match keyword
    pub async fn ensure_index(&self) -> Result<()> {
        store::ensure_index(self.store.as_ref(), &self.index, &IndexSchema::ledger()).await?;
        Ok(())
    }

    /// Drop every record by recreating the index
    pub async fn reset(&self) -> Result<()> {
        store::recreate_index(self.store.as_ref(), &self.index, &IndexSchema::ledger()).await
    }

    /// Whether `relative_path` already has a provenance record
    ///
    /// More than one record means the file was ingested twice; that is
    /// reported but still counts as ingested.
    pub async fn is_ingested(&self, relative_path: &str) -> Result<bool> {
        let matches = self
            .store
            .count_term(&self.index, FILE_FIELD, relative_path)
            .await?;

        match matches {
            0 => Ok(false),
            1 => Ok(true),
            n => {
                warn!(
                    file = relative_path,
                    matches = n,
                    ledger = %self.index,
                    "Duplicate provenance records; the file was ingested more than once"
                );
                Ok(true)
            },
        }
    }

    /// Append one provenance record
    pub async fn record(
        &self,
        relative_path: &str,
        started: DateTime<Utc>,
        finished: DateTime<Utc>,
        successes: u64,
        errors: u64,
    ) -> Result<ProvenanceRecord> {
        let record = ProvenanceRecord::new(relative_path, started, finished, successes, errors);
        self.store
            .append(&self.index, serde_json::to_value(&record)?)
            .await?;
        debug!(file = relative_path, successes, errors, "Recorded provenance");
        Ok(record)
    }
}
