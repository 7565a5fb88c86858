//! Document store seam
//!
//! The loader talks to the store through [`DocumentStore`]: keyed bulk
//! upserts for entity documents, append-only writes and exact-match counts for
//! the provenance ledger, and index lifecycle calls for setup and reset.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use scholar_common::Result;

use crate::schema::IndexSchema;

pub mod elasticsearch;

pub use elasticsearch::ElasticsearchStore;

/// One keyed document in a bulk request
#[derive(Debug, Clone, PartialEq)]
pub struct BulkDocument {
    /// Upsert key; writing the same key twice overwrites
    pub key: String,
    pub document: Value,
}

/// Per-item result reported by a bulk request
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItemOutcome {
    pub key: String,
    /// Store-provided reason when the item was rejected
    pub error: Option<String>,
}

impl BulkItemOutcome {
    pub fn ok(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            error: None,
        }
    }

    pub fn failed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            error: Some(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Searchable document store
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn index_exists(&self, index: &str) -> Result<bool>;

    /// Create `index`; creating one that already exists is not an error
    async fn create_index(&self, index: &str, schema: &IndexSchema) -> Result<()>;

    /// Delete `index`; deleting a missing index is not an error
    async fn delete_index(&self, index: &str) -> Result<()>;

    /// Upsert every document, continuing past rejected items
    ///
    /// Returns one outcome per submitted document. An `Err` means the request
    /// as a whole failed and no per-item outcome is known.
    async fn bulk_upsert(
        &self,
        index: &str,
        documents: Vec<BulkDocument>,
        timeout: Duration,
    ) -> Result<Vec<BulkItemOutcome>>;

    /// Number of documents whose keyword `field` equals `value`
    async fn count_term(&self, index: &str, field: &str, value: &str) -> Result<u64>;

    /// Add a document under a store-generated key, visible to the next count
    async fn append(&self, index: &str, document: Value) -> Result<()>;
}

/// Create `index` with `schema` unless it already exists
///
/// Returns whether the index was created.
pub async fn ensure_index<S>(store: &S, index: &str, schema: &IndexSchema) -> Result<bool>
where
    S: DocumentStore + ?Sized,
{
    if store.index_exists(index).await? {
        debug!(index, "Index already exists");
        return Ok(false);
    }
    store.create_index(index, schema).await?;
    info!(index, "Created index");
    Ok(true)
}

/// Drop and recreate `index` with `schema`
pub async fn recreate_index<S>(store: &S, index: &str, schema: &IndexSchema) -> Result<()>
where
    S: DocumentStore + ?Sized,
{
    store.delete_index(index).await?;
    store.create_index(index, schema).await?;
    info!(index, "Recreated index");
    Ok(())
}
