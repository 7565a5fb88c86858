//! Loader configuration
//!
//! Everything the orchestrator needs is carried in one [`IngestConfig`] value.
//! The binary builds it from environment variables (a `.env` file is honoured);
//! tests build it directly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::entity::EntityType;

/// Prefix shared by every dataset id; stripped to form the document key
pub const DEFAULT_ID_PREFIX: &str = "https://openalex.org/";

pub const DEFAULT_ELASTICSEARCH_URL: &str = "http://localhost:9200";
pub const DEFAULT_EMBEDDING_SERVICE_URL: &str = "http://localhost:8000";
pub const DEFAULT_LEDGER_INDEX: &str = "ingested_files";

/// Connection settings for the document store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    pub url: String,
    pub username: String,
    pub password: Option<String>,
    /// Directory holding `ca/ca.crt` for a self-signed cluster
    pub ca_certs_path: Option<PathBuf>,
}

impl StoreConfig {
    /// Path of the CA certificate, when one is configured
    pub fn ca_cert_file(&self) -> Option<PathBuf> {
        self.ca_certs_path
            .as_ref()
            .map(|dir| dir.join("ca").join("ca.crt"))
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_ELASTICSEARCH_URL.to_string(),
            username: "elastic".to_string(),
            password: None,
            ca_certs_path: None,
        }
    }
}

/// Main loader configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestConfig {
    /// Dataset root holding `<entity>/<date>/<chunk>.gz`
    pub data_root: PathBuf,
    /// Entity types to load, in order
    pub entities: Vec<EntityType>,
    pub store: StoreConfig,
    /// Base URL of the embedding service
    pub embedding_url: String,
    /// Index holding one provenance record per finished file
    pub ledger_index: String,
    /// Maximum number of files processed at once
    pub max_concurrent_files: usize,
    /// Records per enrichment request
    pub inference_chunk_size: usize,
    /// Documents per bulk request
    pub bulk_chunk_size: usize,
    pub bulk_request_timeout_secs: u64,
    pub id_prefix: String,
    /// Dimension of the embedding vectors, used for the works mapping
    pub embedding_dims: Option<usize>,
}

impl IngestConfig {
    /// Configuration with defaults for everything but the dataset root
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            entities: vec![EntityType::Authors],
            store: StoreConfig::default(),
            embedding_url: DEFAULT_EMBEDDING_SERVICE_URL.to_string(),
            ledger_index: DEFAULT_LEDGER_INDEX.to_string(),
            max_concurrent_files: 4,
            inference_chunk_size: 32,
            bulk_chunk_size: 500,
            bulk_request_timeout_secs: 60,
            id_prefix: DEFAULT_ID_PREFIX.to_string(),
            embedding_dims: None,
        }
    }

    /// Load from environment variables, reading `.env` first if present
    pub fn from_env() -> Result<Self> {
        // A missing .env file is normal in production
        let _ = dotenvy::dotenv();

        let data_root = std::env::var("OPENALEX_DATA_TO_INGEST_PATH")
            .context("OPENALEX_DATA_TO_INGEST_PATH must be set")?;
        let mut config = Self::new(data_root);

        if let Ok(entities) = std::env::var("ENTITIES_TO_INGEST") {
            config.entities = parse_entities(&entities)?;
        }

        config.store = StoreConfig {
            url: std::env::var("ELASTICSEARCH_URL")
                .unwrap_or_else(|_| DEFAULT_ELASTICSEARCH_URL.to_string()),
            username: std::env::var("ELASTIC_USERNAME").unwrap_or_else(|_| "elastic".to_string()),
            password: std::env::var("ELASTIC_PASSWORD").ok(),
            ca_certs_path: std::env::var("CA_CERTS_PATH").ok().map(PathBuf::from),
        };

        if let Ok(url) = std::env::var("EMBEDDING_SERVICE_URL") {
            config.embedding_url = url;
        }
        if let Ok(index) = std::env::var("INGESTED_FILES_INDEX") {
            config.ledger_index = index;
        }
        if let Ok(prefix) = std::env::var("ID_PREFIX") {
            config.id_prefix = prefix;
        }

        config.max_concurrent_files = env_number("NB_INGESTION_PROCESSES", config.max_concurrent_files)?;
        config.inference_chunk_size = env_number("INFERENCE_CHUNK_SIZE", config.inference_chunk_size)?;
        config.bulk_chunk_size = env_number("INGESTION_CHUNK_SIZE", config.bulk_chunk_size)?;
        config.bulk_request_timeout_secs =
            env_number("INGESTION_REQUEST_TIMEOUT", config.bulk_request_timeout_secs)?;
        if let Ok(dims) = std::env::var("EMBEDDING_DIMS") {
            config.embedding_dims = Some(
                dims.parse()
                    .with_context(|| format!("EMBEDDING_DIMS is not a number: '{}'", dims))?,
            );
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.entities.is_empty() {
            anyhow::bail!("At least one entity type must be configured");
        }
        if self.max_concurrent_files == 0 {
            anyhow::bail!("NB_INGESTION_PROCESSES must be greater than 0");
        }
        if self.inference_chunk_size == 0 {
            anyhow::bail!("INFERENCE_CHUNK_SIZE must be greater than 0");
        }
        if self.bulk_chunk_size == 0 {
            anyhow::bail!("INGESTION_CHUNK_SIZE must be greater than 0");
        }
        if self.bulk_request_timeout_secs == 0 {
            anyhow::bail!("INGESTION_REQUEST_TIMEOUT must be greater than 0");
        }
        if self.ledger_index.trim().is_empty() {
            anyhow::bail!("INGESTED_FILES_INDEX must not be empty");
        }
        if self.entities.iter().any(|e| e.as_str() == self.ledger_index) {
            anyhow::bail!(
                "INGESTED_FILES_INDEX '{}' collides with an entity index",
                self.ledger_index
            );
        }
        Ok(())
    }

    pub fn bulk_request_timeout(&self) -> Duration {
        Duration::from_secs(self.bulk_request_timeout_secs)
    }

    /// Directory holding every dated batch of one entity type
    pub fn entity_dir(&self, entity: EntityType) -> PathBuf {
        self.data_root.join(entity.as_str())
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }
}

/// Parse a comma-separated entity list such as `"works, authors"`
pub fn parse_entities(list: &str) -> Result<Vec<EntityType>> {
    let mut entities = Vec::new();
    for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let entity: EntityType = name.parse()?;
        if !entities.contains(&entity) {
            entities.push(entity);
        }
    }
    Ok(entities)
}

fn env_number<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} is not a valid number: '{}'", key, raw)),
        Err(_) => Ok(default),
    }
}
