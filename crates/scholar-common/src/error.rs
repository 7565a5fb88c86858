//! Error types shared by the loader crates

use thiserror::Error;

/// Result type alias for loader operations
pub type Result<T> = std::result::Result<T, ScholarError>;

/// Main error type for the loader
#[derive(Error, Debug)]
pub enum ScholarError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Document store error: {0}")]
    Store(String),

    #[error("Enrichment service error: {0}")]
    Enrichment(String),

    #[error("Enrichment returned {actual} vectors for {expected} texts")]
    EnrichmentMismatch { expected: usize, actual: usize },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl ScholarError {
    /// Whether the failure came from the enrichment service
    pub fn is_enrichment(&self) -> bool {
        matches!(
            self,
            ScholarError::Enrichment(_) | ScholarError::EnrichmentMismatch { .. }
        )
    }
}
