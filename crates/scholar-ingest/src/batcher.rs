//! Windowed enrichment of decoded records
//!
//! Records are grouped into windows of `chunk_size` in source order. When a
//! window fills (or the input ends) it is flushed once: records with an
//! abstract are embedded in a single service call and emitted first, records
//! without one follow. Relative source order is kept inside each group.
//!
//! Entity types without enrichment pass through window by window unchanged.

use std::sync::Arc;

use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use tracing::{debug, trace};

use scholar_common::{Result, ScholarError};

use crate::embedding::EmbeddingService;
use crate::entity::{EntityRecord, EntityType};

/// Accumulates records into windows and enriches each window in one call
#[derive(Clone)]
pub struct InferenceBatcher {
    service: Arc<dyn EmbeddingService>,
    entity: EntityType,
    chunk_size: usize,
}

/// Split a window into records with and without abstract text
///
/// Both groups keep the window's relative order.
pub fn partition_window(window: Vec<EntityRecord>) -> (Vec<EntityRecord>, Vec<EntityRecord>) {
    window
        .into_iter()
        .partition(|record| record.abstract_text().is_some())
}

impl InferenceBatcher {
    /// `chunk_size` is clamped to at least one record per window
    pub fn new(service: Arc<dyn EmbeddingService>, entity: EntityType, chunk_size: usize) -> Self {
        Self {
            service,
            entity,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Flush one window, returning its records in emission order
    ///
    /// Fails when the service call fails or returns a different number of
    /// vectors than texts sent; no partially enriched window is ever emitted.
    pub async fn flush(&self, window: Vec<EntityRecord>) -> Result<Vec<EntityRecord>> {
        if window.is_empty() || !self.entity.supports_enrichment() {
            return Ok(window);
        }

        let window_len = window.len();
        let (mut with_feature, without_feature) = partition_window(window);

        if !with_feature.is_empty() {
            let texts: Vec<String> = with_feature
                .iter()
                .filter_map(|record| record.abstract_text().map(str::to_string))
                .collect();

            let vectors = self.service.embed(texts).await?;
            if vectors.len() != with_feature.len() {
                return Err(ScholarError::EnrichmentMismatch {
                    expected: with_feature.len(),
                    actual: vectors.len(),
                });
            }

            for (record, vector) in with_feature.iter_mut().zip(vectors) {
                record.set_embedding(vector);
            }
        }

        debug!(
            entity = %self.entity,
            window = window_len,
            enriched = with_feature.len(),
            "Flushed inference window"
        );

        let mut emitted = with_feature;
        emitted.extend(without_feature);
        Ok(emitted)
    }

    /// Enrich a record stream lazily, one window at a time
    ///
    /// A failed window surfaces as an `Err` item; consumers are expected to
    /// stop at the first error.
    pub fn enrich<S>(self, records: S) -> impl Stream<Item = Result<EntityRecord>> + Send + 'static
    where
        S: Stream<Item = EntityRecord> + Send + 'static,
    {
        let chunk_size = self.chunk_size;
        records
            .chunks(chunk_size)
            .then(move |window| {
                let batcher = self.clone();
                async move {
                    trace!(size = window.len(), "Window ready");
                    batcher.flush(window).await
                }
            })
            .map_ok(|records| stream::iter(records.into_iter().map(Ok::<_, ScholarError>)))
            .try_flatten()
    }
}
