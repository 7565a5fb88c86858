//! Per-entity filtering and field repair
//!
//! The loader asks an [`EntityFilter`] about every decoded record before it is
//! enriched or written. Returning `false` drops the record.

use serde_json::Value;

use crate::entity::{EntityRecord, EntityType, ABSTRACT_FIELD};

/// Field repair and admission decision for decoded records
pub trait EntityFilter: Send + Sync {
    /// Repair `record` in place and decide whether it should be ingested
    fn ingest_entity(&self, record: &mut EntityRecord, entity_type: EntityType) -> bool;
}

/// Accepts every identified record; rebuilds work abstracts
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEntityFilter;

impl EntityFilter for DefaultEntityFilter {
    fn ingest_entity(&self, record: &mut EntityRecord, entity_type: EntityType) -> bool {
        if record.id().is_none() {
            return false;
        }

        if entity_type == EntityType::Works && record.abstract_text().is_none() {
            let rebuilt = record
                .get("abstract_inverted_index")
                .and_then(rebuild_abstract);
            record.insert(
                ABSTRACT_FIELD,
                rebuilt.map(Value::String).unwrap_or(Value::Null),
            );
        }

        true
    }
}

/// Rebuild plain text from a `word -> [positions]` inverted index
pub fn rebuild_abstract(index: &Value) -> Option<String> {
    let index = index.as_object()?;

    let mut positioned: Vec<(u64, &str)> = index
        .iter()
        .flat_map(|(word, positions)| {
            positions
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(Value::as_u64)
                .map(move |pos| (pos, word.as_str()))
        })
        .collect();

    if positioned.is_empty() {
        return None;
    }

    positioned.sort_unstable_by_key(|(pos, _)| *pos);
    let words: Vec<&str> = positioned.into_iter().map(|(_, word)| word).collect();
    Some(words.join(" "))
}
