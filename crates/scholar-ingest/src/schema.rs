//! Index creation bodies
//!
//! Some entity types carry far more distinct fields than the store's default
//! limit allows, and works need a vector mapping for their embeddings.

use serde_json::{json, Value};

use crate::entity::{EntityType, EMBEDDING_FIELD};

/// Settings and mappings sent when an index is created
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSchema {
    body: Value,
}

impl IndexSchema {
    /// Schema for an entity index
    ///
    /// `embedding_dims` pins the vector dimension for works; without it the
    /// store infers the dimension from the first document.
    pub fn for_entity(entity: EntityType, embedding_dims: Option<usize>) -> Self {
        let field_limit = match entity {
            EntityType::Works => Some(5000),
            EntityType::Authors | EntityType::Institutions => Some(2000),
            _ => None,
        };

        let mut body = json!({});
        if let Some(limit) = field_limit {
            body["settings"] = json!({ "index.mapping.total_fields.limit": limit });
        }

        if entity.supports_enrichment() {
            let mut vector = json!({
                "type": "dense_vector",
                "index": true,
                "similarity": "cosine",
            });
            if let Some(dims) = embedding_dims {
                vector["dims"] = json!(dims);
            }
            body["mappings"] = json!({ "properties": { EMBEDDING_FIELD: vector } });
        }

        Self { body }
    }

    /// Schema for the provenance ledger; `file` must match exactly
    pub fn ledger() -> Self {
        Self {
            body: json!({
                "mappings": {
                    "properties": {
                        "file": { "type": "keyword" },
                        "ingestion_started": { "type": "date" },
                        "ingestion_finished": { "type": "date" },
                        "ingestion_duration_seconds": { "type": "double" },
                        "successes": { "type": "long" },
                        "errors": { "type": "long" },
                    }
                }
            }),
        }
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Whether the schema changes anything from the store's defaults
    pub fn is_default(&self) -> bool {
        self.body.as_object().is_some_and(|o| o.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_works_schema_maps_embeddings() {
        let schema = IndexSchema::for_entity(EntityType::Works, Some(384));
        let body = schema.body();
        assert_eq!(body["settings"]["index.mapping.total_fields.limit"], 5000);
        assert_eq!(body["mappings"]["properties"][EMBEDDING_FIELD]["type"], "dense_vector");
        assert_eq!(body["mappings"]["properties"][EMBEDDING_FIELD]["dims"], 384);
    }

    #[test]
    fn test_authors_only_raise_field_limit() {
        let body = IndexSchema::for_entity(EntityType::Authors, None).body().clone();
        assert_eq!(body["settings"]["index.mapping.total_fields.limit"], 2000);
        assert!(body.get("mappings").is_none());
    }

    #[test]
    fn test_small_entities_use_defaults() {
        assert!(IndexSchema::for_entity(EntityType::Topics, None).is_default());
        assert!(!IndexSchema::ledger().is_default());
    }

    #[test]
    fn test_ledger_file_field_is_keyword() {
        let ledger = IndexSchema::ledger();
        assert_eq!(ledger.body()["mappings"]["properties"]["file"]["type"], "keyword");
    }
}
