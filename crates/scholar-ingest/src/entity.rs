//! Entity types and records
//!
//! Each entity type maps to one dataset directory and one destination index.
//! Records are kept as raw JSON objects; the loader only reads `id` and, for
//! works, the derived `abstract` text.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use scholar_common::{Result, ScholarError};

/// Field holding the text sent to the enrichment service
pub const ABSTRACT_FIELD: &str = "abstract";

/// Field receiving the embedding vector
pub const EMBEDDING_FIELD: &str = "abstract_embeddings";

/// Category of scholarly object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Authors,
    Concepts,
    Domains,
    Fields,
    Funders,
    Institutions,
    Publishers,
    Sources,
    Subfields,
    Topics,
    Works,
}

impl EntityType {
    pub const ALL: [EntityType; 11] = [
        EntityType::Authors,
        EntityType::Concepts,
        EntityType::Domains,
        EntityType::Fields,
        EntityType::Funders,
        EntityType::Institutions,
        EntityType::Publishers,
        EntityType::Sources,
        EntityType::Subfields,
        EntityType::Topics,
        EntityType::Works,
    ];

    /// Directory name in the dataset and destination index name
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Authors => "authors",
            EntityType::Concepts => "concepts",
            EntityType::Domains => "domains",
            EntityType::Fields => "fields",
            EntityType::Funders => "funders",
            EntityType::Institutions => "institutions",
            EntityType::Publishers => "publishers",
            EntityType::Sources => "sources",
            EntityType::Subfields => "subfields",
            EntityType::Topics => "topics",
            EntityType::Works => "works",
        }
    }

    /// Only works carry an abstract worth embedding
    pub fn supports_enrichment(&self) -> bool {
        matches!(self, EntityType::Works)
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = ScholarError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        EntityType::ALL
            .into_iter()
            .find(|entity| entity.as_str() == wanted)
            .ok_or_else(|| ScholarError::Config(format!("Unknown entity type: '{}'", s)))
    }
}

/// One decoded scholarly entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityRecord(Map<String, Value>);

impl EntityRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Decode one JSON line; anything but an object is rejected
    pub fn from_json_line(line: &str) -> Result<Self> {
        Self::from_json_slice(line.as_bytes())
    }

    /// Decode one raw line; invalid UTF-8 is a serialization error
    pub fn from_json_slice(line: &[u8]) -> Result<Self> {
        match serde_json::from_slice(line)? {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(ScholarError::Parse(format!(
                "expected a JSON object, found {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    /// Document key: the id with the dataset URI prefix removed
    pub fn store_key(&self, prefix: &str) -> Result<String> {
        let id = self
            .id()
            .ok_or_else(|| ScholarError::Parse("record has no string 'id'".to_string()))?;
        match id.strip_prefix(prefix) {
            Some(key) if !key.is_empty() => Ok(key.to_string()),
            _ => Err(ScholarError::Parse(format!(
                "id '{}' does not start with '{}'",
                id, prefix
            ))),
        }
    }

    /// Derived abstract text, if present and non-empty
    pub fn abstract_text(&self) -> Option<&str> {
        self.0
            .get(ABSTRACT_FIELD)
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
    }

    pub fn set_embedding(&mut self, vector: Vec<f32>) {
        let values = vector.into_iter().map(Value::from).collect();
        self.0.insert(EMBEDDING_FIELD.to_string(), Value::Array(values));
    }

    pub fn has_embedding(&self) -> bool {
        self.0.contains_key(EMBEDDING_FIELD)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
