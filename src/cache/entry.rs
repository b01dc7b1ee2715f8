//! Cache Entry Module
//!
//! Defines the documents persisted in the store: cache entries and the
//! chunks that oversized entries are split into.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::ValueShape;

/// Metadata field names that would collide with the document layout.
pub const RESERVED_FIELDS: [&str; 4] = ["_id", "id", "data", "chunks"];

/// Metadata key holding the type tag of non-mapping values.
const RESOURCE_NAME: &str = "resource_name";

// == Payload ==
/// Where an entry's encoded value lives. Inline data and chunk references
/// are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    /// The whole encoded value
    Inline(Vec<u8>),
    /// Chunk ids whose data, concatenated in this order, is the encoded value
    Chunked(Vec<String>),
}

// == Cache Entry ==
/// One logical cache record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Namespaced key
    pub id: String,
    pub payload: Payload,
    /// Expiration time, only written in TTL mode
    pub expires: Option<DateTime<Utc>>,
    /// Scalar metadata for external tooling; never read back by the cache
    #[serde(default)]
    pub extra_fields: BTreeMap<String, Value>,
}

impl CacheEntry {
    // == Constructors ==
    /// Creates an entry holding its payload inline.
    pub fn inline(id: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            payload: Payload::Inline(data),
            expires: None,
            extra_fields: BTreeMap::new(),
        }
    }

    /// Creates an entry referencing chunks by id, in payload order.
    pub fn chunked(id: impl Into<String>, chunk_ids: Vec<String>) -> Self {
        Self {
            id: id.into(),
            payload: Payload::Chunked(chunk_ids),
            expires: None,
            extra_fields: BTreeMap::new(),
        }
    }

    // == With Expiry ==
    /// Sets the expiration time; `None` means the entry never expires.
    pub fn with_expiry(mut self, expires: Option<DateTime<Utc>>) -> Self {
        self.expires = expires;
        self
    }

    // == With Extra Fields ==
    /// Attaches the metadata promoted from the stored value.
    pub fn with_extra_fields(mut self, extra_fields: BTreeMap<String, Value>) -> Self {
        self.extra_fields = extra_fields;
        self
    }

    /// Returns the referenced chunk ids; empty for inline entries.
    pub fn chunk_ids(&self) -> &[String] {
        match &self.payload {
            Payload::Chunked(ids) => ids,
            Payload::Inline(_) => &[],
        }
    }

    // == Is Chunked ==
    /// Returns true when the payload lives in chunk documents.
    pub fn is_chunked(&self) -> bool {
        matches!(self.payload, Payload::Chunked(_))
    }
}

// == Chunk Entry ==
/// A bounded fragment of an oversized payload, stored under a content-derived id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkEntry {
    pub id: String,
    pub data: Vec<u8>,
}

impl ChunkEntry {
    // == Constructor ==
    /// Creates a chunk holding one payload fragment.
    pub fn new(id: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }
}

// == Document ==
/// Anything the document store holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Document {
    Entry(CacheEntry),
    Chunk(ChunkEntry),
}

impl Document {
    // == Accessors ==
    /// Store id of the document, whichever kind it is.
    pub fn id(&self) -> &str {
        match self {
            Document::Entry(entry) => &entry.id,
            Document::Chunk(chunk) => &chunk.id,
        }
    }

    /// Returns the cache entry, dropping chunk documents.
    pub fn into_entry(self) -> Option<CacheEntry> {
        match self {
            Document::Entry(entry) => Some(entry),
            Document::Chunk(_) => None,
        }
    }

    /// Borrows the cache entry, if this is one.
    pub fn as_entry(&self) -> Option<&CacheEntry> {
        match self {
            Document::Entry(entry) => Some(entry),
            Document::Chunk(_) => None,
        }
    }

    /// Returns the chunk, dropping cache entries.
    pub fn into_chunk(self) -> Option<ChunkEntry> {
        match self {
            Document::Chunk(chunk) => Some(chunk),
            Document::Entry(_) => None,
        }
    }
}

// == Metadata Extraction ==
/// Derives the queryable metadata stored next to a value.
///
/// Mappings contribute their top-level string, number and boolean fields.
/// Every other value, structs included, is tagged with the snake_case name of
/// its Rust type. Reserved field names are always dropped.
pub fn extract_metadata<T: ?Sized>(shape: ValueShape, value: &Value) -> BTreeMap<String, Value> {
    let mut fields = BTreeMap::new();

    match (shape, value) {
        (ValueShape::Mapping, Value::Object(map)) => {
            for (name, field) in map {
                if matches!(field, Value::String(_) | Value::Number(_) | Value::Bool(_)) {
                    fields.insert(name.clone(), field.clone());
                }
            }
        }
        _ => {
            fields.insert(
                RESOURCE_NAME.to_string(),
                Value::String(resource_name::<T>()),
            );
        }
    }

    for reserved in RESERVED_FIELDS {
        fields.remove(reserved);
    }
    fields
}

/// Snake-cased short type name, e.g. `my_crate::MoleculeRecord` -> `molecule_record`.
fn resource_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    let short = base.rsplit("::").next().unwrap_or(base);
    camel_to_snake(short.trim_start_matches('&'))
}

fn camel_to_snake(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = prev.is_lowercase()
                || prev.is_ascii_digit()
                || (next_is_lower && prev != '_');
            if boundary {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }
    out
}
