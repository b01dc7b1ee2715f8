//! Key Module
//!
//! Key namespacing, versioning and content-derived chunk ids.

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};

/// Marker occupying the version slot of chunk ids.
const CHUNK_SLOT: &str = "chunk";

// == Key Codec ==
/// Produces store ids for cache keys and chunk contents.
pub trait KeyCodec: Send + Sync {
    /// Namespaced, version-qualified id for a raw cache key.
    fn make_key(&self, raw: &str, version: i64) -> String;

    /// Deterministic id derived from `bytes` alone.
    fn content_key(&self, bytes: &[u8]) -> String;

    /// Id of the `index`-th chunk of `parent`. Must never equal an id that
    /// `make_key` can return.
    fn chunk_key(&self, parent: &str, index: usize, digest: &str) -> String;
}

// == Default Key Codec ==
/// `prefix:version:key` namespacing with SHA-256 content keys.
///
/// Chunk ids are `prefix:chunk:parent:index:digest`. The version slot of a
/// cache key always holds an integer, so `chunk` there cannot clash with one.
#[derive(Debug, Clone, Default)]
pub struct DefaultKeyCodec {
    prefix: String,
}

impl DefaultKeyCodec {
    /// Creates a codec namespacing every id under `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl KeyCodec for DefaultKeyCodec {
    fn make_key(&self, raw: &str, version: i64) -> String {
        format!("{}:{}:{}", self.prefix, version, raw)
    }

    fn content_key(&self, bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    fn chunk_key(&self, parent: &str, index: usize, digest: &str) -> String {
        format!("{}:{}:{}:{}:{}", self.prefix, CHUNK_SLOT, parent, index, digest)
    }
}

// == Cache Key ==
/// A raw key plus an optional version overriding the cache default.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub raw: String,
    pub version: Option<i64>,
}

impl CacheKey {
    // == Constructors ==
    /// Key using the cache-wide version.
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            version: None,
        }
    }

    /// Key pinned to an explicit version.
    pub fn versioned(raw: impl Into<String>, version: i64) -> Self {
        Self {
            raw: raw.into(),
            version: Some(version),
        }
    }
}

impl From<&str> for CacheKey {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for CacheKey {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<&String> for CacheKey {
    fn from(raw: &String) -> Self {
        Self::new(raw.as_str())
    }
}

// == Chunk Id Scheme ==
/// How chunk ids are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkIdScheme {
    /// Parent key, chunk index and content hash. Chunks are never shared.
    #[default]
    Namespaced,
    /// Content hash only. Identical fragments of unrelated entries share one
    /// stored chunk and deleting either entry removes it for both.
    ContentAddressed,
}

impl ChunkIdScheme {
    /// Computes the id of the `index`-th fragment of the entry `parent`.
    pub fn chunk_id(
        &self,
        codec: &dyn KeyCodec,
        parent: &str,
        index: usize,
        fragment: &[u8],
    ) -> String {
        let digest = codec.content_key(fragment);
        match self {
            ChunkIdScheme::Namespaced => codec.chunk_key(parent, index, &digest),
            ChunkIdScheme::ContentAddressed => digest,
        }
    }
}

impl FromStr for ChunkIdScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "namespaced" => Ok(ChunkIdScheme::Namespaced),
            "content" | "content_addressed" => Ok(ChunkIdScheme::ContentAddressed),
            other => Err(format!("unknown chunk id scheme: {}", other)),
        }
    }
}

impl fmt::Display for ChunkIdScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkIdScheme::Namespaced => write!(f, "namespaced"),
            ChunkIdScheme::ContentAddressed => write!(f, "content"),
        }
    }
}
