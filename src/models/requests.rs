//! Request DTOs for the cache server API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;
use serde_json::Value;

use crate::cache::{CacheKey, MAX_KEY_LENGTH};

/// Request body for the SET and ADD operations (PUT /set, PUT /add)
///
/// # Fields
/// - `key`: The cache key to store the value under
/// - `value`: Any JSON value
/// - `ttl`: Optional TTL in seconds (uses default if not specified)
/// - `version`: Optional key version (uses the cache version if not specified)
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub ttl: Option<u64>,
    #[serde(default)]
    pub version: Option<i64>,
}

impl SetRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        validate_key(&self.key)
    }

    /// Cache key for this request, honouring `version`.
    pub fn cache_key(&self) -> CacheKey {
        CacheKey {
            raw: self.key.clone(),
            version: self.version,
        }
    }
}

/// Request body for the batch lookup (POST /get_many)
#[derive(Debug, Clone, Deserialize)]
pub struct GetManyRequest {
    pub keys: Vec<String>,
    #[serde(default)]
    pub version: Option<i64>,
}

impl GetManyRequest {
    /// Validates every key; returns the first error found.
    pub fn validate(&self) -> Option<String> {
        self.keys.iter().find_map(|key| validate_key(key))
    }

    /// Cache keys for every requested key, honouring `version`.
    pub fn cache_keys(&self) -> Vec<CacheKey> {
        self.keys
            .iter()
            .map(|key| CacheKey {
                raw: key.clone(),
                version: self.version,
            })
            .collect()
    }
}

/// Optional `?version=` query parameter on key-addressed routes
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VersionQuery {
    #[serde(default)]
    pub version: Option<i64>,
}

fn validate_key(key: &str) -> Option<String> {
    if key.is_empty() {
        return Some("Key cannot be empty".to_string());
    }
    if key.len() > MAX_KEY_LENGTH {
        return Some(format!(
            "Key exceeds maximum length of {} characters",
            MAX_KEY_LENGTH
        ));
    }
    None
}
