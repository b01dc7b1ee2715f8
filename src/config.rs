//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde_json::Value;

use crate::cache::{ChunkIdScheme, MAX_SIZE};
use crate::store::IndexDescriptor;

/// Top-level configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Background sweep interval in seconds
    pub cleanup_interval: u64,
    /// Document store connection target
    pub store: StoreConfig,
    /// Cache engine behaviour
    pub cache: CacheOptions,
}

/// Where and how to reach the document store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    /// Collection holding both cache entries and chunks
    pub collection: String,
    pub replica_set: Option<String>,
    pub replica_hosts: Vec<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub server_selection_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub socket_timeout_ms: Option<u64>,
    /// Read preference mode handed to the driver (`primary`, `secondaryPreferred`, ...)
    pub read_preference: Option<String>,
    /// Replica tag sets narrowing the read preference, as a JSON list of objects
    pub tag_sets: Option<Value>,
    /// Storage-engine block compressor for a collection created on first connect.
    /// `none` when values are already compressed, `None` for the server default.
    pub block_compressor: Option<String>,
    /// Server-side execution time hint passed with every read
    pub max_time_ms: Option<u64>,
    /// Indexes ensured when the connection is first established
    pub indexes: Vec<IndexDescriptor>,
}

impl StoreConfig {
    /// Returns the per-call execution time hint, if any.
    pub fn max_time(&self) -> Option<Duration> {
        self.max_time_ms.map(Duration::from_millis)
    }

    /// Block compressor matching the cache's own compression setting:
    /// `none` while the cache compresses payloads itself.
    pub fn block_compressor_for(compression: bool) -> Option<String> {
        compression.then(|| "none".to_string())
    }

    /// Returns true when both user and password are configured.
    pub fn has_credentials(&self) -> bool {
        self.user.is_some() && self.password.is_some()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 27017,
            database: "django_cache".to_string(),
            collection: "cache".to_string(),
            replica_set: None,
            replica_hosts: Vec::new(),
            user: None,
            password: None,
            server_selection_timeout_ms: 30_000,
            connect_timeout_ms: 20_000,
            socket_timeout_ms: None,
            read_preference: None,
            tag_sets: None,
            block_compressor: Self::block_compressor_for(CacheOptions::default().compression),
            max_time_ms: Some(2_000),
            indexes: Vec::new(),
        }
    }
}

/// Cache engine options.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// When false the cache runs in archival mode: no expiry is written or checked
    pub ttl_enabled: bool,
    /// Default TTL in seconds for writes without explicit TTL
    pub default_ttl: u64,
    /// Document count above which a write triggers a cull
    pub max_entries: usize,
    /// 0 wipes the store on cull, anything else removes expired entries
    pub cull_frequency: u32,
    /// Largest payload stored inline, and the size of each chunk
    pub max_size: usize,
    pub compression: bool,
    pub compression_level: u32,
    pub key_prefix: String,
    /// Version used when a key does not carry its own
    pub version: i64,
    pub chunk_ids: ChunkIdScheme,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            ttl_enabled: true,
            default_ttl: 300,
            max_entries: 1000,
            cull_frequency: 3,
            max_size: MAX_SIZE,
            compression: true,
            compression_level: 6,
            key_prefix: String::new(),
            version: 1,
            chunk_ids: ChunkIdScheme::Namespaced,
        }
    }
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Sweep frequency in seconds (default: 1)
    /// - `MAX_ENTRIES` - Cull threshold (default: 1000)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `CULL_FREQUENCY` - 0 wipes on cull (default: 3)
    /// - `CACHE_READ_PREFERENCE`, `CACHE_TAG_SETS` - replica read routing
    /// - `CACHE_*` - store target, codec and chunking options
    pub fn from_env() -> Self {
        let store_defaults = StoreConfig::default();
        let cache_defaults = CacheOptions::default();

        let cache = CacheOptions {
            ttl_enabled: parse_env("CACHE_TTL_ENABLED", cache_defaults.ttl_enabled),
            default_ttl: parse_env("DEFAULT_TTL", cache_defaults.default_ttl),
            max_entries: parse_env("MAX_ENTRIES", cache_defaults.max_entries),
            cull_frequency: parse_env("CULL_FREQUENCY", cache_defaults.cull_frequency),
            max_size: parse_env("CACHE_MAX_SIZE", cache_defaults.max_size),
            compression: parse_env("CACHE_COMPRESSION", cache_defaults.compression),
            compression_level: parse_env(
                "CACHE_COMPRESSION_LEVEL",
                cache_defaults.compression_level,
            ),
            key_prefix: env::var("CACHE_KEY_PREFIX").unwrap_or(cache_defaults.key_prefix),
            version: parse_env("CACHE_VERSION", cache_defaults.version),
            chunk_ids: parse_env("CACHE_CHUNK_IDS", cache_defaults.chunk_ids),
        };

        let store = StoreConfig {
            host: env::var("CACHE_HOST").unwrap_or(store_defaults.host),
            port: parse_env("CACHE_PORT", store_defaults.port),
            database: env::var("CACHE_DATABASE").unwrap_or(store_defaults.database),
            collection: env::var("CACHE_COLLECTION").unwrap_or(store_defaults.collection),
            replica_set: env::var("CACHE_RSNAME").ok(),
            replica_hosts: env::var("CACHE_RSHOSTS")
                .map(|hosts| {
                    hosts
                        .split(',')
                        .map(str::trim)
                        .filter(|h| !h.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            user: env::var("CACHE_USER").ok(),
            password: env::var("CACHE_PASSWORD").ok(),
            server_selection_timeout_ms: parse_env(
                "CACHE_SERVER_SELECTION_TIMEOUT_MS",
                store_defaults.server_selection_timeout_ms,
            ),
            connect_timeout_ms: parse_env(
                "CACHE_CONNECT_TIMEOUT_MS",
                store_defaults.connect_timeout_ms,
            ),
            socket_timeout_ms: env::var("CACHE_SOCKET_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok()),
            read_preference: env::var("CACHE_READ_PREFERENCE").ok(),
            tag_sets: env::var("CACHE_TAG_SETS")
                .ok()
                .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
                .filter(Value::is_array),
            block_compressor: StoreConfig::block_compressor_for(cache.compression),
            max_time_ms: env::var("CACHE_MAX_TIME_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .or(store_defaults.max_time_ms),
            indexes: env::var("CACHE_INDEXES")
                .ok()
                .and_then(|raw| serde_json::from_str(&raw).ok())
                .unwrap_or_default(),
        };

        Self {
            server_port: parse_env("SERVER_PORT", 3000),
            cleanup_interval: parse_env("CLEANUP_INTERVAL", 1),
            store,
            cache,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            cleanup_interval: 1,
            store: StoreConfig::default(),
            cache: CacheOptions::default(),
        }
    }
}

/// Reads and parses an environment variable, falling back to `default`.
fn parse_env<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
