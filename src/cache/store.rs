//! Cache Store Module
//!
//! Main cache engine: stores encoded values in a document store, inline or
//! split into chunks, with TTL expiry and write-time culling.
//!
//! # Write ordering
//! The store offers no multi-document transactions, so visibility hangs on
//! the parent entry alone. New chunks are written before the parent that
//! references them, and an old parent is removed before its chunks. A reader
//! that loses a race against a delete finds missing chunks and reports a miss.
//!
//! Two writers overwriting the same key each remove the entry they read
//! before writing. One of them may remove the parent the other just wrote
//! without knowing its chunk ids. Those chunks stay orphaned until `clear`
//! and count toward `max_entries` until then.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::{
    extract_metadata, inspect, CacheEntry, CacheKey, CacheStats, ChunkEntry, ChunkManager, Clock,
    DefaultKeyCodec, Document, ExpiryPolicy, KeyCodec, Payload, SystemClock, ValueCodec,
};
use crate::config::{CacheOptions, StoreConfig};
use crate::error::{CacheError, Result};
use crate::store::{apply_indexes, Connector, DocumentStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Set,
    Add,
}

// == Cache Store ==
/// Document-store backed cache.
///
/// The store handle is established on first use and kept for the lifetime
/// of the cache. All methods take `&self`; share the cache behind an `Arc`.
pub struct CacheStore {
    options: CacheOptions,
    store_config: StoreConfig,
    connector: Option<Arc<dyn Connector>>,
    handle: OnceCell<Arc<dyn DocumentStore>>,
    codec: ValueCodec,
    chunker: ChunkManager,
    policy: ExpiryPolicy,
    keys: Arc<dyn KeyCodec>,
    clock: Arc<dyn Clock>,
    stats: Mutex<CacheStats>,
}

impl CacheStore {
    // == Constructors ==
    /// Creates a cache that connects through `connector` on first use.
    pub fn new(
        store_config: StoreConfig,
        options: CacheOptions,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self::build(store_config, options, Some(connector), OnceCell::new())
    }

    /// Creates a cache over an already connected store.
    pub fn with_store(options: CacheOptions, store: Arc<dyn DocumentStore>) -> Self {
        Self::build(
            StoreConfig::default(),
            options,
            None,
            OnceCell::with_value(store),
        )
    }

    fn build(
        store_config: StoreConfig,
        options: CacheOptions,
        connector: Option<Arc<dyn Connector>>,
        handle: OnceCell<Arc<dyn DocumentStore>>,
    ) -> Self {
        Self {
            codec: ValueCodec::from_options(&options),
            chunker: ChunkManager::new(options.max_size),
            policy: ExpiryPolicy::from_options(&options),
            keys: Arc::new(DefaultKeyCodec::new(options.key_prefix.clone())),
            clock: Arc::new(SystemClock),
            stats: Mutex::new(CacheStats::new()),
            options,
            store_config,
            connector,
            handle,
        }
    }

    /// Replaces the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the key codec.
    pub fn with_key_codec(mut self, keys: Arc<dyn KeyCodec>) -> Self {
        self.keys = keys;
        self
    }

    // == Accessors ==
    /// The options this cache was built with.
    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    // == Set ==
    /// Stores a value, replacing whatever the key held.
    ///
    /// An unchanged value only has its expiry refreshed, whatever the expiry
    /// state of the stored entry.
    pub fn set<T: Serialize + ?Sized>(
        &self,
        key: impl Into<CacheKey>,
        value: &T,
        ttl: Option<u64>,
    ) -> Result<()> {
        self.base_set(WriteMode::Set, key.into(), value, ttl)
    }

    // == Add ==
    /// Stores a value like [`CacheStore::set`].
    ///
    /// The refresh-only path applies only while the stored entry is unexpired.
    /// A live entry holding a different value is overwritten, not kept.
    pub fn add<T: Serialize + ?Sized>(
        &self,
        key: impl Into<CacheKey>,
        value: &T,
        ttl: Option<u64>,
    ) -> Result<()> {
        self.base_set(WriteMode::Add, key.into(), value, ttl)
    }

    fn base_set<T: Serialize + ?Sized>(
        &self,
        mode: WriteMode,
        key: CacheKey,
        value: &T,
        ttl: Option<u64>,
    ) -> Result<()> {
        let coll = self.collection()?;
        let id = self.make_key(&key);

        let shape = inspect(value)?;
        let canonical = serde_json::to_value(value)?;
        let encoded = self.codec.encode_value(&canonical)?;
        let extra_fields = extract_metadata::<T>(shape, &canonical);

        let now = self.clock.now();
        let expires = self
            .policy
            .expiry_for(now, ttl.unwrap_or(self.options.default_ttl));

        self.maybe_cull(coll.as_ref(), now)?;

        let existing = coll
            .find_by_id(&id, self.max_time())?
            .and_then(Document::into_entry);

        if let Some(mut old) = existing {
            let refreshable = match mode {
                WriteMode::Set => true,
                WriteMode::Add => !self.policy.is_expired(&old, now),
            };
            if refreshable
                && self.stored_payload(coll.as_ref(), &old)?.as_deref() == Some(encoded.as_slice())
            {
                if self.policy.ttl_enabled() {
                    old.expires = expires;
                    coll.insert_one(Document::Entry(old))?;
                }
                debug!(key = %id, ?mode, "Unchanged value, expiry refreshed");
                return Ok(());
            }

            debug!(key = %id, ?mode, chunks = old.chunk_ids().len(), "Replacing stored value");
            coll.remove_entries(std::slice::from_ref(&old))?;
        }

        self.insert_entry(coll.as_ref(), id, encoded, expires, extra_fields)
    }

    fn insert_entry(
        &self,
        coll: &dyn DocumentStore,
        id: String,
        encoded: Vec<u8>,
        expires: Option<DateTime<Utc>>,
        extra_fields: std::collections::BTreeMap<String, Value>,
    ) -> Result<()> {
        let entry = if !self.chunker.needs_chunking(encoded.len()) {
            debug!(key = %id, size = encoded.len(), "Storing inline entry");
            CacheEntry::inline(id, encoded)
        } else {
            let chunks: Vec<ChunkEntry> = self
                .chunker
                .split(&encoded)
                .into_iter()
                .enumerate()
                .map(|(index, fragment)| {
                    let chunk_id =
                        self.options
                            .chunk_ids
                            .chunk_id(self.keys.as_ref(), &id, index, fragment);
                    ChunkEntry::new(chunk_id, fragment.to_vec())
                })
                .collect();
            let chunk_ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();

            debug!(key = %id, size = encoded.len(), chunks = chunk_ids.len(), "Storing chunked entry");
            coll.insert_many(chunks.into_iter().map(Document::Chunk).collect())?;
            CacheEntry::chunked(id, chunk_ids)
        };

        coll.insert_one(Document::Entry(
            entry.with_expiry(expires).with_extra_fields(extra_fields),
        ))
    }

    // == Get ==
    /// Retrieves a value. Absent, expired and incomplete entries are misses.
    ///
    /// An expired entry is removed together with its chunks.
    pub fn get<T: DeserializeOwned>(&self, key: impl Into<CacheKey>) -> Result<Option<T>> {
        let coll = self.collection()?;
        let id = self.make_key(&key.into());

        let Some(entry) = coll
            .find_by_id(&id, self.max_time())?
            .and_then(Document::into_entry)
        else {
            self.stats().record_miss();
            return Ok(None);
        };

        if self.policy.is_expired(&entry, self.clock.now()) {
            debug!(key = %id, "Entry expired on read");
            coll.remove_entries(std::slice::from_ref(&entry))?;
            let mut stats = self.stats();
            stats.record_lazy_expirations(1);
            stats.record_miss();
            return Ok(None);
        }

        match self.stored_payload(coll.as_ref(), &entry)? {
            Some(payload) => {
                let value = self.codec.decode(&payload)?;
                self.stats().record_hit();
                Ok(Some(value))
            }
            None => {
                warn!(key = %id, "Entry references missing chunks");
                self.stats().record_miss();
                Ok(None)
            }
        }
    }

    /// Retrieves a value, falling back to `default` on a miss.
    pub fn get_or<T: DeserializeOwned>(&self, key: impl Into<CacheKey>, default: T) -> Result<T> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    // == Get Many ==
    /// Retrieves several values with one batch lookup.
    ///
    /// Only found, unexpired and complete entries appear in the result, keyed
    /// by the raw keys passed in. Expired entries are removed in one batch.
    pub fn get_many<T, I, K>(&self, keys: I) -> Result<HashMap<String, T>>
    where
        T: DeserializeOwned,
        I: IntoIterator<Item = K>,
        K: Into<CacheKey>,
    {
        let coll = self.collection()?;

        let mut originals: HashMap<String, String> = HashMap::new();
        for key in keys {
            let key = key.into();
            originals.insert(self.make_key(&key), key.raw);
        }
        let ids: Vec<String> = originals.keys().cloned().collect();

        let now = self.clock.now();
        let (expired, valid): (Vec<CacheEntry>, Vec<CacheEntry>) = coll
            .find_by_id_set(&ids, self.max_time())?
            .into_iter()
            .filter_map(Document::into_entry)
            .partition(|entry| self.policy.is_expired(entry, now));

        if !expired.is_empty() {
            debug!(count = expired.len(), "Removing expired entries found by batch read");
            coll.remove_entries(&expired)?;
        }

        let mut out = HashMap::with_capacity(valid.len());
        for entry in &valid {
            let Some(raw_key) = originals.get(&entry.id) else {
                continue;
            };
            match self.stored_payload(coll.as_ref(), entry)? {
                Some(payload) => {
                    out.insert(raw_key.clone(), self.codec.decode(&payload)?);
                }
                None => warn!(key = %entry.id, "Entry references missing chunks"),
            }
        }

        let mut stats = self.stats();
        stats.record_hits(out.len() as u64);
        stats.record_misses(originals.len().saturating_sub(out.len()) as u64);
        stats.record_lazy_expirations(expired.len() as u64);

        Ok(out)
    }

    // == Delete ==
    /// Removes an entry and its chunks. Returns whether an entry existed.
    pub fn delete(&self, key: impl Into<CacheKey>) -> Result<bool> {
        let coll = self.collection()?;
        let id = self.make_key(&key.into());

        match coll
            .find_by_id(&id, self.max_time())?
            .and_then(Document::into_entry)
        {
            Some(entry) => {
                coll.remove_entries(std::slice::from_ref(&entry))?;
                debug!(key = %id, "Entry deleted");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // == Has Key ==
    /// Returns true if the key holds an unexpired entry. Nothing is decoded.
    pub fn has_key(&self, key: impl Into<CacheKey>) -> Result<bool> {
        let coll = self.collection()?;
        let id = self.make_key(&key.into());

        Ok(coll
            .find_by_id(&id, self.max_time())?
            .and_then(Document::into_entry)
            .is_some_and(|entry| !self.policy.is_expired(&entry, self.clock.now())))
    }

    // == Clear ==
    /// Removes every entry and chunk.
    pub fn clear(&self) -> Result<()> {
        let removed = self.collection()?.remove_all()?;
        info!("Cache cleared: removed {} documents", removed);
        Ok(())
    }

    // == Purge Expired ==
    /// Removes every entry with `expires <= now`. Never wipes the store.
    ///
    /// Returns the number of documents removed; always 0 in archival mode.
    pub fn purge_expired(&self) -> Result<usize> {
        if !self.policy.ttl_enabled() {
            return Ok(0);
        }
        let coll = self.collection()?;
        self.policy
            .sweep_expired(coll.as_ref(), self.clock.now(), self.max_time())
    }

    // == Stats ==
    /// Returns a snapshot of the statistics with the current document count.
    pub fn stats_snapshot(&self) -> Result<CacheStats> {
        let count = self.collection()?.count()?;
        let mut snapshot = self.stats().clone();
        snapshot.set_total_entries(count);
        Ok(snapshot)
    }

    // == Length ==
    /// Number of documents in the store, chunks included.
    pub fn len(&self) -> Result<usize> {
        self.collection()?.count()
    }

    /// True when the store holds no documents.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    // == Internals ==
    /// Shared store handle, connecting and applying indexes on first use.
    fn collection(&self) -> Result<&Arc<dyn DocumentStore>> {
        self.handle.get_or_try_init(|| {
            let connector = self.connector.as_ref().ok_or_else(|| {
                CacheError::StoreUnavailable("no connector configured".to_string())
            })?;
            let store = connector.connect(&self.store_config)?;
            let created = apply_indexes(store.as_ref(), &self.store_config.indexes);
            info!(
                "Document store ready at {}:{} (collection '{}', {} indexes created)",
                self.store_config.host, self.store_config.port, self.store_config.collection, created
            );
            Ok(store)
        })
    }

    fn make_key(&self, key: &CacheKey) -> String {
        self.keys
            .make_key(&key.raw, key.version.unwrap_or(self.options.version))
    }

    fn max_time(&self) -> Option<Duration> {
        self.store_config.max_time()
    }

    fn stats(&self) -> MutexGuard<'_, CacheStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn maybe_cull(&self, coll: &dyn DocumentStore, now: DateTime<Utc>) -> Result<()> {
        let count = coll.count()?;
        if self.policy.should_cull(count) {
            debug!(count, max_entries = self.options.max_entries, "Cull triggered");
            let removed = self.policy.cull(coll, now, self.max_time())?;
            self.stats().record_culled(removed as u64);
        }
        Ok(())
    }

    /// The encoded payload of `entry`, or `None` when a chunk is missing.
    fn stored_payload<'a>(
        &self,
        coll: &dyn DocumentStore,
        entry: &'a CacheEntry,
    ) -> Result<Option<Cow<'a, [u8]>>> {
        let ids = match &entry.payload {
            Payload::Inline(data) => return Ok(Some(Cow::Borrowed(data.as_slice()))),
            Payload::Chunked(ids) => ids,
        };

        let found: HashMap<String, Vec<u8>> = coll
            .find_by_id_set(ids, self.max_time())?
            .into_iter()
            .filter_map(Document::into_chunk)
            .map(|chunk| (chunk.id, chunk.data))
            .collect();

        let mut fragments = Vec::with_capacity(ids.len());
        for id in ids {
            // Ids may repeat under content addressing, so look up rather than take.
            match found.get(id) {
                Some(data) => fragments.push(data.as_slice()),
                None => return Ok(None),
            }
        }
        Ok(Some(Cow::Owned(ChunkManager::join(fragments))))
    }
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("options", &self.options)
            .field("store_config", &self.store_config)
            .field("connected", &self.handle.get().is_some())
            .finish()
    }
}
