//! In-memory document store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::{Connector, DocumentStore, IndexDescriptor};
use crate::cache::{CacheEntry, Document};
use crate::config::StoreConfig;
use crate::error::{CacheError, Result};

// == Memory Document Store ==
/// Thread-safe document store kept in process memory.
///
/// Every call locks the whole map, so each call is atomic on its own while
/// sequences of calls are not. `set_available(false)` makes every call fail
/// with `StoreUnavailable`.
#[derive(Debug)]
pub struct MemoryDocumentStore {
    docs: RwLock<HashMap<String, Document>>,
    indexes: RwLock<Vec<IndexDescriptor>>,
    available: AtomicBool,
}

impl MemoryDocumentStore {
    /// Creates an empty, available store.
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            indexes: RwLock::new(Vec::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulates losing (or regaining) the connection.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// All stored ids, sorted.
    pub fn ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.read()?.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::StoreUnavailable(
                "document store is not reachable".to_string(),
            ))
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Document>>> {
        self.check_available()?;
        self.docs
            .read()
            .map_err(|_| CacheError::StoreUnavailable("document map lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Document>>> {
        self.check_available()?;
        self.docs
            .write()
            .map_err(|_| CacheError::StoreUnavailable("document map lock poisoned".to_string()))
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn insert_one(&self, doc: Document) -> Result<()> {
        self.write()?.insert(doc.id().to_string(), doc);
        Ok(())
    }

    fn insert_many(&self, docs: Vec<Document>) -> Result<()> {
        let mut map = self.write()?;
        for doc in docs {
            map.insert(doc.id().to_string(), doc);
        }
        Ok(())
    }

    fn find_by_id(&self, id: &str, _max_time: Option<Duration>) -> Result<Option<Document>> {
        Ok(self.read()?.get(id).cloned())
    }

    fn find_by_id_set(
        &self,
        ids: &[String],
        _max_time: Option<Duration>,
    ) -> Result<Vec<Document>> {
        let map = self.read()?;
        let mut seen = std::collections::HashSet::new();
        Ok(ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .filter_map(|id| map.get(id).cloned())
            .collect())
    }

    fn remove_by_id_set(&self, ids: &[String]) -> Result<usize> {
        let mut map = self.write()?;
        Ok(ids.iter().filter(|id| map.remove(id.as_str()).is_some()).count())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    fn find_expiring(
        &self,
        cutoff: DateTime<Utc>,
        _max_time: Option<Duration>,
    ) -> Result<Vec<CacheEntry>> {
        Ok(self
            .read()?
            .values()
            .filter_map(Document::as_entry)
            .filter(|entry| entry.expires.is_some_and(|expires| expires <= cutoff))
            .cloned()
            .collect())
    }

    fn remove_all(&self) -> Result<usize> {
        let mut map = self.write()?;
        let removed = map.len();
        map.clear();
        Ok(removed)
    }

    fn index_names(&self) -> Result<Vec<String>> {
        self.check_available()?;
        let indexes = self
            .indexes
            .read()
            .map_err(|_| CacheError::StoreUnavailable("index lock poisoned".to_string()))?;
        Ok(indexes.iter().map(|i| i.name.clone()).collect())
    }

    fn create_index(&self, index: &IndexDescriptor) -> Result<()> {
        self.check_available()?;
        let mut indexes = self
            .indexes
            .write()
            .map_err(|_| CacheError::StoreUnavailable("index lock poisoned".to_string()))?;
        if !indexes.iter().any(|i| i.name == index.name) {
            indexes.push(index.clone());
        }
        Ok(())
    }
}

// == Memory Connector ==
/// Hands out one shared [`MemoryDocumentStore`] for any connection target.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    store: Arc<MemoryDocumentStore>,
}

impl MemoryConnector {
    /// Creates a connector handing out `store`.
    pub fn new(store: Arc<MemoryDocumentStore>) -> Self {
        Self { store }
    }

    /// The store every connection resolves to.
    pub fn store(&self) -> Arc<MemoryDocumentStore> {
        Arc::clone(&self.store)
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, config: &StoreConfig) -> Result<Arc<dyn DocumentStore>> {
        self.store.check_available()?;
        info!(
            "Connected to in-memory store for {}:{}/{}.{}",
            config.host, config.port, config.database, config.collection
        );
        if let Some(replica_set) = &config.replica_set {
            debug!(replica_set = %replica_set, hosts = ?config.replica_hosts, "Replica set ignored by in-memory store");
        }
        if config.read_preference.is_some() || config.tag_sets.is_some() {
            debug!(read_preference = ?config.read_preference, tag_sets = ?config.tag_sets, "Read routing ignored by in-memory store");
        }
        debug!(block_compressor = ?config.block_compressor, "Collection options");
        if config.has_credentials() {
            debug!("Credentials ignored by in-memory store");
        }
        let store: Arc<dyn DocumentStore> = self.store.clone();
        Ok(store)
    }
}
