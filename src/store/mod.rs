//! Document Store Module
//!
//! The document database the cache is built on. Stores guarantee atomicity
//! per document only; nothing here spans several documents.

mod memory;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{CacheEntry, Document};
use crate::config::StoreConfig;
use crate::error::Result;

pub use memory::{MemoryConnector, MemoryDocumentStore};

// == Index Descriptor ==
/// A named index definition applied when the store is first connected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub definition: Value,
}

// == Document Store ==
/// Key-addressed document database.
///
/// `max_time` is an execution time hint forwarded to the server untouched.
pub trait DocumentStore: Send + Sync {
    /// Inserts a document, replacing any document with the same id.
    fn insert_one(&self, doc: Document) -> Result<()>;

    /// Inserts documents one by one; each replaces any document with its id.
    fn insert_many(&self, docs: Vec<Document>) -> Result<()>;

    fn find_by_id(&self, id: &str, max_time: Option<Duration>) -> Result<Option<Document>>;

    /// Returns the documents found among `ids`, in no particular order.
    fn find_by_id_set(&self, ids: &[String], max_time: Option<Duration>)
        -> Result<Vec<Document>>;

    /// Removes the listed ids, returning how many existed.
    fn remove_by_id_set(&self, ids: &[String]) -> Result<usize>;

    /// Number of documents, chunks included.
    fn count(&self) -> Result<usize>;

    /// Cache entries whose expiry is at or before `cutoff`.
    fn find_expiring(
        &self,
        cutoff: DateTime<Utc>,
        max_time: Option<Duration>,
    ) -> Result<Vec<CacheEntry>>;

    /// Removes every document, returning how many there were.
    fn remove_all(&self) -> Result<usize>;

    fn index_names(&self) -> Result<Vec<String>>;

    fn create_index(&self, index: &IndexDescriptor) -> Result<()>;

    /// Removes entries and the chunks they reference.
    ///
    /// Parents go first so that any parent still visible has all its chunks.
    fn remove_entries(&self, entries: &[CacheEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let parents: Vec<String> = entries.iter().map(|e| e.id.clone()).collect();
        self.remove_by_id_set(&parents)?;

        let chunks: Vec<String> = entries
            .iter()
            .flat_map(|e| e.chunk_ids().iter().cloned())
            .collect();
        if !chunks.is_empty() {
            self.remove_by_id_set(&chunks)?;
        }
        Ok(())
    }
}

// == Connector ==
/// Resolves a connection target into a store handle.
pub trait Connector: Send + Sync {
    fn connect(&self, config: &StoreConfig) -> Result<Arc<dyn DocumentStore>>;
}

// == Index Application ==
/// Creates every configured index whose name is not present yet.
///
/// Never fails: an unreadable index list counts as empty and creation errors
/// are logged, assuming an existing index of that name is compatible.
pub fn apply_indexes(store: &dyn DocumentStore, indexes: &[IndexDescriptor]) -> usize {
    if indexes.is_empty() {
        return 0;
    }

    let existing = store.index_names().unwrap_or_else(|e| {
        warn!("Could not list indexes: {}", e);
        Vec::new()
    });

    let mut created = 0;
    for index in indexes {
        if existing.iter().any(|name| name == &index.name) {
            debug!(index = %index.name, "Index already present");
            continue;
        }
        match store.create_index(index) {
            Ok(()) => {
                debug!(index = %index.name, "Index created");
                created += 1;
            }
            Err(e) => warn!(index = %index.name, "Index creation failed: {}", e),
        }
    }
    created
}
