//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::Value;

use crate::cache::{CacheKey, CacheStore};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    ClearResponse, DeleteResponse, GetManyRequest, GetManyResponse, GetResponse, HasKeyResponse,
    HealthResponse, SetRequest, SetResponse, StatsResponse, VersionQuery,
};
use crate::store::{Connector, MemoryConnector};

/// Application state shared across all handlers.
///
/// The cache synchronizes internally, so it is shared through a plain `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<CacheStore>,
}

impl AppState {
    /// Creates a new AppState with the given cache store.
    pub fn new(cache: CacheStore) -> Self {
        Self {
            cache: Arc::new(cache),
        }
    }

    /// Creates a new AppState from configuration, backed by an in-memory store.
    pub fn from_config(config: &Config) -> Self {
        let connector: Arc<dyn Connector> = Arc::new(MemoryConnector::default());
        Self::from_config_with(config, connector)
    }

    /// Creates a new AppState from configuration and an explicit connector.
    pub fn from_config_with(config: &Config, connector: Arc<dyn Connector>) -> Self {
        Self::new(CacheStore::new(
            config.store.clone(),
            config.cache.clone(),
            connector,
        ))
    }
}

/// Runs a cache call on the blocking pool. Store round trips and payload
/// compression are synchronous and must stay off the async workers.
async fn run_blocking<F, R>(cache: &Arc<CacheStore>, op: F) -> Result<R>
where
    F: FnOnce(&CacheStore) -> Result<R> + Send + 'static,
    R: Send + 'static,
{
    let cache = cache.clone();
    tokio::task::spawn_blocking(move || op(&cache))
        .await
        .map_err(|e| CacheError::Internal(format!("cache task failed: {}", e)))?
}

fn versioned(key: String, query: &VersionQuery) -> CacheKey {
    CacheKey {
        raw: key,
        version: query.version,
    }
}

/// Handler for PUT /set
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let key = req.key.clone();
    run_blocking(&state.cache, move |cache| {
        cache.set(req.cache_key(), &req.value, req.ttl)
    })
    .await?;

    Ok(Json(SetResponse::new(key)))
}

/// Handler for PUT /add
pub async fn add_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let key = req.key.clone();
    run_blocking(&state.cache, move |cache| {
        cache.add(req.cache_key(), &req.value, req.ttl)
    })
    .await?;

    Ok(Json(SetResponse::added(key)))
}

/// Handler for GET /get/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<VersionQuery>,
) -> Result<Json<GetResponse>> {
    let cache_key = versioned(key.clone(), &query);
    let value = run_blocking(&state.cache, move |cache| cache.get::<Value>(cache_key))
        .await?
        .ok_or_else(|| CacheError::NotFound(key.clone()))?;

    Ok(Json(GetResponse::new(key, value)))
}

/// Handler for POST /get_many
pub async fn get_many_handler(
    State(state): State<AppState>,
    Json(req): Json<GetManyRequest>,
) -> Result<Json<GetManyResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let keys = req.cache_keys();
    let values = run_blocking(&state.cache, move |cache| cache.get_many::<Value, _, _>(keys))
        .await?;

    Ok(Json(GetManyResponse { values }))
}

/// Handler for DELETE /del/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<VersionQuery>,
) -> Result<Json<DeleteResponse>> {
    let cache_key = versioned(key.clone(), &query);
    if !run_blocking(&state.cache, move |cache| cache.delete(cache_key)).await? {
        return Err(CacheError::NotFound(key));
    }

    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for GET /has/:key
pub async fn has_key_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<VersionQuery>,
) -> Result<Json<HasKeyResponse>> {
    let cache_key = versioned(key.clone(), &query);
    let exists = run_blocking(&state.cache, move |cache| cache.has_key(cache_key)).await?;

    Ok(Json(HasKeyResponse { key, exists }))
}

/// Handler for DELETE /clear
pub async fn clear_handler(State(state): State<AppState>) -> Result<Json<ClearResponse>> {
    run_blocking(&state.cache, |cache| cache.clear()).await?;

    Ok(Json(ClearResponse::new()))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let stats = run_blocking(&state.cache, |cache| cache.stats_snapshot()).await?;

    Ok(Json(StatsResponse::from(stats)))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheEntry, Document};
    use crate::config::CacheOptions;
    use crate::store::{DocumentStore, IndexDescriptor, MemoryDocumentStore};
    use serde_json::json;

    fn state() -> AppState {
        AppState::new(CacheStore::with_store(
            CacheOptions::default(),
            Arc::new(MemoryDocumentStore::new()),
        ))
    }

    fn set_request(key: &str, value: Value) -> SetRequest {
        SetRequest {
            key: key.to_string(),
            value,
            ttl: None,
            version: None,
        }
    }

    #[tokio::test]
    async fn test_set_and_get_handler() {
        let state = state();

        let req = set_request("test_key", json!({"name": "aspirin"}));
        let result = set_handler(State(state.clone()), Json(req)).await;
        assert!(result.is_ok());

        let result = get_handler(
            State(state.clone()),
            Path("test_key".to_string()),
            Query(VersionQuery::default()),
        )
        .await;
        let response = result.unwrap();
        assert_eq!(response.value, json!({"name": "aspirin"}));
    }

    #[tokio::test]
    async fn test_get_nonexistent_key() {
        let result = get_handler(
            State(state()),
            Path("nonexistent".to_string()),
            Query(VersionQuery::default()),
        )
        .await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_versioned_keys_are_separate() {
        let state = state();
        let mut req = set_request("k", json!(2));
        req.version = Some(2);
        set_handler(State(state.clone()), Json(req)).await.unwrap();

        let v1 = get_handler(
            State(state.clone()),
            Path("k".to_string()),
            Query(VersionQuery::default()),
        )
        .await;
        assert!(v1.is_err());

        let v2 = get_handler(
            State(state),
            Path("k".to_string()),
            Query(VersionQuery { version: Some(2) }),
        )
        .await
        .unwrap();
        assert_eq!(v2.value, json!(2));
    }

    #[tokio::test]
    async fn test_delete_handler() {
        let state = state();
        set_handler(State(state.clone()), Json(set_request("to_delete", json!(1))))
            .await
            .unwrap();

        let result = delete_handler(
            State(state.clone()),
            Path("to_delete".to_string()),
            Query(VersionQuery::default()),
        )
        .await;
        assert!(result.is_ok());

        let result = delete_handler(
            State(state),
            Path("to_delete".to_string()),
            Query(VersionQuery::default()),
        )
        .await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_get_many_and_has_key_handlers() {
        let state = state();
        add_handler(State(state.clone()), Json(set_request("a", json!("x"))))
            .await
            .unwrap();

        let req = GetManyRequest {
            keys: vec!["a".to_string(), "b".to_string()],
            version: None,
        };
        let response = get_many_handler(State(state.clone()), Json(req))
            .await
            .unwrap();
        assert_eq!(response.values.len(), 1);
        assert_eq!(response.values["a"], json!("x"));

        let has = has_key_handler(
            State(state),
            Path("b".to_string()),
            Query(VersionQuery::default()),
        )
        .await
        .unwrap();
        assert!(!has.exists);
    }

    #[tokio::test]
    async fn test_clear_and_stats_handlers() {
        let state = state();
        set_handler(State(state.clone()), Json(set_request("a", json!(1))))
            .await
            .unwrap();

        let stats = stats_handler(State(state.clone())).await.unwrap();
        assert_eq!(stats.total_entries, 1);

        clear_handler(State(state.clone())).await.unwrap();
        let stats = stats_handler(State(state)).await.unwrap();
        assert_eq!(stats.total_entries, 0);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "healthy");
    }

    #[tokio::test]
    async fn test_set_invalid_request() {
        let result = set_handler(State(state()), Json(set_request("", json!(1)))).await;
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }

    /// Store whose lookups block the calling thread, or panic.
    struct StallingStore {
        inner: MemoryDocumentStore,
        stall: std::time::Duration,
        panic_on_read: bool,
    }

    impl DocumentStore for StallingStore {
        fn insert_one(&self, doc: Document) -> Result<()> {
            self.inner.insert_one(doc)
        }

        fn insert_many(&self, docs: Vec<Document>) -> Result<()> {
            self.inner.insert_many(docs)
        }

        fn find_by_id(
            &self,
            id: &str,
            max_time: Option<std::time::Duration>,
        ) -> Result<Option<Document>> {
            if self.panic_on_read {
                panic!("store crashed");
            }
            std::thread::sleep(self.stall);
            self.inner.find_by_id(id, max_time)
        }

        fn find_by_id_set(
            &self,
            ids: &[String],
            max_time: Option<std::time::Duration>,
        ) -> Result<Vec<Document>> {
            self.inner.find_by_id_set(ids, max_time)
        }

        fn remove_by_id_set(&self, ids: &[String]) -> Result<usize> {
            self.inner.remove_by_id_set(ids)
        }

        fn count(&self) -> Result<usize> {
            self.inner.count()
        }

        fn find_expiring(
            &self,
            cutoff: chrono::DateTime<chrono::Utc>,
            max_time: Option<std::time::Duration>,
        ) -> Result<Vec<CacheEntry>> {
            self.inner.find_expiring(cutoff, max_time)
        }

        fn remove_all(&self) -> Result<usize> {
            self.inner.remove_all()
        }

        fn index_names(&self) -> Result<Vec<String>> {
            self.inner.index_names()
        }

        fn create_index(&self, index: &IndexDescriptor) -> Result<()> {
            self.inner.create_index(index)
        }
    }

    fn stalling_state(stall: std::time::Duration, panic_on_read: bool) -> AppState {
        AppState::new(CacheStore::with_store(
            CacheOptions::default(),
            Arc::new(StallingStore {
                inner: MemoryDocumentStore::new(),
                stall,
                panic_on_read,
            }),
        ))
    }

    // Single-threaded runtime: a store call made on the worker would hold up the timer.
    #[tokio::test]
    async fn test_store_calls_do_not_block_the_runtime() {
        let state = stalling_state(std::time::Duration::from_millis(400), false);
        let started = std::time::Instant::now();

        let (result, timer_elapsed) = tokio::join!(
            get_handler(
                State(state),
                Path("slow".to_string()),
                Query(VersionQuery::default()),
            ),
            async {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                started.elapsed()
            }
        );

        assert!(matches!(result, Err(CacheError::NotFound(_))));
        assert!(
            timer_elapsed < std::time::Duration::from_millis(300),
            "timer delayed by a blocking store call: {:?}",
            timer_elapsed
        );
    }

    #[tokio::test]
    async fn test_panicking_store_maps_to_internal_error() {
        let state = stalling_state(std::time::Duration::ZERO, true);

        let result = has_key_handler(
            State(state),
            Path("k".to_string()),
            Query(VersionQuery::default()),
        )
        .await;

        assert!(matches!(result, Err(CacheError::Internal(_))));
    }
}
