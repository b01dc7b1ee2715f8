//! Chunk Cache - A document-store backed cache
//!
//! Stores serializable values as documents, compressing them and splitting
//! oversized payloads into chunk documents. Entries expire lazily on read and
//! are culled in bulk on write once the store grows past its limit.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod store;
pub mod tasks;

pub use api::AppState;
pub use cache::CacheStore;
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::spawn_cleanup_task;
