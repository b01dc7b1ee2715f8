//! Cache Module
//!
//! Document-store backed caching with compressed payloads, chunking of
//! oversized values and TTL expiration.

mod chunk;
mod codec;
mod entry;
mod expiry;
mod inspect;
mod key;
mod stats;
mod store;


// Re-export public types
pub use chunk::ChunkManager;
pub use codec::ValueCodec;
pub use entry::{extract_metadata, CacheEntry, ChunkEntry, Document, Payload, RESERVED_FIELDS};
pub use expiry::{Clock, ExpiryPolicy, ManualClock, SystemClock};
pub use inspect::{inspect, ValueShape};
pub use key::{CacheKey, ChunkIdScheme, DefaultKeyCodec, KeyCodec};
pub use stats::CacheStats;
pub use store::CacheStore;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

/// Largest payload stored inline; oversized payloads are split into chunks of this size
pub const MAX_SIZE: usize = 16_000_000;
