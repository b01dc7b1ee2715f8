//! Expiry Module
//!
//! Expiry timestamps, read-time (lazy) expiry and write-time (active) culling.
//!
//! The two checks use different boundaries on purpose: a read treats an
//! entry as expired only once `expires < now`, while a cull removes every
//! entry with `expires <= now`.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};

use crate::cache::CacheEntry;
use crate::config::CacheOptions;
use crate::error::Result;
use crate::store::DocumentStore;

/// Longest TTL honoured; larger values are clamped (100 years).
const MAX_TTL_SECONDS: u64 = 100 * 365 * 24 * 60 * 60;

// == Clock ==
/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    // == Constructor ==
    /// Creates a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    // == Set ==
    /// Moves the clock to `now`, backwards included.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    // == Advance ==
    /// Moves the clock forward by `by`, saturating at the largest time.
    pub fn advance(&self, by: Duration) {
        let delta = TimeDelta::from_std(by).unwrap_or(TimeDelta::MAX);
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// == Expiry Policy ==
#[derive(Debug, Clone)]
pub struct ExpiryPolicy {
    ttl_enabled: bool,
    max_entries: usize,
    cull_frequency: u32,
}

impl ExpiryPolicy {
    // == Constructor ==
    /// Creates a policy; `ttl_enabled = false` selects archival mode.
    pub fn new(ttl_enabled: bool, max_entries: usize, cull_frequency: u32) -> Self {
        Self {
            ttl_enabled,
            max_entries,
            cull_frequency,
        }
    }

    /// Creates a policy from the cache options.
    pub fn from_options(options: &CacheOptions) -> Self {
        Self::new(
            options.ttl_enabled,
            options.max_entries,
            options.cull_frequency,
        )
    }

    // == TTL Mode ==
    /// False in archival mode, where nothing ever expires.
    pub fn ttl_enabled(&self) -> bool {
        self.ttl_enabled
    }

    // == Compute Expiry ==
    /// `now + ttl_seconds`, saturating at the largest representable time.
    pub fn compute_expiry(now: DateTime<Utc>, ttl_seconds: u64) -> DateTime<Utc> {
        let seconds = ttl_seconds.min(MAX_TTL_SECONDS) as i64;
        now.checked_add_signed(TimeDelta::seconds(seconds))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Expiry to write for a new entry; `None` in archival mode.
    pub fn expiry_for(&self, now: DateTime<Utc>, ttl_seconds: u64) -> Option<DateTime<Utc>> {
        self.ttl_enabled
            .then(|| Self::compute_expiry(now, ttl_seconds))
    }

    // == Is Expired ==
    /// Read-time check: expired only when `expires < now`.
    ///
    /// Entries without expiry, and every entry in archival mode, never expire.
    pub fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        self.ttl_enabled && entry.expires.is_some_and(|expires| expires < now)
    }

    // == Should Cull ==
    /// Write-time trigger: true once the store holds more than `max_entries` documents.
    pub fn should_cull(&self, current_count: usize) -> bool {
        current_count > self.max_entries
    }

    // == Cull ==
    /// Write-time cull. A cull frequency of 0 wipes the store, otherwise every
    /// entry with `expires <= now` is removed with its chunks.
    ///
    /// Returns the number of documents removed.
    pub fn cull(
        &self,
        store: &dyn DocumentStore,
        now: DateTime<Utc>,
        max_time: Option<Duration>,
    ) -> Result<usize> {
        if self.cull_frequency == 0 {
            let removed = store.remove_all()?;
            info!("Cull wiped the store: removed {} documents", removed);
            return Ok(removed);
        }
        self.sweep_expired(store, now, max_time)
    }

    /// Removes every entry with `expires <= now` together with its chunks.
    ///
    /// Returns the number of documents removed.
    pub fn sweep_expired(
        &self,
        store: &dyn DocumentStore,
        now: DateTime<Utc>,
        max_time: Option<Duration>,
    ) -> Result<usize> {
        let expired = store.find_expiring(now, max_time)?;
        if expired.is_empty() {
            debug!("Sweep found no expired entries");
            return Ok(0);
        }

        let removed = expired.len() + expired.iter().map(|e| e.chunk_ids().len()).sum::<usize>();
        store.remove_entries(&expired)?;
        info!(
            "Swept {} expired entries ({} documents)",
            expired.len(),
            removed
        );
        Ok(removed)
    }
}
