//! Time-bounded memo of authorization decisions.
//!
//! Entries expire lazily: an expired entry is evicted by the read that finds
//! it, and `put` sweeps expired entries once the map grows past a threshold.
//! There is no background task. The cache is advisory, so the engine must
//! answer identically with caching disabled.
//!
//! Every invalidation bumps a generation counter. A decision computed before
//! an invalidation is never stored after it: callers capture
//! [`DecisionCache::generation`] before evaluating and hand it to
//! [`DecisionCache::put_if_current`].

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Default entry lifetime: 5 minutes.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Entry count at which `put` first sweeps expired entries.
pub const DEFAULT_SWEEP_THRESHOLD: usize = 10_000;

/// Time source for expiry checks.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = saturating_add(*now, by);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// What a cached decision answers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Permission {
        principal_id: String,
        permission_id: String,
    },
    Role {
        principal_id: String,
        role_id: String,
    },
    AllPermissions {
        principal_id: String,
    },
}

impl CacheKey {
    pub fn permission(principal_id: &str, permission_id: &str) -> Self {
        Self::Permission {
            principal_id: principal_id.to_string(),
            permission_id: permission_id.to_string(),
        }
    }

    pub fn role(principal_id: &str, role_id: &str) -> Self {
        Self::Role {
            principal_id: principal_id.to_string(),
            role_id: role_id.to_string(),
        }
    }

    pub fn all_permissions(principal_id: &str) -> Self {
        Self::AllPermissions {
            principal_id: principal_id.to_string(),
        }
    }

    pub fn principal_id(&self) -> &str {
        match self {
            Self::Permission { principal_id, .. }
            | Self::Role { principal_id, .. }
            | Self::AllPermissions { principal_id } => principal_id,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permission {
                principal_id,
                permission_id,
            } => write!(f, "{}:{}", principal_id, permission_id),
            Self::Role {
                principal_id,
                role_id,
            } => write!(f, "role:{}:{}", principal_id, role_id),
            Self::AllPermissions { principal_id } => write!(f, "allPermissions:{}", principal_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedDecision {
    Allowed(bool),
    Permissions(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: CachedDecision,
    expires_at: DateTime<Utc>,
    generation: u64,
}

/// `at + by`, clamped to the latest representable instant.
fn saturating_add(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|by| at.checked_add_signed(by))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub active_entries: usize,
    pub expired_entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Concurrent decision cache keyed by [`CacheKey`].
#[derive(Debug)]
pub struct DecisionCache {
    entries: DashMap<CacheKey, Entry>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    generation: AtomicU64,
    sweep_threshold: usize,
    next_sweep_at: AtomicUsize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DecisionCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            clock,
            generation: AtomicU64::new(0),
            sweep_threshold: DEFAULT_SWEEP_THRESHOLD,
            next_sweep_at: AtomicUsize::new(DEFAULT_SWEEP_THRESHOLD),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Sets the entry count at which `put` starts sweeping expired entries.
    pub fn with_sweep_threshold(mut self, threshold: usize) -> Self {
        self.sweep_threshold = threshold.max(1);
        self.next_sweep_at = AtomicUsize::new(self.sweep_threshold);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current invalidation generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Returns the cached value if it has not expired; evicts it otherwise.
    pub fn get(&self, key: &CacheKey) -> Option<CachedDecision> {
        let now = self.clock.now();

        let expired = match self.entries.get(key) {
            Some(entry) if now < entry.expires_at => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Decision cache hit: key={}", key);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            // Re-check under the shard lock in case a fresh put raced us.
            self.entries.remove_if(key, |_, e| now >= e.expires_at);
            debug!("Decision cache entry expired: key={}", key);
        } else {
            debug!("Decision cache miss: key={}", key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn put(&self, key: CacheKey, value: CachedDecision) {
        self.put_with_ttl(key, value, self.ttl);
    }

    pub fn put_with_ttl(&self, key: CacheKey, value: CachedDecision, ttl: Duration) {
        self.insert(key, value, ttl, self.generation());
    }

    /// Stores `value` only if no invalidation happened since `generation`
    /// was read. Returns whether the entry was kept.
    pub fn put_if_current(&self, key: CacheKey, value: CachedDecision, generation: u64) -> bool {
        if self.generation() != generation {
            debug!("Discarding decision computed before invalidation: key={}", key);
            return false;
        }
        self.insert(key.clone(), value, self.ttl, generation);

        // An invalidation that bumped the generation before this point may
        // have cleared the map before the insert landed.
        if self.generation() != generation {
            self.entries.remove_if(&key, |_, e| e.generation == generation);
            return false;
        }
        true
    }

    fn insert(&self, key: CacheKey, value: CachedDecision, ttl: Duration, generation: u64) {
        let expires_at = saturating_add(self.clock.now(), ttl);
        debug!("Caching decision: key={}, ttl={:?}", key, ttl);
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at,
                generation,
            },
        );
        self.maybe_sweep();
    }

    fn maybe_sweep(&self) {
        if self.entries.len() < self.next_sweep_at.load(Ordering::Relaxed) {
            return;
        }
        self.evict_expired();
        let next = (self.entries.len() * 2).max(self.sweep_threshold);
        self.next_sweep_at.store(next, Ordering::Relaxed);
    }

    /// Removes every entry that belongs to `principal_id`.
    pub fn invalidate(&self, principal_id: &str) -> usize {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut removed = 0;
        self.entries.retain(|key, _| {
            let keep = key.principal_id() != principal_id;
            if !keep {
                removed += 1;
            }
            keep
        });
        debug!(
            "Invalidated {} cached decisions for principal {}",
            removed, principal_id
        );
        removed
    }

    pub fn invalidate_all(&self) -> usize {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let count = self.entries.len();
        self.entries.clear();
        info!("Cleared {} cached decisions", count);
        count
    }

    /// Remove expired entries from the cache
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let mut evicted = 0;
        self.entries.retain(|_, entry| {
            let keep = now < entry.expires_at;
            if !keep {
                evicted += 1;
            }
            keep
        });
        debug!("Evicted {} expired cached decisions", evicted);
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let total_entries = self.entries.len();
        let expired_entries = self
            .entries
            .iter()
            .filter(|entry| now >= entry.value().expires_at)
            .count();

        CacheStats {
            total_entries,
            active_entries: total_entries.saturating_sub(expired_entries),
            expired_entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for DecisionCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
