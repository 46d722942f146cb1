// =============================================================================
// Expiring Cache — TTL-bounded key/value store behind one coarse lock
// =============================================================================
//
// Every entry carries its own creation time and TTL.  An entry is visible only
// while `now - created_at < ttl`; expired entries read as absent and are
// physically removed by `invalidate_expired`.  Callers cannot tell "never
// written" from "expired".
//
// Writers replace whole entries, never mutate in place, so concurrent `put`s on
// the same key resolve as last-writer-wins.
//
// Key formats are part of the observable contract:
//   stock data : "{symbol}:{fast|full}:{start}:{end}"   (dates as %Y-%m-%d)
//   text       : "{function}:{sha256(normalized_text)}"
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::clock::{system_clock, Clock};
use crate::types::FetchMode;

/// General-purpose TTL (1 hour).
pub const DEFAULT_TTL_SECS: u64 = 3600;
/// TTL for cached API responses.
pub const API_TTL_SECS: u64 = 300;
/// Route-specific TTL used for market analysis results.
pub const MARKET_ROUTE_TTL_SECS: u64 = 600;
/// Route-specific TTL used for announcement verification results.
pub const ANNOUNCEMENT_ROUTE_TTL_SECS: u64 = 1800;

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: DateTime<Utc>,
    ttl: chrono::Duration,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at < self.ttl
    }
}

// ---------------------------------------------------------------------------
// ExpiringCache
// ---------------------------------------------------------------------------

/// Thread-safe expiring cache.  Shared by reference (`Arc`) between the
/// components that use it; it owns its lock.
pub struct ExpiringCache<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
}

impl<V: Clone> ExpiringCache<V> {
    /// Create a cache on the system clock.
    pub fn new(default_ttl: Duration) -> Self {
        Self::with_clock(default_ttl, system_clock())
    }

    /// Create a cache that reads time from `clock`.
    pub fn with_clock(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
            default_ttl,
        }
    }

    /// Look up a fresh value.  Expired and missing keys both return `None`.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if entry.is_fresh(now) {
            debug!(key, "cache hit");
            Some(entry.value.clone())
        } else {
            None
        }
    }

    /// Store `value` under `key` for `ttl`, replacing any previous entry.
    pub fn put(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let entry = CacheEntry {
            value,
            created_at: self.clock.now(),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
        };
        self.entries.write().insert(key.into(), entry);
    }

    /// Store with the cache's default TTL.
    pub fn put_default(&self, key: impl Into<String>, value: V) {
        self.put(key, value, self.default_ttl);
    }

    /// Return the cached value or compute, store and return a new one.
    ///
    /// The computation runs outside the lock; two racing callers may both
    /// compute, and the later `put` wins.
    pub fn get_or_insert_with<F>(&self, key: &str, ttl: Duration, compute: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(hit) = self.get(key) {
            return hit;
        }
        let value = compute();
        self.put(key, value.clone(), ttl);
        value
    }

    /// Purge expired entries.  Returns how many were removed.
    ///
    /// Entries created at or after the sweep's start instant are never
    /// removed by that sweep.
    pub fn invalidate_expired(&self) -> usize {
        let sweep_start = self.clock.now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| e.created_at >= sweep_start || e.is_fresh(sweep_start));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, remaining = entries.len(), "expired cache entries purged");
        }
        removed
    }

    /// Number of stored entries, fresh or not.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}

impl<V> std::fmt::Debug for ExpiringCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("entries", &self.entries.read().len())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Key formats
// ---------------------------------------------------------------------------

/// Lower-case and trim text so equivalent messages share a cache slot.
pub fn normalize_text(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Hex SHA-256 of the normalised text.
pub fn text_hash(text: &str) -> String {
    let digest = Sha256::digest(normalize_text(text).as_bytes());
    hex::encode(digest)
}

/// `"{function}:{hash(normalized_text)}"`
pub fn text_key(function: &str, text: &str) -> String {
    format!("{function}:{}", text_hash(text))
}

/// `"{symbol}:{fast|full}:{start}:{end}"`
pub fn stock_data_key(symbol: &str, mode: FetchMode, start: NaiveDate, end: NaiveDate) -> String {
    format!(
        "{symbol}:{mode}:{}:{}",
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d")
    )
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn manual() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap(),
        ))
    }

    #[test]
    fn found_iff_age_below_ttl() {
        let clock = manual();
        let cache: ExpiringCache<u32> =
            ExpiringCache::with_clock(Duration::from_secs(3600), clock.clone());

        for ttl in [1_i64, 60, 300, 3600] {
            for age in [0_i64, ttl - 1, ttl, ttl + 1] {
                clock.set(Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap());
                cache.put("k", 7, Duration::from_secs(ttl as u64));
                clock.advance(chrono::Duration::seconds(age));
                assert_eq!(cache.get("k").is_some(), age < ttl, "ttl={ttl} age={age}");
            }
        }
    }

    #[test]
    fn missing_and_expired_look_the_same() {
        let clock = manual();
        let cache: ExpiringCache<&'static str> =
            ExpiringCache::with_clock(Duration::from_secs(10), clock.clone());
        cache.put_default("a", "x");
        clock.advance(chrono::Duration::seconds(11));
        assert_eq!(cache.get("a"), cache.get("never-written"));
    }

    #[test]
    fn put_replaces_and_restarts_ttl() {
        let clock = manual();
        let cache: ExpiringCache<u32> =
            ExpiringCache::with_clock(Duration::from_secs(10), clock.clone());
        cache.put_default("a", 1);
        clock.advance(chrono::Duration::seconds(8));
        cache.put_default("a", 2);
        clock.advance(chrono::Duration::seconds(8));
        assert_eq!(cache.get("a"), Some(2));
    }

    #[test]
    fn invalidate_expired_only_drops_stale_entries() {
        let clock = manual();
        let cache: ExpiringCache<u32> =
            ExpiringCache::with_clock(Duration::from_secs(60), clock.clone());
        cache.put("old", 1, Duration::from_secs(30));
        cache.put("long", 2, Duration::from_secs(600));
        clock.advance(chrono::Duration::seconds(45));
        cache.put("new", 3, Duration::from_secs(30));

        assert_eq!(cache.invalidate_expired(), 1);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("long"), Some(2));
        assert_eq!(cache.get("new"), Some(3));
    }

    #[test]
    fn get_or_insert_computes_once_within_ttl() {
        let cache: ExpiringCache<u64> = ExpiringCache::new(Duration::from_secs(60));
        let mut calls = 0;
        let a = cache.get_or_insert_with("k", Duration::from_secs(60), || {
            calls += 1;
            41
        });
        let b = cache.get_or_insert_with("k", Duration::from_secs(60), || {
            calls += 1;
            99
        });
        assert_eq!((a, b, calls), (41, 41, 1));
    }

    #[test]
    fn concurrent_puts_leave_a_consistent_entry() {
        let cache: ExpiringCache<(u32, u32)> = ExpiringCache::new(Duration::from_secs(60));
        std::thread::scope(|s| {
            for t in 0..8u32 {
                let cache = &cache;
                s.spawn(move || {
                    for i in 0..200u32 {
                        cache.put_default("shared", (t, i));
                        let _ = cache.get("shared");
                    }
                });
            }
        });
        let (t, i) = cache.get("shared").unwrap();
        assert!(t < 8);
        assert_eq!(i, 199);
    }

    #[test]
    fn key_formats() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 30).unwrap();
        assert_eq!(
            stock_data_key("TCS.NS", FetchMode::Fast, start, end),
            "TCS.NS:fast:2024-01-02:2024-01-30"
        );
        assert_eq!(
            stock_data_key("AAPL", FetchMode::Full, start, end),
            "AAPL:full:2024-01-02:2024-01-30"
        );

        let k1 = text_key("sentiment", "  Buy NOW ");
        let k2 = text_key("sentiment", "buy now");
        assert_eq!(k1, k2);
        assert!(k1.starts_with("sentiment:"));
        assert_eq!(k1.len(), "sentiment:".len() + 64);
        assert_ne!(k1, text_key("credibility", "buy now"));
    }
}
