//! Read-through cache over a fast tier and an optional secondary tier.
//!
//! ## Lookup Order
//!
//! ```text
//! get(key) → fast tier ──hit──▶ value
//!               │ miss/expired
//!               ▼
//!            secondary tier ──hit──▶ repopulate fast tier ▶ value
//!               │ miss/expired/unreachable
//!               ▼
//!             None
//! ```
//!
//! Expiry is checked lazily on read; nothing sweeps in the background.
//! Secondary-tier failures are logged and treated as "tier skipped": the
//! worst a caller ever sees is a miss.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::backend::CacheBackend;
use crate::clock::{Clock, SystemClock};
use crate::config::CacheSettings;
use crate::entry::CacheEntry;
use crate::error::{CacheError, TierError, TierResult};
use crate::key::{Namespace, validate_key};
use crate::metrics;
use crate::tier::{Lookup, SecondaryTier};

const FAST_TIER: &str = "local";

/// Cache statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub mode: String,
    pub namespace: String,
    /// Entries held by the fast tier, stale ones included.
    pub local_entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Calculate hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// State of the secondary tier as seen from this process.
#[derive(Debug, Clone, Serialize)]
pub struct TierInfo {
    /// `None` when there is no secondary tier.
    pub kind: Option<&'static str>,
    pub connected: bool,
    pub entries: Option<usize>,
}

struct Inner {
    backend: CacheBackend,
    namespace: Namespace,
    default_ttl: Duration,
    tier_timeout: Duration,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Handle to a tiered cache. Cloning is cheap and shares the same tiers.
#[derive(Clone)]
pub struct TieredCache {
    inner: Arc<Inner>,
}

impl TieredCache {
    pub fn new(backend: CacheBackend, settings: &CacheSettings) -> Self {
        Self::with_clock(backend, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(backend: CacheBackend, settings: &CacheSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                namespace: Namespace::new(settings.namespace.clone()),
                default_ttl: settings.default_ttl(),
                tier_timeout: settings.tier_timeout(),
                clock,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
            }),
        }
    }

    pub fn backend(&self) -> &CacheBackend {
        &self.inner.backend
    }

    pub fn namespace(&self) -> &Namespace {
        &self.inner.namespace
    }

    pub fn default_ttl(&self) -> Duration {
        self.inner.default_ttl
    }

    /// Get a value.
    ///
    /// Returns `Ok(None)` on a miss, including when the secondary tier is
    /// unreachable or a stored payload cannot be decoded as `T`. Only an
    /// empty key is an error.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        validate_key(key)?;
        let full_key = self.inner.namespace.qualify(key);

        let Some((entry, tier)) = self.lookup(&full_key).await else {
            self.record_miss();
            return Ok(None);
        };

        match T::deserialize(&*entry.value) {
            Ok(value) => {
                self.record_hit(tier);
                Ok(Some(value))
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cached value has unexpected shape");
                self.record_miss();
                Ok(None)
            }
        }
    }

    /// Store a value for `ttl` (`None` or zero uses the default TTL).
    ///
    /// Returns `Ok(false)` if the value could not be encoded and nothing was
    /// written. A failed secondary-tier write does not fail the call.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError> {
        validate_key(key)?;
        let full_key = self.inner.namespace.qualify(key);
        let ttl = self.effective_ttl(ttl);

        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to serialize value for cache");
                return Ok(false);
            }
        };

        let entry = CacheEntry::new(full_key.clone(), value, self.inner.clock.now(), ttl);
        self.inner.backend.local().insert(full_key.clone(), entry.clone());

        if let Some(tier) = self.inner.backend.secondary() {
            let stored = self
                .guarded("set", tier.kind().label(), async {
                    let payload = entry.encode()?;
                    tier.store(&full_key, &payload, ttl).await
                })
                .await;
            if stored.is_some() {
                tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "cache set (L1+L2)");
            }
        } else {
            tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "cache set (L1)");
        }
        Ok(true)
    }

    /// Remove a key from every tier. Removing a missing key succeeds.
    pub async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        validate_key(key)?;
        let full_key = self.inner.namespace.qualify(key);

        self.inner.backend.local().remove(&full_key);
        if let Some(tier) = self.inner.backend.secondary() {
            self.guarded("delete", tier.kind().label(), tier.remove(&full_key))
                .await;
        }
        tracing::debug!(key = %key, "cache invalidated");
        Ok(true)
    }

    /// Remove every entry whose key starts with `prefix`, or the whole
    /// namespace when `prefix` is `None`. Keys outside the namespace are
    /// never touched.
    pub async fn clear(&self, prefix: Option<&str>) -> bool {
        let full_prefix = self.inner.namespace.qualify(prefix.unwrap_or(""));

        let local_removed = self.inner.backend.local().remove_prefix(&full_prefix);
        let secondary_removed = match self.inner.backend.secondary() {
            Some(tier) => {
                self.guarded("clear", tier.kind().label(), tier.remove_prefix(&full_prefix))
                    .await
            }
            None => None,
        };

        tracing::info!(
            prefix = %full_prefix,
            local_removed,
            secondary_removed = ?secondary_removed,
            "cache cleared"
        );
        true
    }

    /// Read through to the system of record.
    ///
    /// On a miss, `load` runs, its result is cached for `ttl` and returned.
    /// Errors from `load` are returned as-is and nothing is cached.
    pub async fn get_or_load<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        load: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get::<T>(key).await? {
            return Ok(hit);
        }
        let value = load().await?;
        self.set(key, &value, ttl).await?;
        Ok(value)
    }

    pub fn stats(&self) -> CacheStats {
        let local_entries = self.inner.backend.local().len();
        metrics::set_cache_entries(FAST_TIER, local_entries);
        CacheStats {
            mode: self.inner.backend.mode().to_string(),
            namespace: self.inner.namespace.as_str().to_string(),
            local_entries,
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
        }
    }

    /// Probe the secondary tier (for health checks).
    pub async fn secondary_info(&self) -> TierInfo {
        let Some(tier) = self.inner.backend.secondary() else {
            return TierInfo {
                kind: None,
                connected: false,
                entries: None,
            };
        };
        let label = tier.kind().label();
        let connected = self.guarded("ping", label, tier.ping()).await.is_some();
        let entries = if connected {
            self.guarded("count", label, tier.entry_count()).await
        } else {
            None
        };
        if let Some(count) = entries {
            metrics::set_cache_entries(label, count);
        }
        TierInfo {
            kind: Some(label),
            connected,
            entries,
        }
    }

    /// Check if the secondary tier answers.
    pub async fn is_secondary_available(&self) -> bool {
        match self.inner.backend.secondary() {
            Some(tier) => self
                .guarded("ping", tier.kind().label(), tier.ping())
                .await
                .is_some(),
            None => false,
        }
    }

    /// Release secondary-tier connections. The fast tier keeps working.
    pub fn shutdown(&self) {
        if let Some(tier) = self.inner.backend.secondary() {
            tier.close();
            tracing::info!(tier = tier.kind().label(), "cache tier closed");
        }
    }

    fn effective_ttl(&self, ttl: Option<Duration>) -> Duration {
        match ttl {
            Some(ttl) if !ttl.is_zero() => ttl,
            _ => self.inner.default_ttl,
        }
    }

    /// Fast tier first, then the secondary tier with write-back. Returns the
    /// entry with the label of the tier that served it.
    async fn lookup(&self, full_key: &str) -> Option<(CacheEntry, &'static str)> {
        let local = self.inner.backend.local();
        let now = self.inner.clock.now();

        match local.lookup(full_key, now) {
            Lookup::Hit(entry) => {
                tracing::debug!(key = %full_key, "cache hit (L1)");
                return Some((entry, FAST_TIER));
            }
            Lookup::Expired => {
                tracing::debug!(key = %full_key, "cache entry expired (L1)");
            }
            Lookup::Missing => {}
        }

        let tier = self.inner.backend.secondary()?;
        let entry = self.load_secondary(tier.as_ref(), full_key).await?;

        let now = self.inner.clock.now();
        if entry.is_expired(now) {
            tracing::debug!(key = %full_key, "cache entry expired (L2)");
            self.guarded("delete", tier.kind().label(), tier.remove(full_key))
                .await;
            return None;
        }

        tracing::debug!(
            key = %full_key,
            tier = tier.kind().label(),
            remaining_secs = entry.remaining(now).as_secs(),
            "cache hit (L2)"
        );
        local.insert(full_key.to_string(), entry.clone());
        Some((entry, tier.kind().label()))
    }

    async fn load_secondary(&self, tier: &dyn SecondaryTier, full_key: &str) -> Option<CacheEntry> {
        let label = tier.kind().label();
        let payload = self.guarded("get", label, tier.load(full_key)).await??;

        match CacheEntry::decode(full_key, &payload) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(key = %full_key, error = %e, "discarding undecodable cache entry");
                metrics::record_tier_error("get", e.kind());
                self.guarded("delete", label, tier.remove(full_key)).await;
                None
            }
        }
    }

    /// Run a secondary-tier call under the tier timeout, collapsing any
    /// failure into `None` after logging it.
    async fn guarded<T>(
        &self,
        op: &'static str,
        tier: &'static str,
        call: impl Future<Output = TierResult<T>>,
    ) -> Option<T> {
        let timeout = self.inner.tier_timeout;
        let result = match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(TierError::Timeout(
                u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            )),
        };
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(op, tier, error = %e, "cache tier operation failed, skipping tier");
                metrics::record_tier_error(op, e.kind());
                None
            }
        }
    }

    fn record_hit(&self, tier: &str) {
        self.inner.hits.fetch_add(1, Ordering::Relaxed);
        metrics::record_cache_hit(tier);
    }

    fn record_miss(&self) {
        self.inner.misses.fetch_add(1, Ordering::Relaxed);
        metrics::record_cache_miss();
    }
}

impl std::fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("mode", &self.inner.backend.mode())
            .field("namespace", &self.inner.namespace.as_str())
            .field("default_ttl", &self.inner.default_ttl)
            .finish()
    }
}
