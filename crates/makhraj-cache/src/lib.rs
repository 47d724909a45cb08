//! Two-tier read-through cache for the makhraj platform.
//!
//! ## Architecture
//!
//! - **Fast tier (DashMap)**: in-process, microsecond latency, per instance
//! - **Durable tier (Redis)**: network, millisecond latency, shared across instances
//! - **Local persistent tier (files)**: replaces the durable tier on hosts that cannot reach it
//!
//! ```text
//! get → fast tier → secondary tier → caller falls back to the system of record
//! ```
//!
//! ## Graceful Degradation
//!
//! If Redis is unavailable or disabled, every operation keeps working on the
//! fast tier alone. Tier failures never reach the caller.
//!
//! ```no_run
//! use makhraj_cache::{AppConfig, HostCapability, TieredCache, create_cache_backend};
//!
//! # async fn demo() -> Result<(), makhraj_cache::CacheError> {
//! let config = AppConfig::default();
//! let backend = create_cache_backend(&config, HostCapability::Server).await;
//! let cache = TieredCache::new(backend, &config.cache);
//!
//! cache.set("teacher_tasks", &vec!["X"], None).await?;
//! let tasks: Option<Vec<String>> = cache.get("teacher_tasks").await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod cache;
pub mod clock;
pub mod config;
pub mod entry;
pub mod error;
pub mod key;
pub mod metrics;
pub mod observability;
pub mod pubsub;
pub mod tier;

pub use backend::{CacheBackend, HostCapability, create_cache_backend};
pub use cache::{CacheStats, TierInfo, TieredCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, CacheSettings, LocalStoreConfig, LoggingConfig, RedisConfig};
pub use entry::CacheEntry;
pub use error::{CacheError, TierError, TierResult};
pub use key::{CacheKey, Namespace};
pub use observability::{apply_logging_level, init_tracing, init_tracing_with_level};
pub use tier::{FileTier, MemoryTier, RedisTier, SecondaryTier, TierKind};

/// Build a cache from configuration in one step.
pub async fn connect(config: &AppConfig, capability: HostCapability) -> TieredCache {
    let backend = create_cache_backend(config, capability).await;
    tracing::info!(mode = backend.mode(), namespace = %config.cache.namespace, "cache ready");
    TieredCache::new(backend, &config.cache)
}
