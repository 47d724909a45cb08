//! Tier layout selection.
//!
//! ## Cache Modes
//!
//! - **LocalTierOnly**: fast tier, optionally backed by a local persistent store
//! - **LocalTierPlusDurable**: fast tier (L1) + shared durable store (L2)
//!
//! The layout is chosen once, from configuration and the [`HostCapability`]
//! the host declares. It never changes afterwards.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::pubsub::InvalidationListener;
use crate::tier::{FileTier, MemoryTier, RedisTier, SecondaryTier};

/// What the host process can reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostCapability {
    /// Server process: may talk to the durable tier.
    #[default]
    Server,
    /// Client-like process without durable access; uses local persistence instead.
    Client,
}

/// The tiers a cache reads through, in order.
#[derive(Clone)]
pub enum CacheBackend {
    LocalTierOnly {
        local: Arc<MemoryTier>,
        persistent: Option<Arc<dyn SecondaryTier>>,
    },
    LocalTierPlusDurable {
        local: Arc<MemoryTier>,
        durable: Arc<dyn SecondaryTier>,
    },
}

impl CacheBackend {
    /// Fast tier only.
    pub fn new_local() -> Self {
        CacheBackend::LocalTierOnly {
            local: Arc::new(MemoryTier::new()),
            persistent: None,
        }
    }

    /// Fast tier backed by a local persistent store.
    pub fn new_local_persistent(persistent: Arc<dyn SecondaryTier>) -> Self {
        CacheBackend::LocalTierOnly {
            local: Arc::new(MemoryTier::new()),
            persistent: Some(persistent),
        }
    }

    /// Fast tier backed by a shared durable store.
    pub fn new_durable(durable: Arc<dyn SecondaryTier>) -> Self {
        CacheBackend::LocalTierPlusDurable {
            local: Arc::new(MemoryTier::new()),
            durable,
        }
    }

    pub fn local(&self) -> &Arc<MemoryTier> {
        match self {
            CacheBackend::LocalTierOnly { local, .. } => local,
            CacheBackend::LocalTierPlusDurable { local, .. } => local,
        }
    }

    /// The tier consulted after a fast-tier miss, if any.
    pub fn secondary(&self) -> Option<&Arc<dyn SecondaryTier>> {
        match self {
            CacheBackend::LocalTierOnly { persistent, .. } => persistent.as_ref(),
            CacheBackend::LocalTierPlusDurable { durable, .. } => Some(durable),
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            CacheBackend::LocalTierOnly {
                persistent: None, ..
            } => "local",
            CacheBackend::LocalTierOnly { .. } => "local+persistent",
            CacheBackend::LocalTierPlusDurable { .. } => "local+durable",
        }
    }
}

/// Create a cache backend based on configuration.
///
/// ## Graceful Degradation
///
/// - `Server` with Redis disabled, or with a pool that cannot be built
///   (e.g. malformed URL): fast tier only.
/// - `Server` with Redis enabled but unreachable right now: the durable tier
///   is kept. Connections are made per call, so the cache starts using Redis
///   as soon as it answers.
/// - `Client`: durable tier skipped; the local store is used when enabled
///   and its directory can be created.
pub async fn create_cache_backend(config: &AppConfig, capability: HostCapability) -> CacheBackend {
    match capability {
        HostCapability::Client => create_client_backend(config).await,
        HostCapability::Server => create_server_backend(config).await,
    }
}

async fn create_client_backend(config: &AppConfig) -> CacheBackend {
    if !config.local_store.enabled {
        tracing::info!("Client host without local store, using memory cache only");
        return CacheBackend::new_local();
    }

    match FileTier::open(&config.local_store.path).await {
        Ok(tier) => {
            tracing::info!(path = %config.local_store.path.display(), "Using local persistent cache store");
            CacheBackend::new_local_persistent(Arc::new(tier))
        }
        Err(e) => {
            tracing::warn!(
                path = %config.local_store.path.display(),
                error = %e,
                "Failed to open local cache store. Falling back to memory cache."
            );
            CacheBackend::new_local()
        }
    }
}

async fn create_server_backend(config: &AppConfig) -> CacheBackend {
    let redis = &config.redis;
    if !redis.enabled {
        tracing::info!("Redis disabled, using local cache only");
        return CacheBackend::new_local();
    }

    let url = redis.connection_url();
    tracing::info!(target_url = %redis.redacted_target(), "Connecting to Redis");

    let mut redis_config = deadpool_redis::Config::from_url(url.clone());
    let pool_config = redis_config
        .pool
        .get_or_insert_with(|| deadpool_redis::PoolConfig::new(redis.pool_size));
    pool_config.max_size = redis.pool_size;
    pool_config.timeouts.wait = Some(redis.timeout());
    pool_config.timeouts.create = Some(redis.timeout());
    pool_config.timeouts.recycle = Some(redis.timeout());

    let pool = match redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to create Redis pool. Falling back to local cache."
            );
            return CacheBackend::new_local();
        }
    };

    match pool.get().await {
        Ok(_) => tracing::info!("Connected to Redis successfully"),
        Err(e) => tracing::warn!(
            error = %e,
            "Redis not reachable yet. Serving from local cache until it is."
        ),
    }

    let local = Arc::new(MemoryTier::new());
    let mut tier = RedisTier::new(pool);
    if let Some(channel) = redis.invalidation_channel.as_deref() {
        let instance_id = uuid::Uuid::new_v4().to_string();
        let listener = InvalidationListener {
            redis_url: url,
            channel: channel.to_string(),
            instance_id: instance_id.clone(),
            local: Arc::clone(&local),
        }
        .start();
        tier = tier
            .with_invalidation(channel, instance_id)
            .with_listener(listener.abort_handle());
    }

    CacheBackend::LocalTierPlusDurable {
        local,
        durable: Arc::new(tier),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_disabled_redis_is_local_only() {
        let backend = create_cache_backend(&AppConfig::default(), HostCapability::Server).await;
        assert_eq!(backend.mode(), "local");
        assert!(backend.secondary().is_none());
    }

    #[tokio::test]
    async fn test_client_skips_durable_tier() {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.redis.enabled = true;
        config.local_store.enabled = true;
        config.local_store.path = dir.path().join("cache");

        let backend = create_cache_backend(&config, HostCapability::Client).await;

        assert_eq!(backend.mode(), "local+persistent");
        let secondary = backend.secondary().unwrap();
        assert_eq!(secondary.kind(), crate::tier::TierKind::LocalPersistent);
        assert!(dir.path().join("cache").is_dir());
    }

    #[tokio::test]
    async fn test_client_without_local_store() {
        let backend = create_cache_backend(&AppConfig::default(), HostCapability::Client).await;
        assert_eq!(backend.mode(), "local");
    }

    #[tokio::test]
    async fn test_malformed_redis_url_falls_back() {
        let mut config = AppConfig::default();
        config.redis.enabled = true;
        config.redis.url = Some("not a url".into());

        let backend = create_cache_backend(&config, HostCapability::Server).await;
        assert_eq!(backend.mode(), "local");
    }
}
