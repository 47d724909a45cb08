//! Cache tiers.
//!
//! - [`MemoryTier`]: the fast tier, in-process, never suspends
//! - [`SecondaryTier`]: a slower tier behind the fast one. Either the shared
//!   durable store ([`RedisTier`]) or a local persistent store ([`FileTier`])

pub mod file;
pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::TierResult;

pub use file::FileTier;
pub use memory::{Lookup, MemoryTier};
pub use redis::RedisTier;

/// Which role a secondary tier plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierKind {
    /// Out-of-process store shared by every instance.
    Durable,
    /// Store private to this host that survives restarts.
    LocalPersistent,
}

impl TierKind {
    /// Label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            TierKind::Durable => "durable",
            TierKind::LocalPersistent => "local_persistent",
        }
    }
}

/// A tier consulted after a fast-tier miss.
///
/// Keys are full storage keys (namespace included). Payloads are encoded
/// [`crate::CacheEntry`] envelopes, so implementations only move bytes.
/// Every method may fail; the cache logs the failure and carries on.
#[async_trait]
pub trait SecondaryTier: Send + Sync {
    fn kind(&self) -> TierKind;

    /// Fetch a stored payload.
    async fn load(&self, key: &str) -> TierResult<Option<Vec<u8>>>;

    /// Store a payload, replacing any previous one. `ttl` lets the store
    /// drop the payload on its own; the envelope carries the exact expiry.
    async fn store(&self, key: &str, payload: &[u8], ttl: Duration) -> TierResult<()>;

    /// Remove a key. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> TierResult<()>;

    /// Remove every key starting with `prefix`, returning how many were removed.
    async fn remove_prefix(&self, prefix: &str) -> TierResult<usize>;

    /// Check that the tier answers.
    async fn ping(&self) -> TierResult<()>;

    /// Number of stored entries, as far as the tier can tell.
    async fn entry_count(&self) -> TierResult<usize>;

    /// Release connections. Default is a no-op.
    fn close(&self) {}
}
