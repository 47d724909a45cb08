//! Durable tier backed by Redis.
//!
//! | Operation       | Redis commands                  |
//! |-----------------|---------------------------------|
//! | load            | `GET`                           |
//! | store           | `SET key payload EX secs`       |
//! | remove          | `DEL` (+ `PUBLISH … key`)       |
//! | remove_prefix   | `SCAN MATCH prefix*` + `DEL` (+ `PUBLISH … prefix`) |
//! | entry_count     | `DBSIZE`                        |
//!
//! `KEYS` is never used; prefix removal walks the key space with `SCAN`.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use tokio::task::AbortHandle;

use super::{SecondaryTier, TierKind};
use crate::error::TierResult;
use crate::key::escape_glob;
use crate::pubsub::{InvalidationMessage, InvalidationTarget};

const SCAN_BATCH: usize = 200;

/// Redis-backed durable tier.
#[derive(Clone)]
pub struct RedisTier {
    pool: Pool,
    invalidation: Option<Invalidation>,
    listener: Option<AbortHandle>,
}

#[derive(Clone)]
struct Invalidation {
    channel: String,
    instance_id: String,
}

impl RedisTier {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            invalidation: None,
            listener: None,
        }
    }

    /// Publish fast-tier invalidations for deletes and clears on `channel`.
    pub fn with_invalidation(mut self, channel: impl Into<String>, instance_id: impl Into<String>) -> Self {
        self.invalidation = Some(Invalidation {
            channel: channel.into(),
            instance_id: instance_id.into(),
        });
        self
    }

    /// Tie an invalidation listener task to this tier; [`SecondaryTier::close`]
    /// aborts it.
    pub fn with_listener(mut self, listener: AbortHandle) -> Self {
        self.listener = Some(listener);
        self
    }

    async fn publish(&self, conn: &mut deadpool_redis::Connection, target: InvalidationTarget) {
        let Some(inv) = &self.invalidation else {
            return;
        };
        let message = InvalidationMessage::new(&inv.instance_id, target);
        let invalidated = message.target.as_str();
        if let Err(e) = conn.publish::<_, _, ()>(&inv.channel, message.encode()).await {
            tracing::warn!(invalidated = %invalidated, error = %e, "Redis PUBLISH error");
        } else {
            tracing::debug!(invalidated = %invalidated, channel = %inv.channel, "published cache invalidation");
        }
    }
}

/// Whole seconds for `EX`, rounded up and never zero.
fn expiry_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

#[async_trait]
impl SecondaryTier for RedisTier {
    fn kind(&self) -> TierKind {
        TierKind::Durable
    }

    async fn load(&self, key: &str) -> TierResult<Option<Vec<u8>>> {
        let mut conn = self.pool.get().await?;
        let data = conn.get::<_, Option<Vec<u8>>>(key).await?;
        Ok(data)
    }

    async fn store(&self, key: &str, payload: &[u8], ttl: Duration) -> TierResult<()> {
        let mut conn = self.pool.get().await?;
        let ttl_secs = expiry_secs(ttl);
        conn.set_ex::<_, _, ()>(key, payload, ttl_secs).await?;
        tracing::debug!(key = %key, ttl_secs, "durable tier set");
        Ok(())
    }

    async fn remove(&self, key: &str) -> TierResult<()> {
        let mut conn = self.pool.get().await?;
        conn.del::<_, ()>(key).await?;
        self.publish(&mut conn, InvalidationTarget::Key(key.to_string()))
            .await;
        Ok(())
    }

    async fn remove_prefix(&self, prefix: &str) -> TierResult<usize> {
        let mut conn = self.pool.get().await?;
        let pattern = format!("{}*", escape_glob(prefix));
        let mut cursor: u64 = 0;
        let mut removed = 0usize;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let deleted: usize = conn.del(&keys).await?;
                removed += deleted;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }

        self.publish(&mut conn, InvalidationTarget::Prefix(prefix.to_string()))
            .await;
        tracing::debug!(pattern = %pattern, removed, "durable tier prefix cleared");
        Ok(removed)
    }

    async fn ping(&self) -> TierResult<()> {
        let mut conn = self.pool.get().await?;
        let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn entry_count(&self) -> TierResult<usize> {
        let mut conn = self.pool.get().await?;
        let size: usize = redis::cmd("DBSIZE").query_async(&mut conn).await?;
        Ok(size)
    }

    fn close(&self) {
        self.pool.close();
        if let Some(listener) = &self.listener {
            listener.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_secs_rounds_up() {
        assert_eq!(expiry_secs(Duration::from_secs(300)), 300);
        assert_eq!(expiry_secs(Duration::from_millis(1_500)), 2);
        assert_eq!(expiry_secs(Duration::from_millis(10)), 1);
        assert_eq!(expiry_secs(Duration::ZERO), 1);
    }

    #[tokio::test]
    async fn test_close_stops_listener() {
        // Pools connect lazily, so nothing needs to listen on this port.
        let pool = deadpool_redis::Config::from_url("redis://127.0.0.1:1")
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .unwrap();
        let listener = tokio::spawn(std::future::pending::<()>());
        let tier = RedisTier::new(pool).with_listener(listener.abort_handle());

        tier.close();

        assert!(listener.await.unwrap_err().is_cancelled());
        assert!(tier.pool.is_closed());
    }
}
