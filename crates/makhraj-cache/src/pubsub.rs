//! Redis Pub/Sub for cross-instance fast-tier invalidation.
//!
//! Opt-in: only active when `redis.invalidation_channel` is configured.
//!
//! ```text
//! Instance 1: cache.delete("users_list")
//!   ↓
//! Redis: DEL app:users_list; PUBLISH <channel> "<id-1> key app:users_list"
//!   ↓
//! Instance 2: listener receives it → removes app:users_list from its fast tier
//! Instance 1: listener sees its own id → ignores it
//! ```
//!
//! Messages are `<instance-id> key <full-key>` for a single key and
//! `<instance-id> prefix <full-prefix>` for a clear.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;

use crate::tier::MemoryTier;

const MIN_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// What an invalidation removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationTarget {
    Key(String),
    Prefix(String),
}

impl InvalidationTarget {
    fn tag(&self) -> &'static str {
        match self {
            InvalidationTarget::Key(_) => "key",
            InvalidationTarget::Prefix(_) => "prefix",
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            InvalidationTarget::Key(k) | InvalidationTarget::Prefix(k) => k,
        }
    }
}

/// Wire format of an invalidation event: `<instance-id> <key|prefix> <target>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationMessage {
    pub instance_id: String,
    pub target: InvalidationTarget,
}

impl InvalidationMessage {
    pub fn new(instance_id: impl Into<String>, target: InvalidationTarget) -> Self {
        Self {
            instance_id: instance_id.into(),
            target,
        }
    }

    pub fn encode(&self) -> String {
        format!(
            "{} {} {}",
            self.instance_id,
            self.target.tag(),
            self.target.as_str()
        )
    }

    pub fn decode(payload: &str) -> Option<Self> {
        let (instance_id, rest) = payload.split_once(' ')?;
        let (tag, target) = rest.split_once(' ')?;
        if instance_id.is_empty() || target.is_empty() {
            return None;
        }
        let target = match tag {
            "key" => InvalidationTarget::Key(target.to_string()),
            "prefix" => InvalidationTarget::Prefix(target.to_string()),
            _ => return None,
        };
        Some(Self::new(instance_id, target))
    }

    /// Apply to a fast tier, returning the number of removed entries.
    pub fn apply(&self, local: &MemoryTier) -> usize {
        match &self.target {
            InvalidationTarget::Key(key) => usize::from(local.remove(key)),
            InvalidationTarget::Prefix(prefix) => local.remove_prefix(prefix),
        }
    }
}

/// Background subscriber that keeps this instance's fast tier in step with
/// deletes and clears made by other instances.
pub struct InvalidationListener {
    pub redis_url: String,
    pub channel: String,
    pub instance_id: String,
    pub local: Arc<MemoryTier>,
}

impl InvalidationListener {
    /// Spawn the listener. It reconnects with exponential backoff
    /// (1s doubling up to 5 minutes) whenever the subscription drops; the
    /// backoff starts over after every successful subscribe.
    ///
    /// The task runs until aborted, see [`crate::RedisTier::with_listener`].
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut backoff = MIN_BACKOFF;

            loop {
                let Err(e) = self.run(&mut backoff).await;
                tracing::error!(
                    error = %e,
                    backoff_secs = backoff.as_secs(),
                    "Cache invalidation listener error, reconnecting..."
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        })
    }

    /// Subscribe and apply messages until the connection fails.
    async fn run(&self, backoff: &mut Duration) -> Result<Infallible, String> {
        let client = redis::Client::open(self.redis_url.clone())
            .map_err(|e| format!("failed to create Redis client: {e}"))?;

        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|e| format!("failed to get pub/sub connection: {e}"))?;

        pubsub
            .subscribe(&self.channel)
            .await
            .map_err(|e| format!("failed to subscribe: {e}"))?;

        tracing::info!(channel = %self.channel, "Subscribed to cache invalidation channel");
        *backoff = MIN_BACKOFF;

        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            let Ok(payload) = msg.get_payload::<String>() else {
                tracing::warn!("failed to parse invalidation message payload");
                continue;
            };
            self.handle(&payload);
        }
        Err("pub/sub connection closed".to_string())
    }

    fn handle(&self, payload: &str) {
        let Some(message) = InvalidationMessage::decode(payload) else {
            tracing::warn!(payload = %payload, "malformed invalidation message");
            return;
        };
        if message.instance_id == self.instance_id {
            return;
        }
        let removed = message.apply(&self.local);
        tracing::debug!(
            invalidated = %message.target.as_str(),
            kind = message.target.tag(),
            removed,
            "received cache invalidation"
        );
    }
}
