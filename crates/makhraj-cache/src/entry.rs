//! Cache entries and their stored representation.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::error::TierResult;

/// A cached value with its absolute expiry.
///
/// Entries are never mutated: writing a key again replaces the whole entry.
/// The value is wrapped in `Arc` so fast-tier hits don't copy the payload.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub key: String,
    pub value: Arc<Value>,
    pub expires_at: OffsetDateTime,
}

impl CacheEntry {
    /// Create an entry that expires `ttl` after `now`.
    pub fn new(key: impl Into<String>, value: Value, now: OffsetDateTime, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            value: Arc::new(value),
            expires_at: now + ttl,
        }
    }

    /// Check if this entry has expired at `now`.
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now > self.expires_at
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining(&self, now: OffsetDateTime) -> Duration {
        let left = (self.expires_at - now).whole_milliseconds();
        Duration::from_millis(u64::try_from(left).unwrap_or(0))
    }

    /// Encode for a secondary tier.
    pub fn encode(&self) -> TierResult<Vec<u8>> {
        let stored = StoredEntryRef {
            expires_at_ms: unix_millis(self.expires_at),
            value: &self.value,
        };
        Ok(serde_json::to_vec(&stored)?)
    }

    /// Decode a payload previously produced by [`CacheEntry::encode`].
    pub fn decode(key: impl Into<String>, bytes: &[u8]) -> TierResult<Self> {
        let stored: StoredEntry = serde_json::from_slice(bytes)?;
        Ok(Self {
            key: key.into(),
            value: Arc::new(stored.value),
            expires_at: from_unix_millis(stored.expires_at_ms),
        })
    }
}

/// On-disk / on-wire envelope.
#[derive(Deserialize)]
struct StoredEntry {
    expires_at_ms: i64,
    value: Value,
}

#[derive(Serialize)]
struct StoredEntryRef<'a> {
    expires_at_ms: i64,
    value: &'a Value,
}

fn unix_millis(at: OffsetDateTime) -> i64 {
    i64::try_from(at.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

fn from_unix_millis(ms: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at(secs: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(secs).unwrap()
    }

    #[test]
    fn test_expiry_is_strictly_after() {
        let entry = CacheEntry::new("k", json!(1), at(1_000), Duration::from_secs(300));

        assert!(!entry.is_expired(at(1_000)));
        assert!(!entry.is_expired(at(1_300)));
        assert!(entry.is_expired(at(1_301)));
    }

    #[test]
    fn test_remaining() {
        let entry = CacheEntry::new("k", json!(1), at(1_000), Duration::from_secs(300));

        assert_eq!(entry.remaining(at(1_100)), Duration::from_secs(200));
        assert_eq!(entry.remaining(at(2_000)), Duration::ZERO);
    }

    #[test]
    fn test_envelope_keeps_expiry_and_value() {
        let value = json!([{"id": 1, "title": "X"}]);
        let entry = CacheEntry::new("teacher_tasks", value.clone(), at(1_000), Duration::from_millis(1_500));

        let bytes = entry.encode().unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.contains("\"expires_at_ms\":1001500"));

        let decoded = CacheEntry::decode("teacher_tasks", &bytes).unwrap();
        assert_eq!(*decoded.value, value);
        assert_eq!(decoded.expires_at, entry.expires_at);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(CacheEntry::decode("k", b"not json").is_err());
        assert!(CacheEntry::decode("k", br#"{"value": 1}"#).is_err());
    }
}
