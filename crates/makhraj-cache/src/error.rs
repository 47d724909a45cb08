//! Error types for the tiered cache.
//!
//! Only caller misuse is surfaced through [`CacheError`]. Everything that can
//! go wrong inside a tier is a [`TierError`]; those are logged and collapsed
//! into a cache miss at the [`crate::TieredCache`] boundary.

use thiserror::Error;

/// Errors returned to callers of the cache.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    /// The caller passed an argument the cache cannot work with (e.g. an empty key).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl CacheError {
    /// Create a new InvalidArgument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

/// Failures of a single tier operation.
#[derive(Debug, Error)]
pub enum TierError {
    /// The tier is not configured or cannot be reached.
    #[error("tier unavailable: {0}")]
    Unavailable(String),

    /// The tier did not answer within the configured timeout.
    #[error("tier operation timed out after {0}ms")]
    Timeout(u64),

    /// A value could not be encoded, or a stored payload could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The tier answered with an error.
    #[error("tier backend error: {0}")]
    Backend(String),
}

impl TierError {
    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "unavailable",
            Self::Timeout(_) => "timeout",
            Self::Serialization(_) => "serialization",
            Self::Backend(_) => "backend",
        }
    }
}

impl From<redis::RedisError> for TierError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_connection_refusal() || e.is_connection_dropped() || e.is_io_error() {
            Self::Unavailable(e.to_string())
        } else if e.is_timeout() {
            Self::Unavailable(format!("redis timeout: {e}"))
        } else {
            Self::Backend(e.to_string())
        }
    }
}

impl From<deadpool_redis::PoolError> for TierError {
    fn from(e: deadpool_redis::PoolError) -> Self {
        Self::Unavailable(format!("failed to get Redis connection: {e}"))
    }
}

impl From<std::io::Error> for TierError {
    fn from(e: std::io::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

/// Result alias for tier operations.
pub type TierResult<T> = Result<T, TierError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_error_kinds() {
        assert_eq!(TierError::Unavailable("x".into()).kind(), "unavailable");
        assert_eq!(TierError::Timeout(5).kind(), "timeout");
        assert_eq!(TierError::Backend("x".into()).kind(), "backend");

        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(TierError::from(json_err).kind(), "serialization");
    }

    #[test]
    fn test_io_error_maps_to_backend() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(TierError::from(io), TierError::Backend(_)));
    }

    #[test]
    fn test_invalid_argument_display() {
        let err = CacheError::invalid_argument("cache key must not be empty");
        assert_eq!(
            err.to_string(),
            "Invalid argument: cache key must not be empty"
        );
    }
}
