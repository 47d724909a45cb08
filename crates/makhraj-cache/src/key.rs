//! Cache key construction and namespacing.
//!
//! ## Key Format
//!
//! `{resource}` or `{resource}:{param}={value}&{param}={value}` with
//! parameters sorted by name, e.g. `user_activities:userId=42`.
//!
//! Every key is stored under the cache namespace (`app:` by default), so the
//! full storage key for the example above is `app:user_activities:userId=42`.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::CacheError;

/// Builder for application cache keys.
///
/// ```
/// use makhraj_cache::CacheKey;
///
/// let key = CacheKey::new("user_activities").param("userId", 42);
/// assert_eq!(key.to_string(), "user_activities:userId=42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    resource: String,
    params: BTreeMap<String, String>,
}

impl CacheKey {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add a query parameter. A repeated name replaces the earlier value.
    pub fn param(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.params.insert(name.into(), value.to_string());
        self
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.resource)?;
        let mut sep = ':';
        for (name, value) in &self.params {
            write!(f, "{sep}{name}={value}")?;
            sep = '&';
        }
        Ok(())
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.to_string()
    }
}

/// The managed key space of one cache instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace(String);

const DEFAULT_NAMESPACE: &str = "app:";

impl Namespace {
    /// An empty prefix falls back to the default, so a clear can never reach
    /// keys outside the cache.
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Self::default();
        }
        Self(prefix)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Full storage key for a caller key.
    #[inline]
    pub fn qualify(&self, key: &str) -> String {
        format!("{}{key}", self.0)
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self(DEFAULT_NAMESPACE.to_string())
    }
}

/// Reject keys the cache cannot address.
pub fn validate_key(key: &str) -> Result<(), CacheError> {
    if key.is_empty() {
        return Err(CacheError::invalid_argument("cache key must not be empty"));
    }
    Ok(())
}

/// Escape glob metacharacters so a literal prefix can be used in a Redis `MATCH` pattern.
pub fn escape_glob(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_without_params() {
        assert_eq!(CacheKey::new("teacher_tasks").to_string(), "teacher_tasks");
    }

    #[test]
    fn test_params_are_sorted() {
        let a = CacheKey::new("users_list")
            .param("role", "teacher")
            .param("page", 2);
        let b = CacheKey::new("users_list")
            .param("page", 2)
            .param("role", "teacher");

        assert_eq!(a.to_string(), "users_list:page=2&role=teacher");
        assert_eq!(a, b);
    }

    #[test]
    fn test_namespace_qualify() {
        let ns = Namespace::default();
        assert_eq!(ns.qualify("a:1"), "app:a:1");
        assert_eq!(Namespace::new("tenant:").qualify("a:1"), "tenant:a:1");
    }

    #[test]
    fn test_empty_namespace_falls_back_to_default() {
        let ns = Namespace::new("");
        assert_eq!(ns.as_str(), "app:");
        assert_eq!(ns.qualify(""), "app:");
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("k").is_ok());
        assert!(matches!(
            validate_key(""),
            Err(CacheError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("app:a"), "app:a");
        assert_eq!(escape_glob("a*b?[c]\\"), "a\\*b\\?\\[c\\]\\\\");
    }
}
