use std::fs;
use std::io::{self, Read};
use std::time::Duration;

use anyhow::{Context, Result};
use colored::Colorize;
use makhraj_cache::TieredCache;
use serde_json::Value;

use crate::cli::{OutputFormat, SetArgs};
use crate::output::{print_success, print_value};

/// JSON when it parses, otherwise the raw text as a string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.trim_end().to_string()))
}

fn read_value(args: &SetArgs) -> Result<Value> {
    if let Some(raw) = &args.value {
        return Ok(parse_value(raw));
    }
    let content = match &args.file {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("Failed to read file: {path}"))?
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            buf
        }
    };
    Ok(parse_value(&content))
}

pub async fn get(cache: &TieredCache, key: &str, format: OutputFormat) -> Result<()> {
    match cache.get::<Value>(key).await? {
        Some(value) => {
            print_value(&value, format);
            Ok(())
        }
        None => anyhow::bail!("Cache miss: {key}"),
    }
}

pub async fn set(cache: &TieredCache, args: &SetArgs) -> Result<()> {
    let value = read_value(args)?;
    let ttl = args.ttl.map(Duration::from_secs);
    if !cache.set(&args.key, &value, ttl).await? {
        anyhow::bail!("Value for {} could not be stored", args.key);
    }
    print_success(&format!(
        "Stored {} (ttl {}s)",
        args.key.cyan(),
        applied_ttl(ttl, cache.default_ttl()).as_secs()
    ));
    Ok(())
}

/// The TTL the cache uses for a requested one: zero or none means the default.
fn applied_ttl(requested: Option<Duration>, default: Duration) -> Duration {
    requested.filter(|ttl| !ttl.is_zero()).unwrap_or(default)
}

pub async fn delete(cache: &TieredCache, key: &str) -> Result<()> {
    cache.delete(key).await?;
    print_success(&format!("Deleted {}", key.cyan()));
    Ok(())
}

pub async fn clear(cache: &TieredCache, prefix: Option<&str>) -> Result<()> {
    cache.clear(prefix).await;
    match prefix {
        Some(p) => print_success(&format!("Cleared keys starting with {}", p.cyan())),
        None => print_success(&format!(
            "Cleared namespace {}",
            cache.namespace().as_str().cyan()
        )),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_value_accepts_json() {
        assert_eq!(parse_value(r#"{"a": [1, 2]}"#), json!({"a": [1, 2]}));
        assert_eq!(parse_value("42"), json!(42));
    }

    #[test]
    fn test_parse_value_falls_back_to_string() {
        assert_eq!(parse_value("hello world\n"), json!("hello world"));
    }

    #[test]
    fn test_applied_ttl_falls_back_for_zero_and_none() {
        let default = Duration::from_secs(300);
        assert_eq!(applied_ttl(None, default), default);
        assert_eq!(applied_ttl(Some(Duration::ZERO), default), default);
        assert_eq!(
            applied_ttl(Some(Duration::from_secs(60)), default),
            Duration::from_secs(60)
        );
    }

    #[tokio::test]
    async fn test_set_then_get_on_local_cache() {
        let cache = makhraj_cache::connect(
            &makhraj_cache::AppConfig::default(),
            makhraj_cache::HostCapability::Server,
        )
        .await;
        let args = SetArgs {
            key: "teacher_tasks".into(),
            value: Some(r#"["X"]"#.into()),
            file: None,
            ttl: Some(60),
        };

        set(&cache, &args).await.unwrap();

        assert_eq!(
            cache.get::<Value>("teacher_tasks").await.unwrap(),
            Some(json!(["X"]))
        );
        assert!(get(&cache, "missing", OutputFormat::Json).await.is_err());
    }
}
