//! Local persistent tier: one file per key in a directory.
//!
//! Used when the host has no access to the durable tier. Files are named by
//! the 128-bit xxh3 hash of the full storage key, so key length never hits
//! file name limits. Each file starts with the key as a JSON string on its
//! own line, followed by the payload:
//!
//! ```text
//! "app:user_activities:userId=42"
//! {"expires_at_ms":1700000000000,"value":[...]}
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;
use xxhash_rust::xxh3::xxh3_128;

use super::{SecondaryTier, TierKind};
use crate::error::{TierError, TierResult};

const EXTENSION: &str = "entry";

/// Directory-backed tier that survives process restarts.
#[derive(Debug, Clone)]
pub struct FileTier {
    dir: PathBuf,
}

impl FileTier {
    /// Open (creating if needed) a store rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> TierResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let hash = xxh3_128(key.as_bytes());
        self.dir.join(format!("{hash:032x}.{EXTENSION}"))
    }

    /// Key recorded in an entry file's first line.
    async fn read_key(path: &Path) -> TierResult<Option<String>> {
        let file = match tokio::fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut line = Vec::new();
        BufReader::new(file).read_until(b'\n', &mut line).await?;
        Ok(serde_json::from_slice(line.strip_suffix(b"\n").unwrap_or(&line)).ok())
    }

    /// Every stored key with the file holding it.
    async fn entries(&self) -> TierResult<Vec<(String, PathBuf)>> {
        let mut found = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(found),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(key) = Self::read_key(&path).await? {
                found.push((key, path));
            }
        }
        Ok(found)
    }
}

/// `<json key>\n<payload>`
fn encode_record(key: &str, payload: &[u8]) -> TierResult<Vec<u8>> {
    let mut record = serde_json::to_vec(key)?;
    record.push(b'\n');
    record.extend_from_slice(payload);
    Ok(record)
}

fn decode_record(record: &[u8]) -> Option<(String, &[u8])> {
    let split = record.iter().position(|b| *b == b'\n')?;
    let key = serde_json::from_slice(&record[..split]).ok()?;
    Some((key, &record[split + 1..]))
}

#[async_trait]
impl SecondaryTier for FileTier {
    fn kind(&self) -> TierKind {
        TierKind::LocalPersistent
    }

    async fn load(&self, key: &str) -> TierResult<Option<Vec<u8>>> {
        let record = match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match decode_record(&record) {
            Some((stored_key, payload)) if stored_key == key => Ok(Some(payload.to_vec())),
            // Another key with the same hash.
            Some(_) => Ok(None),
            None => Err(TierError::Backend(format!(
                "malformed cache file for key {key}"
            ))),
        }
    }

    async fn store(&self, key: &str, payload: &[u8], _ttl: Duration) -> TierResult<()> {
        let record = encode_record(key, payload)?;
        // Write then rename so readers never see a half-written entry.
        let tmp = self.dir.join(format!(".{}.tmp", Uuid::new_v4()));
        tokio::fs::write(&tmp, record).await?;
        if let Err(e) = tokio::fs::rename(&tmp, self.path_for(key)).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> TierResult<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_prefix(&self, prefix: &str) -> TierResult<usize> {
        let mut removed = 0;
        for (key, path) in self.entries().await? {
            if !key.starts_with(prefix) {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }

    async fn ping(&self) -> TierResult<()> {
        let meta = tokio::fs::metadata(&self.dir).await?;
        if meta.is_dir() {
            Ok(())
        } else {
            Err(TierError::Unavailable(format!(
                "{} is not a directory",
                self.dir.display()
            )))
        }
    }

    async fn entry_count(&self) -> TierResult<usize> {
        Ok(self.entries().await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn tier() -> (TempDir, FileTier) {
        let dir = TempDir::new().unwrap();
        let tier = FileTier::open(dir.path().join("store")).await.unwrap();
        (dir, tier)
    }

    #[tokio::test]
    async fn test_store_load_remove() {
        let (_dir, tier) = tier().await;

        tier.store("app:k", b"payload", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(tier.load("app:k").await.unwrap(), Some(b"payload".to_vec()));

        tier.remove("app:k").await.unwrap();
        assert_eq!(tier.load("app:k").await.unwrap(), None);

        // Removing again is fine.
        tier.remove("app:k").await.unwrap();
    }

    #[tokio::test]
    async fn test_store_overwrites() {
        let (_dir, tier) = tier().await;

        tier.store("app:k", b"v1", Duration::from_secs(60)).await.unwrap();
        tier.store("app:k", b"v2", Duration::from_secs(60)).await.unwrap();

        assert_eq!(tier.load("app:k").await.unwrap(), Some(b"v2".to_vec()));
        assert_eq!(tier.entry_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove_prefix_keeps_other_keys() {
        let (_dir, tier) = tier().await;
        for key in ["app:a:1", "app:a:2", "app:b:1", "other:a:1"] {
            tier.store(key, b"x", Duration::from_secs(60)).await.unwrap();
        }

        assert_eq!(tier.remove_prefix("app:a").await.unwrap(), 2);
        assert_eq!(tier.entry_count().await.unwrap(), 2);
        assert!(tier.load("app:b:1").await.unwrap().is_some());
        assert!(tier.load("other:a:1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_keys_with_path_characters() {
        let (_dir, tier) = tier().await;
        let key = "app:../etc/passwd?x=1";

        tier.store(key, b"x", Duration::from_secs(60)).await.unwrap();

        assert!(tier.load(key).await.unwrap().is_some());
        assert_eq!(tier.remove_prefix("app:").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ping() {
        let (_dir, tier) = tier().await;
        assert!(tier.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_long_key_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let key = format!("app:user_activities:{}", "userId=42&".repeat(20));
        assert!(key.len() >= 200);

        let tier = FileTier::open(dir.path()).await.unwrap();
        tier.store(&key, b"payload", Duration::from_secs(60))
            .await
            .unwrap();
        drop(tier);

        let reopened = FileTier::open(dir.path()).await.unwrap();
        assert_eq!(reopened.load(&key).await.unwrap(), Some(b"payload".to_vec()));
        assert_eq!(reopened.remove_prefix("app:user_activities:").await.unwrap(), 1);
        assert_eq!(reopened.entry_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_file_for_other_key_is_a_miss() {
        let (_dir, tier) = tier().await;
        // Simulate a hash collision: the file for app:a holds app:b.
        tokio::fs::write(tier.path_for("app:a"), encode_record("app:b", b"x").unwrap())
            .await
            .unwrap();

        assert_eq!(tier.load("app:a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_foreign_files_are_ignored() {
        let (_dir, tier) = tier().await;
        tier.store("app:k", b"x", Duration::from_secs(60)).await.unwrap();
        tokio::fs::write(tier.dir.join("notes.txt"), b"hello").await.unwrap();
        tokio::fs::write(tier.dir.join("junk.entry"), b"not a key").await.unwrap();

        assert_eq!(tier.entry_count().await.unwrap(), 1);
        assert_eq!(tier.remove_prefix("").await.unwrap(), 1);
    }

    #[test]
    fn test_record_layout() {
        let record = encode_record("app:a\nb", b"{\"v\":1}").unwrap();
        assert_eq!(record, b"\"app:a\\nb\"\n{\"v\":1}".to_vec());

        let (key, payload) = decode_record(&record).unwrap();
        assert_eq!(key, "app:a\nb");
        assert_eq!(payload, b"{\"v\":1}");
        assert_eq!(decode_record(b"no newline"), None);
    }
}
