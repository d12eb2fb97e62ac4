//! Best-effort on-disk store of model weights keyed by model identity.
//!
//! Every failure degrades to "not cached"; nothing here returns an error to callers.

use std::path::PathBuf;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::catalog::ModelKind;
use crate::errors::{EraserError, Result};

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    model_id: String,
    len: u64,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ModelCache {
    dir: PathBuf,
    ttl: TimeDelta,
}

impl ModelCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ttl: TimeDelta::days(7),
        }
    }

    fn blob_path(&self, key: ModelKind) -> PathBuf {
        self.dir.join(format!("{}.onnx", key.id()))
    }

    fn meta_path(&self, key: ModelKind) -> PathBuf {
        self.dir.join(format!("{}.json", key.id()))
    }

    pub async fn get(&self, key: ModelKind) -> Option<Vec<u8>> {
        self.get_at(key, Utc::now()).await
    }

    /// Look up `key` as of `now`; entries older than the TTL count as absent.
    pub async fn get_at(&self, key: ModelKind, now: DateTime<Utc>) -> Option<Vec<u8>> {
        match self.try_get(key, now).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(model = %key, error = %e, "model cache read failed");
                None
            }
        }
    }

    async fn try_get(&self, key: ModelKind, now: DateTime<Utc>) -> Result<Option<Vec<u8>>> {
        let meta_path = self.meta_path(key);
        let meta = match fs::read(&meta_path).await {
            Ok(bytes) => serde_json::from_slice::<EntryMeta>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(EraserError::FileSystem {
                    path: meta_path,
                    operation: "cache metadata read".to_string(),
                    source: e,
                })
            }
        };

        if meta.model_id != key.id() {
            return Ok(None);
        }
        if now.signed_duration_since(meta.timestamp) >= self.ttl {
            tracing::debug!(model = %key, stored = %meta.timestamp, "cached model expired");
            return Ok(None);
        }

        let blob_path = self.blob_path(key);
        let data = fs::read(&blob_path)
            .await
            .map_err(|e| EraserError::FileSystem {
                path: blob_path,
                operation: "cache blob read".to_string(),
                source: e,
            })?;
        if data.len() as u64 != meta.len {
            return Ok(None);
        }
        Ok(Some(data))
    }

    pub async fn put(&self, key: ModelKind, data: &[u8]) {
        self.put_at(key, data, Utc::now()).await;
    }

    pub async fn put_at(&self, key: ModelKind, data: &[u8], timestamp: DateTime<Utc>) {
        if let Err(e) = self.try_put(key, data, timestamp).await {
            tracing::warn!(model = %key, error = %e, "failed to cache model");
        }
    }

    async fn try_put(&self, key: ModelKind, data: &[u8], timestamp: DateTime<Utc>) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| EraserError::FileSystem {
                path: self.dir.clone(),
                operation: "cache directory creation".to_string(),
                source: e,
            })?;

        // The metadata file is written last and acts as the commit marker.
        let blob_path = self.blob_path(key);
        let tmp_path = blob_path.with_extension("onnx.part");
        fs::write(&tmp_path, data).await?;
        fs::rename(&tmp_path, &blob_path).await?;

        let meta = EntryMeta {
            model_id: key.id().to_string(),
            len: data.len() as u64,
            timestamp,
        };
        fs::write(self.meta_path(key), serde_json::to_vec(&meta)?).await?;
        Ok(())
    }

    pub async fn clear(&self) {
        for key in ModelKind::ALL {
            for path in [self.meta_path(key), self.blob_path(key)] {
                match fs::remove_file(&path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "failed to clear model cache")
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::new(temp_dir.path().join("models"));

        cache.put(ModelKind::Rmbg, b"weights").await;
        assert_eq!(cache.get(ModelKind::Rmbg).await.as_deref(), Some(&b"weights"[..]));
        assert_eq!(cache.get(ModelKind::Modnet).await, None);
    }

    #[tokio::test]
    async fn test_entries_expire_after_seven_days() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::new(temp_dir.path());
        let stored = Utc::now();

        cache.put_at(ModelKind::Rmbg, b"weights", stored).await;

        let fresh = stored + TimeDelta::days(6);
        let stale = stored + TimeDelta::days(7);
        assert!(cache.get_at(ModelKind::Rmbg, fresh).await.is_some());
        assert!(cache.get_at(ModelKind::Rmbg, stale).await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_metadata_reads_as_miss() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::new(temp_dir.path());
        cache.put(ModelKind::Rmbg, b"weights").await;

        std::fs::write(temp_dir.path().join("rmbg.json"), b"{not json").unwrap();
        assert_eq!(cache.get(ModelKind::Rmbg).await, None);
    }

    #[tokio::test]
    async fn test_truncated_blob_reads_as_miss() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::new(temp_dir.path());
        cache.put(ModelKind::Rmbg, b"weights").await;

        std::fs::write(temp_dir.path().join("rmbg.onnx"), b"wei").unwrap();
        assert_eq!(cache.get(ModelKind::Rmbg).await, None);
    }

    #[tokio::test]
    async fn test_unwritable_directory_is_swallowed() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();

        // A regular file where the cache directory should be.
        let cache = ModelCache::new(&blocker);
        cache.put(ModelKind::Rmbg, b"weights").await;
        assert_eq!(cache.get(ModelKind::Rmbg).await, None);
    }

    #[tokio::test]
    async fn test_clear_removes_entries() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::new(temp_dir.path());
        cache.put(ModelKind::Rmbg, b"a").await;
        cache.put(ModelKind::Modnet, b"b").await;

        cache.clear().await;
        assert_eq!(cache.get(ModelKind::Rmbg).await, None);
        assert_eq!(cache.get(ModelKind::Modnet).await, None);
    }
}
