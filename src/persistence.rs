//! Persistence Store (§4.2, §6.3): atomic JSON read/write keyed by
//! namespaced string keys (`session:<id>`, `session:current`,
//! `gameState:current`). The only persistent surface in the system.
//!
//! Writes are atomic: serialize to a temp file in the same directory,
//! `fsync`, then rename over the target, so a crash mid-write never
//! leaves a torn file behind.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupted record at {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

pub struct PersistenceStore {
    root: PathBuf,
}

impl PersistenceStore {
    pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Namespaced keys use ':' as a path separator so `session:<id>`
        // and `session:current` live under a shared `session/` directory.
        let safe = key.replace(':', "/");
        self.root.join(format!("{safe}.json"))
    }

    pub async fn save<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                source: e,
            })?;

        let tmp_path = path.with_extension("json.tmp");
        {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
        }
        tokio::fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    pub async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let value = serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
                    key: key.to_string(),
                    source: e,
                })?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Lists keys under a prefix (directory), stripping the `.json` suffix.
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.root.join(prefix.replace(':', "/"));
        let mut out = Vec::new();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            if let Some(stripped) = name.strip_suffix(".json") {
                out.push(format!("{prefix}:{stripped}"));
            }
        }
        Ok(out)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        value: u32,
    }

    #[tokio::test]
    async fn round_trip_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistenceStore::new(dir.path()).unwrap();

        store.save("session:abc", &Sample { value: 42 }).await.unwrap();
        let loaded: Option<Sample> = store.load("session:abc").await.unwrap();
        assert_eq!(loaded, Some(Sample { value: 42 }));
    }

    #[tokio::test]
    async fn missing_key_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistenceStore::new(dir.path()).unwrap();
        let loaded: Option<Sample> = store.load("session:missing").await.unwrap();
        assert_eq!(loaded, None);
    }

    #[tokio::test]
    async fn corrupt_record_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistenceStore::new(dir.path()).unwrap();
        let path = store.path_for("session:bad");
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, b"not json").await.unwrap();

        let result: Result<Option<Sample>, _> = store.load("session:bad").await;
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn list_returns_namespaced_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistenceStore::new(dir.path()).unwrap();
        store.save("session:a", &Sample { value: 1 }).await.unwrap();
        store.save("session:b", &Sample { value: 2 }).await.unwrap();

        let mut keys = store.list("session").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["session:a", "session:b"]);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistenceStore::new(dir.path()).unwrap();
        store.delete("session:never-existed").await.unwrap();
    }
}
