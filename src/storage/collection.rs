use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;

/// Whole-collection JSON document store.
///
/// Every mutation is a full load-modify-save cycle over the collection; the
/// write lock is held across both the in-memory mutation and the disk write,
/// so concurrent writers cannot lose each other's updates. Entries keyed per
/// job need no finer-grained locking than this single collection lock.
pub struct JsonCollection<T> {
    file_path: PathBuf,
    cache: RwLock<Vec<T>>,
}

impl<T> JsonCollection<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    /// Open a collection file under `data_dir`, loading existing records.
    ///
    /// If the file is corrupted (invalid JSON), a backup is written next to
    /// it and the collection starts empty.
    pub async fn open(data_dir: &Path, file_name: &str) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir)
            .await
            .context("Failed to create data directory")?;

        let file_path = data_dir.join(file_name);

        let records = if file_path.exists() {
            let content = tokio::fs::read_to_string(&file_path)
                .await
                .with_context(|| format!("Failed to read {}", file_name))?;
            match serde_json::from_str::<Vec<T>>(&content) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(
                        "{} is corrupted ({}), creating backup and starting empty",
                        file_name,
                        e
                    );
                    let backup_path = file_path.with_extension("json.bak");
                    if let Err(backup_err) = tokio::fs::copy(&file_path, &backup_path).await {
                        tracing::error!(
                            "Failed to back up corrupted {}: {}",
                            file_name,
                            backup_err
                        );
                    }
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        Ok(Self {
            file_path,
            cache: RwLock::new(records),
        })
    }

    /// Read-only access to the whole collection.
    pub async fn read<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        let cache = self.cache.read().await;
        f(&cache)
    }

    /// One read-modify-write cycle over the whole collection.
    ///
    /// The write lock stays held until the mutated collection has been
    /// persisted, which makes the cycle a critical section: two runners
    /// finishing at the same instant serialize here instead of overwriting
    /// each other's records.
    pub async fn update<R>(&self, f: impl FnOnce(&mut Vec<T>) -> R) -> Result<R> {
        let mut cache = self.cache.write().await;
        let result = f(&mut cache);
        self.persist(&cache).await?;
        Ok(result)
    }

    /// Atomically write the collection to disk (tmp file, then rename).
    async fn persist(&self, records: &[T]) -> Result<()> {
        let tmp_path = self.file_path.with_extension("json.tmp");

        let json =
            serde_json::to_string_pretty(records).context("Failed to serialize collection")?;

        tokio::fs::write(&tmp_path, json.as_bytes())
            .await
            .context("Failed to write temporary collection file")?;

        tokio::fs::rename(&tmp_path, &self.file_path)
            .await
            .context("Failed to rename temporary collection file")?;

        Ok(())
    }
}
