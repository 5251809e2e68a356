//! Durable JSON checkpoint of the search state.
//!
//! The record is rewritten in full on each change. Writes go to a temporary
//! sibling first and are renamed into place, so a crash mid-write leaves the
//! previous checkpoint intact; concurrent writers (request handlers and the
//! sweeper) serialize on an internal lock.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use dragnet_core::wire::JobData;

/// The on-disk checkpoint record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointData {
    /// `completedEndIndex` at the time of the write; every index below it
    /// is known searched.
    pub index: u64,
    /// All results accepted so far, verbatim.
    pub results: Vec<serde_json::Value>,
    /// Snapshots of expired or cancelled jobs.
    pub failed: Vec<JobData>,
    /// Snapshots of jobs absorbed into the completed prefix.
    pub completed: Vec<JobData>,
}

/// Checkpoint file handle.
pub struct CheckpointStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl CheckpointStore {
    /// Create a store for the given checkpoint path. Nothing is read or
    /// written until [`load`](Self::load) or [`write`](Self::write).
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Path this store reads and writes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the checkpoint. A missing file is not an error: the search
    /// starts fresh at index 0.
    pub fn load(&self) -> anyhow::Result<CheckpointData> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    path = %self.path.display(),
                    "no search checkpoint found, starting a new search"
                );
                return Ok(CheckpointData::default());
            }
            Err(err) => {
                return Err(anyhow::anyhow!(
                    "read checkpoint {}: {err}",
                    self.path.display()
                ));
            }
        };
        let data: CheckpointData = serde_json::from_str(&raw)
            .map_err(|err| anyhow::anyhow!("parse checkpoint {}: {err}", self.path.display()))?;
        Ok(data)
    }

    /// Rewrite the checkpoint with the given snapshot.
    ///
    /// File I/O runs off the async runtime; callers must not hold the
    /// engine state lock across this call.
    pub async fn write(&self, data: CheckpointData) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_file(&path, &data))
            .await
            .map_err(|err| anyhow::anyhow!("checkpoint writer task: {err}"))??;
        Ok(())
    }
}

fn write_file(path: &Path, data: &CheckpointData) -> anyhow::Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }

    let json = serde_json::to_string_pretty(data)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dragnet_core::wire::JobData;
    use tempfile::TempDir;

    fn sample_job(id: u64, start: u64, size: u64) -> JobData {
        JobData {
            id,
            start_index: start,
            end_index: start + size,
            batch_size: size,
            timeout_seconds: 120,
            start_timestamp: 1000.0,
            update_timestamp: 1001.0,
            end_timestamp: Some(1002.0),
        }
    }

    #[tokio::test]
    async fn write_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("search.json"));

        let data = CheckpointData {
            index: 15,
            results: vec![serde_json::json!({"v": 1})],
            failed: vec![sample_job(1, 5, 5)],
            completed: vec![sample_job(0, 0, 15)],
        };
        store.write(data.clone()).await.unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, data);
    }

    #[test]
    fn missing_file_loads_as_fresh_search() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("search.json"));
        let loaded = store.load().unwrap();
        assert_eq!(loaded, CheckpointData::default());
        assert_eq!(loaded.index, 0);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("search.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = CheckpointStore::new(path);
        assert!(store.load().is_err());
    }

    #[tokio::test]
    async fn rewrite_replaces_previous_record_and_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("search.json");
        let store = CheckpointStore::new(path.clone());

        store
            .write(CheckpointData {
                index: 5,
                ..CheckpointData::default()
            })
            .await
            .unwrap();
        store
            .write(CheckpointData {
                index: 10,
                ..CheckpointData::default()
            })
            .await
            .unwrap();

        assert_eq!(store.load().unwrap().index, 10);
        assert!(!path.with_extension("json.tmp").exists());
    }
}
