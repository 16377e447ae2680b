//! Filesystem-backed [`CheckpointStore`] (§4.C.11, §4.E, §6.3).
//!
//! Grounded on the teacher's repository-implementation idiom (a thin struct over
//! a storage handle, `#[async_trait]` impl of the domain port) adapted to a plain
//! JSON file rather than SQLite, since the spec scopes persistence to the
//! markdown/checkpoint formats it defines.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;

use crate::domain::models::Checkpoint;
use crate::domain::ports::CheckpointStore;

/// Writes/reads a single [`Checkpoint`] as pretty-printed JSON at a fixed path.
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    /// Construct a store rooted at `path`. The parent directory is created lazily
    /// on first `save`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(checkpoint)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, &json).await?;
        fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    async fn load(&self) -> anyhow::Result<Option<Checkpoint>> {
        match fs::read(&self.path).await {
            Ok(bytes) => {
                let checkpoint = serde_json::from_slice(&bytes)
                    .map_err(|e| anyhow::anyhow!("checkpoint corrupt: {e}"))?;
                Ok(Some(checkpoint))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::CHECKPOINT_VERSION;
    use std::collections::HashMap;

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("checkpoint.json"));

        let checkpoint = Checkpoint {
            version: CHECKPOINT_VERSION,
            current_wave: 2,
            tasks: Vec::new(),
            active_owners: vec!["worker-1".to_string()],
            extra: HashMap::new(),
        };
        store.save(&checkpoint).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.current_wave, 2);
        assert_eq!(loaded.active_owners, vec!["worker-1".to_string()]);
    }

    #[tokio::test]
    async fn load_with_no_file_yet_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("missing.json"));
        assert!(store.load().await.unwrap().is_none());
    }
}
