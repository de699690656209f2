//! Filesystem checkpoint store.

use async_trait::async_trait;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{Checkpoint, CheckpointStore};
use crate::core::RunId;
use crate::errors::{CheckpointCorruptionError, CheckpointStoreError};
use crate::utils::{path_component, write_atomic};

const FILE_PREFIX: &str = "checkpoint_";
const FILE_SUFFIX: &str = ".json";

/// Stores each checkpoint as a pretty-printed JSON document at
/// `<root>/<run_id>-<digest>/checkpoint_<stage>-<digest>.json`.
///
/// Run and stage ids are sanitized to `[A-Za-z0-9_.-]` and suffixed with a
/// digest of the raw id, so distinct ids never share a file. Writes go through a
/// temp file, fsync and rename, so a crash never leaves a half-written
/// checkpoint behind. All file I/O runs on the blocking thread pool.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    root: PathBuf,
}

impl FileCheckpointStore {
    /// Creates a store rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a run's checkpoints.
    #[must_use]
    pub fn run_dir(&self, run_id: &RunId) -> PathBuf {
        self.root.join(path_component(run_id.as_str()))
    }

    /// Path of the checkpoint document for a stage.
    #[must_use]
    pub fn path_for(&self, run_id: &RunId, stage_name: &str) -> PathBuf {
        self.run_dir(run_id).join(format!(
            "{FILE_PREFIX}{}{FILE_SUFFIX}",
            path_component(stage_name)
        ))
    }
}

async fn blocking<T, F>(task: F) -> Result<T, CheckpointStoreError>
where
    F: FnOnce() -> Result<T, CheckpointStoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| CheckpointStoreError::Unavailable(format!("checkpoint I/O task failed: {e}")))?
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn put(&self, checkpoint: Checkpoint) -> Result<(), CheckpointStoreError> {
        let path = self.path_for(&checkpoint.run_id, &checkpoint.stage_name);
        let bytes = serde_json::to_vec_pretty(&checkpoint)
            .map_err(|e| CheckpointStoreError::Serialization(e.to_string()))?;

        debug!(path = %path.display(), bytes = bytes.len(), "Writing checkpoint");
        blocking(move || write_atomic(&path, &bytes).map_err(CheckpointStoreError::from)).await
    }

    async fn get(
        &self,
        run_id: &RunId,
        stage_name: &str,
    ) -> Result<Option<Checkpoint>, CheckpointStoreError> {
        let path = self.path_for(run_id, stage_name);
        let run_id = run_id.clone();
        let stage_name = stage_name.to_string();

        blocking(move || {
            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };

            let corrupt = |reason: String| {
                CheckpointStoreError::Corrupted(CheckpointCorruptionError::new(
                    run_id.as_str(),
                    &stage_name,
                    reason,
                ))
            };
            let checkpoint: Checkpoint = serde_json::from_slice(&bytes)
                .map_err(|e| corrupt(format!("unparsable checkpoint document: {e}")))?;
            if checkpoint.run_id != run_id {
                return Err(corrupt(format!(
                    "document belongs to run '{}'",
                    checkpoint.run_id
                )));
            }
            Ok(Some(checkpoint))
        })
        .await
    }

    async fn delete(&self, run_id: &RunId, stage_name: &str) -> Result<bool, CheckpointStoreError> {
        let path = self.path_for(run_id, stage_name);
        blocking(move || match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        })
        .await
    }

    async fn list_stages(&self, run_id: &RunId) -> Result<Vec<String>, CheckpointStoreError> {
        let dir = self.run_dir(run_id);
        blocking(move || {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(e.into()),
            };

            let mut stages = Vec::new();
            for entry in entries {
                let path = entry?.path();
                let is_checkpoint = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX));
                if !is_checkpoint {
                    continue;
                }
                match fs::read(&path)
                    .map_err(|e| e.to_string())
                    .and_then(|bytes| {
                        serde_json::from_slice::<Checkpoint>(&bytes).map_err(|e| e.to_string())
                    }) {
                    Ok(checkpoint) => stages.push(checkpoint.stage_name),
                    Err(error) => {
                        warn!(path = %path.display(), error = %error, "Skipping unreadable checkpoint");
                    }
                }
            }
            stages.sort();
            Ok(stages)
        })
        .await
    }
}
