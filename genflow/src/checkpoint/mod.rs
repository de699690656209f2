//! Durable per-stage checkpoints.
//!
//! A [`Checkpoint`] is written immediately after a stage succeeds and read
//! back at the start of every stage to decide between skipping and executing.
//! Stores only move whole checkpoints; a new `put` for the same
//! `(run_id, stage)` key replaces the previous one.

mod file;
mod memory;

pub use file::FileCheckpointStore;
pub use memory::InMemoryCheckpointStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::core::{PipelineState, RunId, StateField, StateSnapshot};
use crate::errors::{CheckpointCorruptionError, CheckpointStoreError};
use crate::stages::StageDescriptor;

/// Snapshot of pipeline state taken after a stage succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Run the checkpoint belongs to.
    pub run_id: RunId,
    /// Stage that produced it.
    pub stage_name: String,
    /// Field the stage wrote.
    pub output_field: StateField,
    /// When the checkpoint was taken.
    pub timestamp: DateTime<Utc>,
    /// Non-empty state fields at that point.
    pub state_snapshot: StateSnapshot,
    /// SHA-256 of the canonical snapshot encoding.
    pub digest: String,
}

impl Checkpoint {
    /// Captures the given state for a stage.
    #[must_use]
    pub fn new(
        run_id: RunId,
        stage_name: impl Into<String>,
        output_field: StateField,
        state: &PipelineState,
    ) -> Self {
        let state_snapshot = state.snapshot();
        let digest = snapshot_digest(&state_snapshot);
        Self {
            run_id,
            stage_name: stage_name.into(),
            output_field,
            timestamp: Utc::now(),
            state_snapshot,
            digest,
        }
    }

    /// Returns the stored output value.
    #[must_use]
    pub fn output(&self) -> Option<&str> {
        self.state_snapshot
            .get(self.output_field.as_str())
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    /// Checks that the checkpoint is usable as the result of `stage`.
    ///
    /// The identity must match, the digest must match the snapshot, and the
    /// snapshot must hold a non-empty value for the declared output field.
    pub fn validate_for(&self, stage: &StageDescriptor) -> Result<(), CheckpointCorruptionError> {
        let corrupt = |reason: String| {
            CheckpointCorruptionError::new(self.run_id.as_str(), &stage.name, reason)
        };

        if self.stage_name != stage.name {
            return Err(corrupt(format!(
                "checkpoint belongs to stage '{}'",
                self.stage_name
            )));
        }
        if self.output_field != stage.output_field {
            return Err(corrupt(format!(
                "checkpoint declares output field '{}', stage produces '{}'",
                self.output_field, stage.output_field
            )));
        }
        if snapshot_digest(&self.state_snapshot) != self.digest {
            return Err(corrupt("snapshot digest mismatch".to_string()));
        }
        if self.output().is_none() {
            return Err(corrupt(format!(
                "output field '{}' is missing or empty",
                self.output_field
            )));
        }
        Ok(())
    }
}

/// Hex SHA-256 of the snapshot's JSON encoding (keys are sorted).
#[must_use]
pub fn snapshot_digest(snapshot: &StateSnapshot) -> String {
    let json = serde_json::to_string(snapshot).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    hex::encode(hasher.finalize())
}

/// Durable key-value persistence for checkpoints.
///
/// `put` must not return before the checkpoint is durable. Implementations
/// must allow concurrent access to distinct keys.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persists a checkpoint, replacing any previous one for the same key.
    async fn put(&self, checkpoint: Checkpoint) -> Result<(), CheckpointStoreError>;

    /// Loads the checkpoint for a stage, if one exists.
    ///
    /// An unreadable document is reported as [`CheckpointStoreError::Corrupted`].
    async fn get(
        &self,
        run_id: &RunId,
        stage_name: &str,
    ) -> Result<Option<Checkpoint>, CheckpointStoreError>;

    /// Removes a checkpoint. Returns true if one existed.
    async fn delete(&self, run_id: &RunId, stage_name: &str) -> Result<bool, CheckpointStoreError>;

    /// Lists the stages with a stored checkpoint for a run.
    async fn list_stages(&self, run_id: &RunId) -> Result<Vec<String>, CheckpointStoreError>;
}

/// Loads a checkpoint and keeps it only if it is valid for `stage`.
///
/// Corrupted checkpoints are logged and treated as absent so the stage is
/// executed again. Any other store failure is returned.
pub async fn load_valid(
    store: &dyn CheckpointStore,
    run_id: &RunId,
    stage: &StageDescriptor,
) -> Result<Option<Checkpoint>, CheckpointStoreError> {
    let checkpoint = match store.get(run_id, &stage.name).await {
        Ok(Some(checkpoint)) => checkpoint,
        Ok(None) => return Ok(None),
        Err(CheckpointStoreError::Corrupted(err)) => {
            warn!(run_id = %run_id, stage = %stage.name, error = %err, "Ignoring corrupted checkpoint");
            return Ok(None);
        }
        Err(err) => return Err(err),
    };

    match checkpoint.validate_for(stage) {
        Ok(()) => Ok(Some(checkpoint)),
        Err(err) => {
            warn!(run_id = %run_id, stage = %stage.name, error = %err, "Ignoring invalid checkpoint");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::StageRegistry;

    fn specify_checkpoint() -> (StageRegistry, Checkpoint) {
        let registry = StageRegistry::without_summary();
        let state = PipelineState::new("todo app").with(StateField::Specification, "PRD");
        let checkpoint = Checkpoint::new(
            RunId::new("run-1").unwrap(),
            "specify",
            StateField::Specification,
            &state,
        );
        (registry, checkpoint)
    }

    #[test]
    fn test_valid_checkpoint() {
        let (registry, checkpoint) = specify_checkpoint();
        assert_eq!(checkpoint.output(), Some("PRD"));
        assert!(checkpoint.validate_for(registry.get("specify").unwrap()).is_ok());
    }

    #[test]
    fn test_wrong_stage_rejected() {
        let (registry, checkpoint) = specify_checkpoint();
        assert!(checkpoint.validate_for(registry.get("generate").unwrap()).is_err());
    }

    #[test]
    fn test_tampered_snapshot_rejected() {
        let (registry, mut checkpoint) = specify_checkpoint();
        checkpoint
            .state_snapshot
            .insert("specification".to_string(), "edited".to_string());

        let err = checkpoint.validate_for(registry.get("specify").unwrap()).unwrap_err();
        assert!(err.reason.contains("digest"));
    }

    #[test]
    fn test_missing_output_rejected() {
        let registry = StageRegistry::without_summary();
        let checkpoint = Checkpoint::new(
            RunId::new("run-1").unwrap(),
            "specify",
            StateField::Specification,
            &PipelineState::new("todo app"),
        );

        let err = checkpoint.validate_for(registry.get("specify").unwrap()).unwrap_err();
        assert!(err.reason.contains("specification"));
    }

    #[tokio::test]
    async fn test_load_valid_treats_invalid_as_absent() {
        let registry = StageRegistry::without_summary();
        let store = InMemoryCheckpointStore::new();
        let run_id = RunId::new("run-1").unwrap();
        let (_, mut checkpoint) = specify_checkpoint();
        checkpoint.digest = "0".repeat(64);
        store.put(checkpoint).await.unwrap();

        let loaded = load_valid(&store, &run_id, registry.get("specify").unwrap())
            .await
            .unwrap();
        assert!(loaded.is_none());
    }
}
