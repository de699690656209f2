//! In-memory checkpoint store.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{Checkpoint, CheckpointStore};
use crate::core::RunId;
use crate::errors::CheckpointStoreError;

/// Process-local store keyed by `(run_id, stage_name)`.
///
/// Durable only for the lifetime of the process. Distinct keys can be
/// written concurrently without contention on a global lock.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    entries: DashMap<(RunId, String), Checkpoint>,
}

impl InMemoryCheckpointStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored checkpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn put(&self, checkpoint: Checkpoint) -> Result<(), CheckpointStoreError> {
        let key = (checkpoint.run_id.clone(), checkpoint.stage_name.clone());
        self.entries.insert(key, checkpoint);
        Ok(())
    }

    async fn get(
        &self,
        run_id: &RunId,
        stage_name: &str,
    ) -> Result<Option<Checkpoint>, CheckpointStoreError> {
        let key = (run_id.clone(), stage_name.to_string());
        Ok(self.entries.get(&key).map(|entry| entry.value().clone()))
    }

    async fn delete(&self, run_id: &RunId, stage_name: &str) -> Result<bool, CheckpointStoreError> {
        let key = (run_id.clone(), stage_name.to_string());
        Ok(self.entries.remove(&key).is_some())
    }

    async fn list_stages(&self, run_id: &RunId) -> Result<Vec<String>, CheckpointStoreError> {
        let mut stages: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| &entry.key().0 == run_id)
            .map(|entry| entry.key().1.clone())
            .collect();
        stages.sort();
        Ok(stages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PipelineState, StateField};

    fn checkpoint(run: &str, stage: &str, value: &str) -> Checkpoint {
        let state = PipelineState::new("in").with(StateField::Summary, value);
        Checkpoint::new(RunId::new(run).unwrap(), stage, StateField::Summary, &state)
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = InMemoryCheckpointStore::new();
        let run = RunId::new("a").unwrap();
        assert!(store.get(&run, "summarize").await.unwrap().is_none());

        store.put(checkpoint("a", "summarize", "one")).await.unwrap();
        store.put(checkpoint("a", "summarize", "two")).await.unwrap();
        assert_eq!(store.len(), 1);

        let loaded = store.get(&run, "summarize").await.unwrap().unwrap();
        assert_eq!(loaded.output(), Some("two"));

        assert!(store.delete(&run, "summarize").await.unwrap());
        assert!(!store.delete(&run, "summarize").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_runs_are_isolated() {
        let store = InMemoryCheckpointStore::new();
        store.put(checkpoint("a", "summarize", "x")).await.unwrap();
        store.put(checkpoint("a", "specify", "x")).await.unwrap();
        store.put(checkpoint("b", "summarize", "y")).await.unwrap();

        let stages = store.list_stages(&RunId::new("a").unwrap()).await.unwrap();
        assert_eq!(stages, vec!["specify", "summarize"]);
        assert!(store
            .get(&RunId::new("b").unwrap(), "specify")
            .await
            .unwrap()
            .is_none());
    }
}
