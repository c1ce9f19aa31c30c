//! In-memory journal implementation for testing and single-node use.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, instrument};

use crate::error::{StorageError, StorageResult};
use crate::traits::{validate_persistence_id, EventJournal, StoredEvent};

/// In-memory implementation of EventJournal.
///
/// # Performance Characteristics
///
/// - **Append**: O(1) amortized (Vec push under the id's shard lock)
/// - **Read**: O(log N + K) (binary search for the start revision)
/// - **Highest revision**: O(1)
///
/// The revision check and the push happen under the same DashMap entry
/// lock, so concurrent appends to one id cannot both succeed.
#[derive(Debug, Default)]
pub struct MemoryEventJournal {
    journals: DashMap<String, Vec<StoredEvent>>,
}

impl MemoryEventJournal {
    /// Creates a new in-memory journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory journal wrapped in Arc.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl EventJournal for MemoryEventJournal {
    #[instrument(skip(self, event), fields(persistence_id = %event.persistence_id, revision = event.revision))]
    async fn append(&self, event: StoredEvent) -> StorageResult<()> {
        validate_persistence_id(&event.persistence_id)?;

        let mut journal = self.journals.entry(event.persistence_id.clone()).or_default();
        let expected = journal.last().map_or(0, |last| last.revision) + 1;
        if event.revision != expected {
            return Err(StorageError::RevisionConflict {
                persistence_id: event.persistence_id,
                expected,
                actual: event.revision,
            });
        }

        debug!(manifest = %event.manifest, "Appending event");
        journal.push(event);
        Ok(())
    }

    async fn read_events(
        &self,
        persistence_id: &str,
        from_revision: u64,
    ) -> StorageResult<Vec<StoredEvent>> {
        validate_persistence_id(persistence_id)?;

        let Some(journal) = self.journals.get(persistence_id) else {
            return Ok(Vec::new());
        };
        let start = journal.partition_point(|event| event.revision < from_revision);
        Ok(journal[start..].to_vec())
    }

    async fn highest_revision(&self, persistence_id: &str) -> StorageResult<u64> {
        validate_persistence_id(persistence_id)?;

        Ok(self
            .journals
            .get(persistence_id)
            .and_then(|journal| journal.last().map(|event| event.revision))
            .unwrap_or(0))
    }

    async fn persistence_ids(&self) -> StorageResult<Vec<String>> {
        let mut ids: Vec<String> = self
            .journals
            .iter()
            .filter(|journal| !journal.value().is_empty())
            .map(|journal| journal.key().clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn event(persistence_id: &str, revision: u64) -> StoredEvent {
        StoredEvent {
            persistence_id: persistence_id.to_string(),
            revision,
            timestamp: Utc::now(),
            manifest: "test".to_string(),
            payload: json!({ "n": revision }),
        }
    }

    #[tokio::test]
    async fn test_memory_journal_starts_empty() {
        let journal = MemoryEventJournal::new();

        assert_eq!(journal.highest_revision("policy:a").await.unwrap(), 0);
        assert!(journal.read_events("policy:a", 1).await.unwrap().is_empty());
        assert!(journal.persistence_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_journal_shared() {
        let journal = MemoryEventJournal::new_shared();
        journal.append(event("policy:a", 1)).await.unwrap();

        let journal2 = Arc::clone(&journal);
        assert_eq!(journal2.highest_revision("policy:a").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_append_and_read_in_order() {
        let journal = MemoryEventJournal::new();
        for revision in 1..=3 {
            journal.append(event("policy:a", revision)).await.unwrap();
        }

        let events = journal.read_events("policy:a", 1).await.unwrap();
        let revisions: Vec<u64> = events.iter().map(|e| e.revision).collect();

        assert_eq!(revisions, vec![1, 2, 3]);
        assert_eq!(events[1].payload, json!({ "n": 2 }));
    }

    #[tokio::test]
    async fn test_read_from_revision() {
        let journal = MemoryEventJournal::new();
        for revision in 1..=5 {
            journal.append(event("policy:a", revision)).await.unwrap();
        }

        let events = journal.read_events("policy:a", 4).await.unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].revision, 4);
        assert!(journal.read_events("policy:a", 6).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_rejects_gap() {
        let journal = MemoryEventJournal::new();
        journal.append(event("policy:a", 1)).await.unwrap();

        let result = journal.append(event("policy:a", 3)).await;

        assert!(matches!(
            result,
            Err(StorageError::RevisionConflict {
                expected: 2,
                actual: 3,
                ..
            })
        ));
        assert_eq!(journal.highest_revision("policy:a").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_append_rejects_duplicate_revision() {
        let journal = MemoryEventJournal::new();
        journal.append(event("policy:a", 1)).await.unwrap();

        let result = journal.append(event("policy:a", 1)).await;

        assert!(matches!(result, Err(StorageError::RevisionConflict { .. })));
    }

    #[tokio::test]
    async fn test_first_append_must_be_revision_one() {
        let journal = MemoryEventJournal::new();

        let result = journal.append(event("policy:a", 2)).await;

        assert!(matches!(
            result,
            Err(StorageError::RevisionConflict { expected: 1, .. })
        ));
        assert!(journal.persistence_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_journals_are_independent() {
        let journal = MemoryEventJournal::new();
        journal.append(event("policy:b", 1)).await.unwrap();
        journal.append(event("policy:a", 1)).await.unwrap();
        journal.append(event("policy:a", 2)).await.unwrap();

        assert_eq!(journal.highest_revision("policy:a").await.unwrap(), 2);
        assert_eq!(journal.highest_revision("policy:b").await.unwrap(), 1);
        assert_eq!(
            journal.persistence_ids().await.unwrap(),
            vec!["policy:a".to_string(), "policy:b".to_string()]
        );
    }

    #[tokio::test]
    async fn test_empty_persistence_id_rejected() {
        let journal = MemoryEventJournal::new();

        let result = journal.append(event("", 1)).await;

        assert!(matches!(result, Err(StorageError::InvalidInput { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_of_same_revision_one_wins() {
        let journal = MemoryEventJournal::new_shared();

        let appends = (0..16).map(|_| {
            let journal = Arc::clone(&journal);
            tokio::spawn(async move { journal.append(event("policy:a", 1)).await })
        });
        let results = futures::future::join_all(appends).await;

        let successes = results
            .into_iter()
            .filter(|result| matches!(result, Ok(Ok(()))))
            .count();
        assert_eq!(successes, 1);
        assert_eq!(journal.read_events("policy:a", 1).await.unwrap().len(), 1);
    }
}
