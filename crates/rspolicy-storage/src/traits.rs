//! EventJournal trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

/// Maximum length of a persistence id.
pub const MAX_PERSISTENCE_ID_LENGTH: usize = 512;

/// An event as persisted in a journal.
///
/// The payload is opaque to storage; `manifest` names its type so that
/// readers can pick a decoder without inspecting the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEvent {
    pub persistence_id: String,
    pub revision: u64,
    pub timestamp: DateTime<Utc>,
    pub manifest: String,
    pub payload: serde_json::Value,
}

/// Validates a persistence id.
pub fn validate_persistence_id(persistence_id: &str) -> StorageResult<()> {
    if persistence_id.is_empty() {
        return Err(StorageError::InvalidInput {
            message: "persistence id cannot be empty".to_string(),
        });
    }
    if persistence_id.len() > MAX_PERSISTENCE_ID_LENGTH {
        return Err(StorageError::InvalidInput {
            message: format!(
                "persistence id exceeds {MAX_PERSISTENCE_ID_LENGTH} bytes: {} bytes",
                persistence_id.len()
            ),
        });
    }
    Ok(())
}

/// Append-only, per-id ordered event log.
///
/// Revisions of one persistence id start at 1 and have no gaps.
/// Implementations must be thread-safe (Send + Sync) and make each append
/// atomic: an append either stores the event at the next revision or fails
/// with [`StorageError::RevisionConflict`].
#[async_trait]
pub trait EventJournal: Send + Sync + 'static {
    /// Appends `event`, which must carry `highest_revision + 1`.
    async fn append(&self, event: StoredEvent) -> StorageResult<()>;

    /// Reads the events of `persistence_id` with revision `>= from_revision`, in order.
    async fn read_events(
        &self,
        persistence_id: &str,
        from_revision: u64,
    ) -> StorageResult<Vec<StoredEvent>>;

    /// Highest stored revision, 0 for an unknown id.
    async fn highest_revision(&self, persistence_id: &str) -> StorageResult<u64>;

    /// Ids that have at least one event.
    async fn persistence_ids(&self) -> StorageResult<Vec<String>>;
}
