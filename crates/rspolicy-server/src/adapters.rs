//! Conversions between domain events and journal records.

use rspolicy_domain::{PolicyEvent, PolicyId};
use rspolicy_storage::{StorageError, StorageResult, StoredEvent};

/// Prefix of the persistence ids of policy journals.
pub const POLICY_PERSISTENCE_PREFIX: &str = "policy:";

/// Journal id of a policy.
pub fn persistence_id(policy_id: &PolicyId) -> String {
    format!("{POLICY_PERSISTENCE_PREFIX}{policy_id}")
}

/// Encodes `event` for appending to the policy's journal.
pub fn to_stored_event(event: &PolicyEvent) -> StorageResult<StoredEvent> {
    Ok(StoredEvent {
        persistence_id: persistence_id(&event.policy_id),
        revision: event.revision,
        timestamp: event.timestamp,
        manifest: event.name().to_string(),
        payload: serde_json::to_value(event)?,
    })
}

/// Decodes a journal record into a policy event.
pub fn from_stored_event(stored: StoredEvent) -> StorageResult<PolicyEvent> {
    let event: PolicyEvent = serde_json::from_value(stored.payload)?;
    if event.revision != stored.revision || persistence_id(&event.policy_id) != stored.persistence_id
    {
        return Err(StorageError::SerializationError {
            message: format!(
                "record {}@{} holds event of {}@{}",
                stored.persistence_id, stored.revision, event.policy_id, event.revision
            ),
        });
    }
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rspolicy_domain::aggregate::PolicyEventPayload;
    use rspolicy_domain::model::Label;

    fn event() -> PolicyEvent {
        PolicyEvent::new(
            PolicyId::parse("com.example:p1").unwrap(),
            3,
            Utc::now(),
            PolicyEventPayload::PolicyEntryDeleted {
                label: Label::new("EndUser").unwrap(),
            },
        )
    }

    #[test]
    fn test_stored_event_carries_journal_metadata() {
        let stored = to_stored_event(&event()).unwrap();

        assert_eq!(stored.persistence_id, "policy:com.example:p1");
        assert_eq!(stored.revision, 3);
        assert_eq!(stored.manifest, "PolicyEntryDeleted");
        assert_eq!(stored.payload["payload"]["type"], "PolicyEntryDeleted");
    }

    #[test]
    fn test_stored_event_decodes_back() {
        let original = event();
        let decoded = from_stored_event(to_stored_event(&original).unwrap()).unwrap();

        assert_eq!(decoded, original);
    }

    #[test]
    fn test_mismatched_record_is_rejected() {
        let mut stored = to_stored_event(&event()).unwrap();
        stored.revision = 4;

        let result = from_stored_event(stored);

        assert!(matches!(result, Err(StorageError::SerializationError { .. })));
    }
}
