//! In-process feed of policy change notifications.

use rspolicy_domain::{PolicyEvent, PolicyId};
use tokio::sync::broadcast;
use tracing::trace;

/// Notification that a policy reached a new revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyChanged {
    pub policy_id: PolicyId,
    pub revision: u64,
    pub deleted: bool,
}

impl PolicyChanged {
    pub fn from_event(event: &PolicyEvent) -> Self {
        Self {
            policy_id: event.policy_id.clone(),
            revision: event.revision,
            deleted: event.is_deleted(),
        }
    }
}

/// Broadcast bus of [`PolicyChanged`] notifications.
///
/// Publishing never blocks. A subscriber that falls behind by more than the
/// feed's capacity observes a lag error instead of the dropped notifications.
#[derive(Debug, Clone)]
pub struct PolicyChangeFeed {
    sender: broadcast::Sender<PolicyChanged>,
}

impl PolicyChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes `change` to all current subscribers.
    pub fn publish(&self, change: PolicyChanged) {
        // No subscribers is not an error
        if self.sender.send(change).is_err() {
            trace!("Policy change published without subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PolicyChanged> {
        self.sender.subscribe()
    }
}

impl Default for PolicyChangeFeed {
    fn default() -> Self {
        Self::new(1024)
    }
}
