//! Applies policy change notifications to the caches.

use std::sync::Arc;

use rspolicy_domain::{EnforcerCache, PolicyCache};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::feed::PolicyChanged;

/// Consumes the change feed and invalidates both caches.
///
/// Invalidating the policy cache already evicts the enforcer entry of the
/// same id and cascades to importers; the explicit enforcer invalidation
/// afterwards is idempotent. When the updater lags behind the feed it
/// cannot know which ids it missed and clears both caches.
pub struct CacheUpdater {
    policies: Arc<PolicyCache>,
    enforcers: Arc<EnforcerCache>,
}

impl CacheUpdater {
    pub fn new(policies: Arc<PolicyCache>, enforcers: Arc<EnforcerCache>) -> Self {
        Self {
            policies,
            enforcers,
        }
    }

    /// Applies one notification.
    pub async fn apply(&self, change: &PolicyChanged) {
        debug!(
            policy_id = %change.policy_id,
            revision = change.revision,
            deleted = change.deleted,
            "Invalidating caches for changed policy"
        );
        self.policies.invalidate(&change.policy_id).await;
        self.enforcers.invalidate(&change.policy_id).await;
    }

    /// Runs until the feed is closed.
    pub async fn run(self, mut changes: broadcast::Receiver<PolicyChanged>) {
        loop {
            match changes.recv().await {
                Ok(change) => self.apply(&change).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Cache updater lagged behind policy changes, clearing caches");
                    self.policies.invalidate_all();
                    self.enforcers.invalidate_all();
                }
                Err(RecvError::Closed) => break,
            }
        }
        info!("Policy change feed closed, cache updater stopped");
    }

    /// Spawns [`CacheUpdater::run`] on the current runtime.
    pub fn spawn(self, changes: broadcast::Receiver<PolicyChanged>) -> JoinHandle<()> {
        tokio::spawn(self.run(changes))
    }
}
