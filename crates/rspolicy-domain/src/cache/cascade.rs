//! Reverse import index driving one-hop invalidation.

use std::collections::HashSet;
use std::fmt;
use std::sync::Weak;

use dashmap::DashMap;
use tracing::debug;

use crate::model::{Policy, PolicyId};

use super::{CacheInvalidator, Subscribers};

/// Tracks which policies import which.
///
/// Edges are recorded as `imported → importers` whenever the policy cache
/// loads a policy. They are never removed: an importer that dropped its
/// import keeps receiving cascaded invalidations, which costs a spurious
/// reload but never a stale read.
#[derive(Default)]
pub struct ImportDependencyTracker {
    dependents: DashMap<PolicyId, HashSet<PolicyId>>,
    invalidators: Subscribers,
}

impl fmt::Debug for ImportDependencyTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportDependencyTracker")
            .field("tracked_policies", &self.dependents.len())
            .finish()
    }
}

impl ImportDependencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback receiving the importers of an invalidated policy.
    pub fn subscribe(&self, invalidator: Weak<dyn CacheInvalidator>) {
        self.invalidators.add(invalidator);
    }

    /// Records an edge for every import of `policy`.
    pub fn record_imports(&self, policy: &Policy) {
        let Some(imports) = policy.imports() else {
            return;
        };
        for imported in imports.imported_ids() {
            self.add_dependency(imported.clone(), policy.id().clone());
        }
    }

    /// Records that `importer` imports `imported`.
    pub fn add_dependency(&self, imported: PolicyId, importer: PolicyId) {
        self.dependents.entry(imported).or_default().insert(importer);
    }

    /// Policies recorded as importing `imported`.
    pub fn dependents_of(&self, imported: &PolicyId) -> HashSet<PolicyId> {
        self.dependents
            .get(imported)
            .map(|dependents| dependents.clone())
            .unwrap_or_default()
    }

    /// Total number of recorded edges.
    pub fn edge_count(&self) -> usize {
        self.dependents.iter().map(|entry| entry.value().len()).sum()
    }

    /// Invalidates every direct importer of `policy_id` in all subscribers.
    ///
    /// Importers of those importers are not visited.
    pub async fn on_invalidate(&self, policy_id: &PolicyId) {
        // Snapshot before awaiting so no shard lock is held across await points.
        let dependents = self.dependents_of(policy_id);
        if dependents.is_empty() {
            return;
        }

        debug!(
            policy_id = %policy_id,
            dependents = dependents.len(),
            "Cascading invalidation to importing policies"
        );

        let invalidators = self.invalidators.live();
        for dependent in &dependents {
            for invalidator in &invalidators {
                invalidator.invalidate(dependent).await;
            }
            metrics::counter!("rspolicy_cascade_invalidations_total").increment(1);
        }
    }
}
