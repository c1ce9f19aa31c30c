//! Enforcers: queryable authorization built from a merged entry set.
//!
//! The evaluation algorithm is pluggable through [`EnforcerBuilder`]. The
//! default [`EntryEnforcer`] answers a query by looking at every entry that
//! names the subject: a permission is granted when some entry grants it on
//! the resource or an ancestor, and no entry revokes it there.
//!
//! [`PolicyEnforcer`] ties an enforcer to the id and revision of the policy
//! it was merged for. Imported policies' revisions are not tracked.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;

use crate::model::{PolicyEntry, PolicyId, ResourceKey, SubjectId};

/// Answers permission queries.
pub trait Enforcer: Send + Sync + fmt::Debug {
    /// Returns true if `subject` holds `permission` on `resource`.
    fn has_permission(&self, subject: &SubjectId, resource: &ResourceKey, permission: &str) -> bool;
}

/// Builds an [`Enforcer`] from a merged entry set.
pub trait EnforcerBuilder: Send + Sync {
    fn build(&self, entries: &BTreeSet<PolicyEntry>) -> Arc<dyn Enforcer>;
}

/// Default enforcer evaluating grants and revokes entry by entry.
///
/// Revokes win over grants. Subjects whose expiry has passed at query time
/// are ignored.
#[derive(Debug, Clone)]
pub struct EntryEnforcer {
    entries: Vec<PolicyEntry>,
}

impl EntryEnforcer {
    pub fn new(entries: impl IntoIterator<Item = PolicyEntry>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }
}

impl Enforcer for EntryEnforcer {
    fn has_permission(&self, subject: &SubjectId, resource: &ResourceKey, permission: &str) -> bool {
        let now = Utc::now();
        let mut granted = false;

        let applicable = self.entries.iter().filter(|entry| {
            entry
                .subjects
                .iter()
                .any(|s| &s.id == subject && !s.is_expired(now))
        });

        for entry in applicable {
            for res in entry.resources.iter().filter(|r| r.key.covers(resource)) {
                if res.permissions.revoke.contains(permission) {
                    return false;
                }
                granted |= res.permissions.grant.contains(permission);
            }
        }
        granted
    }
}

/// Builder for [`EntryEnforcer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryEnforcerBuilder;

impl EnforcerBuilder for EntryEnforcerBuilder {
    fn build(&self, entries: &BTreeSet<PolicyEntry>) -> Arc<dyn Enforcer> {
        Arc::new(EntryEnforcer::new(entries.iter().cloned()))
    }
}

/// An enforcer together with the policy it was built for.
#[derive(Debug, Clone)]
pub struct PolicyEnforcer {
    policy_id: PolicyId,
    revision: u64,
    entries: BTreeSet<PolicyEntry>,
    enforcer: Arc<dyn Enforcer>,
}

impl PolicyEnforcer {
    /// Builds an enforcer for `policy_id` at `revision` from its merged entries.
    pub fn build(
        policy_id: PolicyId,
        revision: u64,
        entries: BTreeSet<PolicyEntry>,
        builder: &dyn EnforcerBuilder,
    ) -> Self {
        let enforcer = builder.build(&entries);
        Self {
            policy_id,
            revision,
            entries,
            enforcer,
        }
    }

    pub fn policy_id(&self) -> &PolicyId {
        &self.policy_id
    }

    /// Revision of the top-level policy this enforcer was merged for.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// The merged entries the enforcer was built from.
    pub fn entries(&self) -> &BTreeSet<PolicyEntry> {
        &self.entries
    }

    pub fn enforcer(&self) -> &Arc<dyn Enforcer> {
        &self.enforcer
    }

    pub fn has_permission(&self, subject: &SubjectId, resource: &ResourceKey, permission: &str) -> bool {
        self.enforcer.has_permission(subject, resource, permission)
    }
}
