//! Lookup trait used by the import merge.

use std::collections::HashMap;

use crate::model::{Policy, PolicyId};

/// Synchronous single-level lookup of imported policies.
///
/// The merge resolver calls this once per import of the policy being merged.
/// Returning `None` means the imported policy contributes no entries.
pub trait PolicyLookup: Send + Sync {
    /// Returns the current state of `policy_id`, if it is known and active.
    fn lookup(&self, policy_id: &PolicyId) -> Option<Policy>;
}

impl PolicyLookup for HashMap<PolicyId, Policy> {
    fn lookup(&self, policy_id: &PolicyId) -> Option<Policy> {
        self.get(policy_id).cloned()
    }
}

impl<F> PolicyLookup for F
where
    F: Fn(&PolicyId) -> Option<Policy> + Send + Sync,
{
    fn lookup(&self, policy_id: &PolicyId) -> Option<Policy> {
        self(policy_id)
    }
}
