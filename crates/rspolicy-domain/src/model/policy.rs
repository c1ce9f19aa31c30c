//! The policy document and its builder.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entry::PolicyEntry;
use super::imports::PolicyImports;
use super::types::{Label, PolicyId};

/// Lifecycle of a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Lifecycle {
    Active,
    Deleted,
}

/// A named, revisioned document granting and revoking permissions.
///
/// Policies are immutable values. Modifications go through
/// [`Policy::to_builder`] and produce a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    id: PolicyId,
    lifecycle: Lifecycle,
    revision: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    imports: Option<PolicyImports>,
    #[serde(with = "entries_as_list")]
    entries: BTreeMap<Label, PolicyEntry>,
}

impl Policy {
    /// Starts a builder for a new active policy at revision 0.
    pub fn builder(id: PolicyId) -> PolicyBuilder {
        PolicyBuilder::new(id)
    }

    pub fn id(&self) -> &PolicyId {
        &self.id
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_deleted(&self) -> bool {
        self.lifecycle == Lifecycle::Deleted
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.created
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.modified
    }

    pub fn imports(&self) -> Option<&PolicyImports> {
        self.imports.as_ref()
    }

    /// Returns the entry with the given label.
    pub fn entry(&self, label: &Label) -> Option<&PolicyEntry> {
        self.entries.get(label)
    }

    /// Iterates entries in label order.
    pub fn entries(&self) -> impl Iterator<Item = &PolicyEntry> {
        self.entries.values()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Returns a builder initialized with this policy's state.
    pub fn to_builder(&self) -> PolicyBuilder {
        PolicyBuilder {
            policy: self.clone(),
        }
    }
}

/// Builder for [`Policy`] values.
#[derive(Debug, Clone)]
pub struct PolicyBuilder {
    policy: Policy,
}

impl PolicyBuilder {
    /// Creates a builder for an active, empty policy at revision 0.
    pub fn new(id: PolicyId) -> Self {
        Self {
            policy: Policy {
                id,
                lifecycle: Lifecycle::Active,
                revision: 0,
                created: None,
                modified: None,
                imports: None,
                entries: BTreeMap::new(),
            },
        }
    }

    /// Inserts or replaces the entry addressed by its label.
    pub fn set_entry(mut self, entry: PolicyEntry) -> Self {
        self.policy.entries.insert(entry.label.clone(), entry);
        self
    }

    /// Replaces all entries.
    pub fn set_entries(mut self, entries: impl IntoIterator<Item = PolicyEntry>) -> Self {
        self.policy.entries = entries
            .into_iter()
            .map(|entry| (entry.label.clone(), entry))
            .collect();
        self
    }

    pub fn remove_entry(mut self, label: &Label) -> Self {
        self.policy.entries.remove(label);
        self
    }

    /// Sets the imports container as given, including an empty one.
    pub fn set_imports(mut self, imports: Option<PolicyImports>) -> Self {
        self.policy.imports = imports;
        self
    }

    /// Returns the current imports container, if any.
    pub fn imports(&self) -> Option<&PolicyImports> {
        self.policy.imports.as_ref()
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.policy.created
    }

    pub fn set_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.policy.lifecycle = lifecycle;
        self
    }

    pub fn set_revision(mut self, revision: u64) -> Self {
        self.policy.revision = revision;
        self
    }

    pub fn set_created(mut self, created: Option<DateTime<Utc>>) -> Self {
        self.policy.created = created;
        self
    }

    pub fn set_modified(mut self, modified: Option<DateTime<Utc>>) -> Self {
        self.policy.modified = modified;
        self
    }

    pub fn build(self) -> Policy {
        self.policy
    }
}

/// Serializes the entry map as a list; duplicate labels are rejected on read.
mod entries_as_list {
    use std::collections::BTreeMap;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::model::{Label, PolicyEntry};

    pub fn serialize<S: Serializer>(
        entries: &BTreeMap<Label, PolicyEntry>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let list: Vec<&PolicyEntry> = entries.values().collect();
        list.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<Label, PolicyEntry>, D::Error> {
        let list = Vec::<PolicyEntry>::deserialize(deserializer)?;
        let mut entries = BTreeMap::new();
        for entry in list {
            let label = entry.label.clone();
            if entries.insert(label.clone(), entry).is_some() {
                return Err(D::Error::custom(format!("duplicate entry label '{label}'")));
            }
        }
        Ok(entries)
    }
}
