//! Events persisted for a policy and how they are folded into state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::model::{
    Label, Lifecycle, Policy, PolicyBuilder, PolicyEntry, PolicyId, PolicyImport, PolicyImports,
};

/// An event of a single policy at a given revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyEvent {
    pub policy_id: PolicyId,
    pub revision: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: PolicyEventPayload,
}

/// The change carried by a [`PolicyEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PolicyEventPayload {
    PolicyCreated {
        policy: Policy,
    },
    PolicyModified {
        policy: Policy,
    },
    PolicyDeleted,
    PolicyEntryCreated {
        entry: PolicyEntry,
    },
    PolicyEntryModified {
        entry: PolicyEntry,
    },
    PolicyEntriesModified {
        entries: Vec<PolicyEntry>,
    },
    PolicyEntryDeleted {
        label: Label,
    },
    PolicyImportCreated {
        import: PolicyImport,
    },
    PolicyImportModified {
        import: PolicyImport,
    },
    PolicyImportsModified {
        imports: PolicyImports,
    },
    PolicyImportDeleted {
        #[serde(rename = "importedPolicyId")]
        imported_policy_id: PolicyId,
    },
}

impl PolicyEventPayload {
    /// Returns the event type name, also used as the journal manifest.
    pub fn name(&self) -> &'static str {
        match self {
            PolicyEventPayload::PolicyCreated { .. } => "PolicyCreated",
            PolicyEventPayload::PolicyModified { .. } => "PolicyModified",
            PolicyEventPayload::PolicyDeleted => "PolicyDeleted",
            PolicyEventPayload::PolicyEntryCreated { .. } => "PolicyEntryCreated",
            PolicyEventPayload::PolicyEntryModified { .. } => "PolicyEntryModified",
            PolicyEventPayload::PolicyEntriesModified { .. } => "PolicyEntriesModified",
            PolicyEventPayload::PolicyEntryDeleted { .. } => "PolicyEntryDeleted",
            PolicyEventPayload::PolicyImportCreated { .. } => "PolicyImportCreated",
            PolicyEventPayload::PolicyImportModified { .. } => "PolicyImportModified",
            PolicyEventPayload::PolicyImportsModified { .. } => "PolicyImportsModified",
            PolicyEventPayload::PolicyImportDeleted { .. } => "PolicyImportDeleted",
        }
    }

    /// Applies the payload to `builder`. Creation ignores the builder.
    fn apply(&self, builder: PolicyBuilder) -> PolicyBuilder {
        match self {
            PolicyEventPayload::PolicyCreated { policy } => policy.to_builder(),
            PolicyEventPayload::PolicyModified { policy } => {
                let created = builder.created();
                policy
                    .to_builder()
                    .set_lifecycle(Lifecycle::Active)
                    .set_created(created)
            }
            PolicyEventPayload::PolicyDeleted => builder.set_lifecycle(Lifecycle::Deleted),
            PolicyEventPayload::PolicyEntryCreated { entry }
            | PolicyEventPayload::PolicyEntryModified { entry } => builder.set_entry(entry.clone()),
            PolicyEventPayload::PolicyEntriesModified { entries } => {
                builder.set_entries(entries.iter().cloned())
            }
            PolicyEventPayload::PolicyEntryDeleted { label } => builder.remove_entry(label),
            PolicyEventPayload::PolicyImportCreated { import }
            | PolicyEventPayload::PolicyImportModified { import } => {
                let imports = builder
                    .imports()
                    .cloned()
                    .unwrap_or_default()
                    .set_import(import.clone());
                builder.set_imports(Some(imports))
            }
            PolicyEventPayload::PolicyImportsModified { imports } => {
                builder.set_imports(Some(imports.clone()))
            }
            PolicyEventPayload::PolicyImportDeleted { imported_policy_id } => {
                // Removing the last import clears the container.
                let remaining = builder
                    .imports()
                    .cloned()
                    .map(|imports| imports.remove_import(imported_policy_id))
                    .filter(|imports| !imports.is_empty());
                builder.set_imports(remaining)
            }
        }
    }
}

impl PolicyEvent {
    pub fn new(
        policy_id: PolicyId,
        revision: u64,
        timestamp: DateTime<Utc>,
        payload: PolicyEventPayload,
    ) -> Self {
        Self {
            policy_id,
            revision,
            timestamp,
            payload,
        }
    }

    pub fn name(&self) -> &'static str {
        self.payload.name()
    }

    pub fn is_created(&self) -> bool {
        matches!(self.payload, PolicyEventPayload::PolicyCreated { .. })
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self.payload, PolicyEventPayload::PolicyDeleted)
    }

    /// Folds this event into `current`, returning the next state.
    ///
    /// The revision is set to the event's revision after the payload has been
    /// applied. Revision ordering is checked by the aggregate, not here.
    pub fn apply_to(&self, current: Option<&Policy>) -> DomainResult<Policy> {
        let builder = match current {
            _ if self.is_created() => self.payload.apply(PolicyBuilder::new(self.policy_id.clone())),
            Some(policy) if !policy.is_deleted() => self.payload.apply(policy.to_builder()),
            Some(_) => return Err(self.not_applicable("policy is deleted")),
            None => return Err(self.not_applicable("policy does not exist")),
        };

        Ok(builder
            .set_revision(self.revision)
            .set_modified(Some(self.timestamp))
            .build())
    }

    fn not_applicable(&self, reason: &'static str) -> DomainError {
        DomainError::EventNotApplicable {
            policy_id: self.policy_id.to_string(),
            event: self.name(),
            reason,
        }
    }
}
