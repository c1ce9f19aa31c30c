//! Commands accepted by the policy aggregate.

use chrono::{DateTime, Utc};

use crate::model::{Label, Policy, PolicyEntry, PolicyId, PolicyImport, PolicyImports};
use crate::validation::SizeLimit;

/// A command addressed to a single policy.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyCommand {
    CreatePolicy {
        policy: Policy,
    },
    /// Replaces the whole policy.
    ModifyPolicy {
        policy: Policy,
    },
    DeletePolicy {
        policy_id: PolicyId,
    },
    /// Creates or replaces one entry.
    ModifyPolicyEntry {
        policy_id: PolicyId,
        entry: PolicyEntry,
    },
    /// Replaces all entries.
    ModifyPolicyEntries {
        policy_id: PolicyId,
        entries: Vec<PolicyEntry>,
    },
    DeletePolicyEntry {
        policy_id: PolicyId,
        label: Label,
    },
    /// Creates or replaces one import.
    ModifyPolicyImport {
        policy_id: PolicyId,
        import: PolicyImport,
    },
    /// Replaces the whole imports container.
    ModifyPolicyImports {
        policy_id: PolicyId,
        imports: PolicyImports,
    },
    DeletePolicyImport {
        policy_id: PolicyId,
        imported_policy_id: PolicyId,
    },
    RetrievePolicy {
        policy_id: PolicyId,
    },
    RetrievePolicyEntry {
        policy_id: PolicyId,
        label: Label,
    },
    RetrievePolicyEntries {
        policy_id: PolicyId,
    },
    RetrievePolicyImport {
        policy_id: PolicyId,
        imported_policy_id: PolicyId,
    },
    RetrievePolicyImports {
        policy_id: PolicyId,
    },
    /// Internal retrieval used by the policy cache.
    SudoRetrievePolicy {
        policy_id: PolicyId,
    },
}

impl PolicyCommand {
    /// Returns the id of the policy this command is addressed to.
    pub fn policy_id(&self) -> &PolicyId {
        match self {
            PolicyCommand::CreatePolicy { policy } | PolicyCommand::ModifyPolicy { policy } => {
                policy.id()
            }
            PolicyCommand::DeletePolicy { policy_id }
            | PolicyCommand::ModifyPolicyEntry { policy_id, .. }
            | PolicyCommand::ModifyPolicyEntries { policy_id, .. }
            | PolicyCommand::DeletePolicyEntry { policy_id, .. }
            | PolicyCommand::ModifyPolicyImport { policy_id, .. }
            | PolicyCommand::ModifyPolicyImports { policy_id, .. }
            | PolicyCommand::DeletePolicyImport { policy_id, .. }
            | PolicyCommand::RetrievePolicy { policy_id }
            | PolicyCommand::RetrievePolicyEntry { policy_id, .. }
            | PolicyCommand::RetrievePolicyEntries { policy_id }
            | PolicyCommand::RetrievePolicyImport { policy_id, .. }
            | PolicyCommand::RetrievePolicyImports { policy_id }
            | PolicyCommand::SudoRetrievePolicy { policy_id } => policy_id,
        }
    }

    /// Returns the command name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            PolicyCommand::CreatePolicy { .. } => "CreatePolicy",
            PolicyCommand::ModifyPolicy { .. } => "ModifyPolicy",
            PolicyCommand::DeletePolicy { .. } => "DeletePolicy",
            PolicyCommand::ModifyPolicyEntry { .. } => "ModifyPolicyEntry",
            PolicyCommand::ModifyPolicyEntries { .. } => "ModifyPolicyEntries",
            PolicyCommand::DeletePolicyEntry { .. } => "DeletePolicyEntry",
            PolicyCommand::ModifyPolicyImport { .. } => "ModifyPolicyImport",
            PolicyCommand::ModifyPolicyImports { .. } => "ModifyPolicyImports",
            PolicyCommand::DeletePolicyImport { .. } => "DeletePolicyImport",
            PolicyCommand::RetrievePolicy { .. } => "RetrievePolicy",
            PolicyCommand::RetrievePolicyEntry { .. } => "RetrievePolicyEntry",
            PolicyCommand::RetrievePolicyEntries { .. } => "RetrievePolicyEntries",
            PolicyCommand::RetrievePolicyImport { .. } => "RetrievePolicyImport",
            PolicyCommand::RetrievePolicyImports { .. } => "RetrievePolicyImports",
            PolicyCommand::SudoRetrievePolicy { .. } => "SudoRetrievePolicy",
        }
    }

    /// Returns true for commands that never produce an event.
    pub fn is_query(&self) -> bool {
        matches!(
            self,
            PolicyCommand::RetrievePolicy { .. }
                | PolicyCommand::RetrievePolicyEntry { .. }
                | PolicyCommand::RetrievePolicyEntries { .. }
                | PolicyCommand::RetrievePolicyImport { .. }
                | PolicyCommand::RetrievePolicyImports { .. }
                | PolicyCommand::SudoRetrievePolicy { .. }
        )
    }
}

/// Request metadata handed to command handling.
#[derive(Debug, Clone, Copy)]
pub struct CommandContext {
    /// Processing time, used for event timestamps and subject expiry checks.
    pub now: DateTime<Utc>,
    pub size_limit: SizeLimit,
}

impl CommandContext {
    pub fn new(now: DateTime<Utc>, size_limit: SizeLimit) -> Self {
        Self { now, size_limit }
    }

    /// Context at the current time with the default size limit.
    pub fn now() -> Self {
        Self::new(Utc::now(), SizeLimit::default())
    }
}
