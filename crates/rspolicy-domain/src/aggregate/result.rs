//! Results of command handling.

use crate::error::DomainError;
use crate::model::{Label, Policy, PolicyEntry, PolicyId, PolicyImport, PolicyImports};

use super::commands::PolicyCommand;
use super::etag::ETag;
use super::events::PolicyEvent;

/// Response returned to the sender of a command.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyResponse {
    CreatePolicy {
        policy: Policy,
    },
    ModifyPolicy {
        policy_id: PolicyId,
    },
    DeletePolicy {
        policy_id: PolicyId,
    },
    ModifyPolicyEntry {
        policy_id: PolicyId,
        entry: PolicyEntry,
        created: bool,
    },
    ModifyPolicyEntries {
        policy_id: PolicyId,
    },
    DeletePolicyEntry {
        policy_id: PolicyId,
        label: Label,
    },
    ModifyPolicyImport {
        policy_id: PolicyId,
        import: PolicyImport,
        created: bool,
    },
    ModifyPolicyImports {
        policy_id: PolicyId,
    },
    DeletePolicyImport {
        policy_id: PolicyId,
        imported_policy_id: PolicyId,
    },
    RetrievePolicy {
        policy: Policy,
    },
    RetrievePolicyEntry {
        policy_id: PolicyId,
        entry: PolicyEntry,
    },
    RetrievePolicyEntries {
        policy_id: PolicyId,
        entries: Vec<PolicyEntry>,
    },
    RetrievePolicyImport {
        policy_id: PolicyId,
        import: PolicyImport,
    },
    RetrievePolicyImports {
        policy_id: PolicyId,
        imports: PolicyImports,
    },
    SudoRetrievePolicy {
        policy: Policy,
    },
}

/// A command accepted for persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    /// The command as adjusted during handling (e.g. lifecycle and timestamps set).
    pub command: PolicyCommand,
    /// The event to persist before replying.
    pub event: PolicyEvent,
    pub response: PolicyResponse,
    pub becomes_created: bool,
    pub becomes_deleted: bool,
    /// Tag of the addressed sub-resource before the command.
    pub previous_etag: Option<ETag>,
    /// Tag of the addressed sub-resource after the command.
    pub next_etag: Option<ETag>,
}

/// Outcome of handling one command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    Mutation(Box<Mutation>),
    Query {
        response: PolicyResponse,
        etag: Option<ETag>,
    },
    Error(DomainError),
}

impl CommandResult {
    pub fn is_error(&self) -> bool {
        matches!(self, CommandResult::Error(_))
    }

    /// Returns the event to persist, if any.
    pub fn event(&self) -> Option<&PolicyEvent> {
        match self {
            CommandResult::Mutation(mutation) => Some(&mutation.event),
            _ => None,
        }
    }

    /// Returns the response to the caller, or the error.
    pub fn into_response(self) -> Result<PolicyResponse, DomainError> {
        match self {
            CommandResult::Mutation(mutation) => Ok(mutation.response),
            CommandResult::Query { response, .. } => Ok(response),
            CommandResult::Error(error) => Err(error),
        }
    }
}
