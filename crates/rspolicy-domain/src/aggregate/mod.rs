//! Event-sourced policy aggregate.
//!
//! Command flow: command → validation → event → state. The aggregate keeps
//! the state folded from all events applied so far; its revision is the
//! number of applied events.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   handle()   ┌───────────────┐  persist   ┌─────────────┐
//! │ PolicyCommand│ ───────────▶ │ CommandResult │ ─────────▶ │ event log   │
//! └──────────────┘              │  Mutation     │            └─────────────┘
//!                               │  Query        │                  │
//!                               │  Error        │       apply()    ▼
//!                               └───────────────┘ ◀──────── PolicyAggregate
//! ```
//!
//! [`PolicyAggregate::handle`] is pure: it never changes the aggregate.
//! The owner persists the mutation's event and then calls
//! [`PolicyAggregate::apply`], which enforces strictly sequential revisions.

mod commands;
mod etag;
mod events;
mod result;
mod strategies;

use tracing::{debug, instrument};

use crate::error::{DomainError, DomainResult};
use crate::model::{Policy, PolicyId};

pub use commands::{CommandContext, PolicyCommand};
pub use etag::ETag;
pub use events::{PolicyEvent, PolicyEventPayload};
pub use result::{CommandResult, Mutation, PolicyResponse};

/// State of a single policy folded from its events.
#[derive(Debug, Clone)]
pub struct PolicyAggregate {
    policy_id: PolicyId,
    policy: Option<Policy>,
    revision: u64,
}

impl PolicyAggregate {
    /// Creates the aggregate of a policy with no events.
    pub fn new(policy_id: PolicyId) -> Self {
        Self {
            policy_id,
            policy: None,
            revision: 0,
        }
    }

    /// Rebuilds the aggregate from its full event history.
    pub fn replay<'a>(
        policy_id: PolicyId,
        events: impl IntoIterator<Item = &'a PolicyEvent>,
    ) -> DomainResult<Self> {
        let mut aggregate = Self::new(policy_id);
        for event in events {
            aggregate.apply(event)?;
        }
        Ok(aggregate)
    }

    pub fn policy_id(&self) -> &PolicyId {
        &self.policy_id
    }

    /// Number of events applied so far.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Current state, including a deleted tombstone.
    pub fn policy(&self) -> Option<&Policy> {
        self.policy.as_ref()
    }

    /// Current state if the policy exists and is not deleted.
    pub fn active_policy(&self) -> Option<&Policy> {
        self.policy.as_ref().filter(|policy| !policy.is_deleted())
    }

    /// Handles a command against the current state without changing it.
    #[instrument(skip(self, ctx, command), fields(policy_id = %self.policy_id, command = command.name()))]
    pub fn handle(&self, ctx: &CommandContext, command: PolicyCommand) -> CommandResult {
        if command.policy_id() != &self.policy_id {
            return CommandResult::Error(DomainError::PolicyNotAccessible {
                policy_id: command.policy_id().to_string(),
            });
        }
        let result = strategies::handle(self.policy.as_ref(), self.revision + 1, ctx, command);
        if let CommandResult::Error(error) = &result {
            debug!(%error, "Command rejected");
        }
        result
    }

    /// Folds `event` into the state.
    ///
    /// The event must carry exactly the next revision.
    pub fn apply(&mut self, event: &PolicyEvent) -> DomainResult<()> {
        if event.policy_id != self.policy_id {
            return Err(DomainError::EventNotApplicable {
                policy_id: self.policy_id.to_string(),
                event: event.name(),
                reason: "event belongs to another policy",
            });
        }
        let expected = self.revision + 1;
        if event.revision != expected {
            return Err(DomainError::RevisionMismatch {
                policy_id: self.policy_id.to_string(),
                expected,
                actual: event.revision,
            });
        }

        let next = event.apply_to(self.policy.as_ref())?;
        self.policy = Some(next);
        self.revision = event.revision;
        Ok(())
    }
}
