//! The task owning one policy aggregate.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use rspolicy_domain::validation::SizeLimit;
use rspolicy_domain::{CommandContext, CommandResult, PolicyAggregate, PolicyCommand, PolicyId};
use rspolicy_storage::{EventJournal, StorageError};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, instrument};

use crate::adapters::{from_stored_event, persistence_id, to_stored_event};
use crate::error::{ServiceError, ServiceResult};
use crate::feed::{PolicyChanged, PolicyChangeFeed};

use super::PolicyConfig;

/// A command together with the channel for its reply.
pub(crate) struct Envelope {
    pub command: PolicyCommand,
    pub reply: oneshot::Sender<ServiceResult<CommandResult>>,
}

/// Single writer of one policy.
///
/// Commands arrive through the mailbox and are handled strictly one after
/// another. A mutation is appended to the journal before it is applied and
/// before the reply is sent.
pub(crate) struct PolicyOwner {
    aggregate: PolicyAggregate,
    journal: Arc<dyn EventJournal>,
    feed: PolicyChangeFeed,
    size_limit: SizeLimit,
}

impl PolicyOwner {
    /// Rebuilds the aggregate of `policy_id` from its journal.
    #[instrument(skip(journal, feed, size_limit), fields(policy_id = %policy_id))]
    pub(crate) async fn recover(
        policy_id: PolicyId,
        journal: Arc<dyn EventJournal>,
        feed: PolicyChangeFeed,
        size_limit: SizeLimit,
    ) -> ServiceResult<Self> {
        let stored = journal.read_events(&persistence_id(&policy_id), 1).await?;
        let events = stored
            .into_iter()
            .map(from_stored_event)
            .collect::<Result<Vec<_>, StorageError>>()?;
        let aggregate = PolicyAggregate::replay(policy_id, &events)?;

        info!(revision = aggregate.revision(), "Policy owner recovered");
        Ok(Self {
            aggregate,
            journal,
            feed,
            size_limit,
        })
    }

    /// Handles one command.
    #[instrument(skip(self, command), fields(policy_id = %self.aggregate.policy_id(), command = command.name()))]
    pub(crate) async fn handle(&mut self, command: PolicyCommand) -> ServiceResult<CommandResult> {
        let ctx = CommandContext::new(Utc::now(), self.size_limit);
        let result = self.aggregate.handle(&ctx, command);

        if let CommandResult::Mutation(mutation) = &result {
            let event = &mutation.event;
            self.journal.append(to_stored_event(event)?).await?;
            self.aggregate.apply(event)?;
            debug!(revision = event.revision, event = event.name(), "Persisted event");
            self.feed.publish(PolicyChanged::from_event(event));
        }
        Ok(result)
    }

    /// Processes the mailbox until the owner goes idle or every sender is
    /// dropped.
    ///
    /// The owner stops after `idle_timeout` without commands, and right after
    /// a command for a policy that was never persisted. Commands already
    /// queued at that point are still handled.
    pub(crate) async fn run(
        mut self,
        mut mailbox: mpsc::Receiver<Envelope>,
        idle_timeout: Duration,
    ) {
        loop {
            let envelope = match tokio::time::timeout(idle_timeout, mailbox.recv()).await {
                Ok(Some(envelope)) => envelope,
                Ok(None) => break,
                Err(_) => {
                    debug!(policy_id = %self.aggregate.policy_id(), "Policy owner idle");
                    mailbox.close();
                    continue;
                }
            };
            let result = self.handle(envelope.command).await;
            // The asker may have timed out
            let _ = envelope.reply.send(result);

            if self.aggregate.revision() == 0 {
                mailbox.close();
            }
        }
        debug!(policy_id = %self.aggregate.policy_id(), "Policy owner stopped");
    }
}

/// Runs the owner of `policy_id` and unregisters it from `owners` once it
/// stops.
///
/// If recovery fails, the queued commands are answered with the error and
/// the mailbox is closed, so that the next command starts a fresh owner.
pub(crate) async fn run_owner(
    policy_id: PolicyId,
    owners: Weak<DashMap<PolicyId, mpsc::Sender<Envelope>>>,
    journal: Arc<dyn EventJournal>,
    feed: PolicyChangeFeed,
    config: PolicyConfig,
    mut mailbox: mpsc::Receiver<Envelope>,
) {
    match PolicyOwner::recover(policy_id.clone(), journal, feed, config.size_limit).await {
        Ok(owner) => owner.run(mailbox, config.idle_timeout).await,
        Err(recovery_error) => {
            error!(policy_id = %policy_id, error = %recovery_error, "Policy owner recovery failed");
            let message = recovery_error.to_string();
            mailbox.close();
            while let Some(envelope) = mailbox.recv().await {
                let _ = envelope.reply.send(Err(ServiceError::Storage(
                    StorageError::InternalError {
                        message: message.clone(),
                    },
                )));
            }
        }
    }

    // A replacement owner may already be registered under the same id
    if let Some(owners) = owners.upgrade() {
        owners.remove_if(&policy_id, |_, sender| sender.is_closed());
    }
}
