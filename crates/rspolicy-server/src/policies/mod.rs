//! Per-policy single writers.
//!
//! Every policy id is owned by one Tokio task holding its aggregate. All
//! commands for that id go through the task's bounded mailbox, so commands
//! for one policy are queued and never interleaved, while different
//! policies proceed in parallel. Idle owners stop and unregister
//! themselves; the next command recovers a fresh owner from the journal.
//!
//! ```text
//!  ask(cmd) ──▶ PolicyOwners ──mpsc──▶ owner task (policy A) ──append──▶ journal
//!     ▲           (DashMap)  ──mpsc──▶ owner task (policy B)       │
//!     └──────────── oneshot reply ◀──────────────┘                  ▼
//!                                                           PolicyChangeFeed
//! ```

mod owner;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rspolicy_domain::aggregate::PolicyResponse;
use rspolicy_domain::cache::{PolicyRetriever, RetrieveResponse};
use rspolicy_domain::validation::SizeLimit;
use rspolicy_domain::{CommandResult, DomainError, DomainResult, PolicyCommand, PolicyId};
use rspolicy_storage::EventJournal;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::config::ServerConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::feed::PolicyChangeFeed;

use owner::{run_owner, Envelope};

/// Settings of the policy owners.
#[derive(Debug, Clone, Copy)]
pub struct PolicyConfig {
    pub size_limit: SizeLimit,
    pub mailbox_capacity: usize,
    pub ask_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            size_limit: SizeLimit::default(),
            mailbox_capacity: 64,
            ask_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&ServerConfig> for PolicyConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            size_limit: config.policies.size_limit(),
            mailbox_capacity: config.policies.mailbox_capacity,
            ask_timeout: config.caches.ask_timeout(),
            idle_timeout: config.policies.idle_timeout(),
        }
    }
}

/// Registry routing commands to the owner of each policy.
///
/// Owners are started on the first command for their id and recover their
/// state from the journal.
pub struct PolicyOwners {
    owners: Arc<DashMap<PolicyId, mpsc::Sender<Envelope>>>,
    journal: Arc<dyn EventJournal>,
    feed: PolicyChangeFeed,
    config: PolicyConfig,
}

impl fmt::Debug for PolicyOwners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyOwners")
            .field("owner_count", &self.owners.len())
            .field("config", &self.config)
            .finish()
    }
}

impl PolicyOwners {
    pub fn new(journal: Arc<dyn EventJournal>, feed: PolicyChangeFeed, config: PolicyConfig) -> Self {
        Self {
            owners: Arc::new(DashMap::new()),
            journal,
            feed,
            config,
        }
    }

    pub fn feed(&self) -> &PolicyChangeFeed {
        &self.feed
    }

    /// Number of running owners.
    pub fn owner_count(&self) -> usize {
        self.owners.len()
    }

    /// Sends `command` to the owner of its policy and waits for the result.
    ///
    /// Fails with [`ServiceError::AskTimeout`] if the command is not queued
    /// and answered within the configured ask timeout. The command may still
    /// be applied.
    pub async fn ask(&self, command: PolicyCommand) -> ServiceResult<CommandResult> {
        let policy_id = command.policy_id().clone();

        let delivery = self.deliver(&policy_id, command);
        match tokio::time::timeout(self.config.ask_timeout, delivery).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::AskTimeout {
                policy_id: policy_id.to_string(),
                duration_ms: self.config.ask_timeout.as_millis() as u64,
            }),
        }
    }

    /// Queues `command` at the owner of `policy_id` and waits for the reply.
    async fn deliver(
        &self,
        policy_id: &PolicyId,
        command: PolicyCommand,
    ) -> ServiceResult<CommandResult> {
        let (reply, response) = oneshot::channel();
        let mut envelope = Envelope { command, reply };

        // An owner that stopped in the meantime refuses the envelope; the
        // next attempt starts a new one.
        while let Err(SendError(refused)) = self.mailbox(policy_id).send(envelope).await {
            envelope = refused;
            tokio::task::yield_now().await;
        }

        response.await.map_err(|_| ServiceError::OwnerUnavailable {
            policy_id: policy_id.to_string(),
        })?
    }

    /// Returns the mailbox of the owner of `policy_id`, starting the owner
    /// if it is not running.
    fn mailbox(&self, policy_id: &PolicyId) -> mpsc::Sender<Envelope> {
        match self.owners.entry(policy_id.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_closed() {
                    let sender = self.spawn_owner(policy_id);
                    entry.insert(sender.clone());
                    sender
                } else {
                    entry.get().clone()
                }
            }
            Entry::Vacant(entry) => entry.insert(self.spawn_owner(policy_id)).clone(),
        }
    }

    fn spawn_owner(&self, policy_id: &PolicyId) -> mpsc::Sender<Envelope> {
        debug!(policy_id = %policy_id, "Starting policy owner");
        let (sender, mailbox) = mpsc::channel(self.config.mailbox_capacity.max(1));
        tokio::spawn(run_owner(
            policy_id.clone(),
            Arc::downgrade(&self.owners),
            Arc::clone(&self.journal),
            self.feed.clone(),
            self.config,
            mailbox,
        ));
        sender
    }
}

#[async_trait]
impl PolicyRetriever for PolicyOwners {
    async fn sudo_retrieve_policy(&self, policy_id: &PolicyId) -> DomainResult<RetrieveResponse> {
        let command = PolicyCommand::SudoRetrievePolicy {
            policy_id: policy_id.clone(),
        };
        match self.ask(command).await {
            Ok(CommandResult::Query {
                response: PolicyResponse::SudoRetrievePolicy { policy },
                ..
            }) => Ok(RetrieveResponse::Policy(policy)),
            Ok(CommandResult::Error(DomainError::PolicyNotAccessible { .. })) => {
                Ok(RetrieveResponse::NotAccessible)
            }
            Ok(CommandResult::Error(error)) => Err(error),
            Ok(other) => Err(DomainError::CacheLoadFailed {
                policy_id: policy_id.to_string(),
                message: format!("unexpected response to privileged retrieve: {other:?}"),
            }),
            Err(error) => Err(error.into_domain(policy_id)),
        }
    }
}
