//! rspolicy-server: Policy owners, cache wiring and the enforcement read path
//!
//! This crate connects the domain crate to storage and to its consumers:
//! - Per-policy single-writer owners backed by the event journal
//! - The in-process policy change feed
//! - The cache updater applying changes to the caches
//! - The enforcement reader with its single-reload rule
//! - Configuration and logging
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 rspolicy-server                 │
//! ├─────────────────────────────────────────────────┤
//! │  config.rs        - Configuration management    │
//! │  observability.rs - Logging setup               │
//! │  adapters.rs      - Events <-> journal records  │
//! │  policies/        - Per-policy owners           │
//! │  feed.rs          - Policy change feed          │
//! │  cache_update.rs  - Feed -> cache invalidation  │
//! │  enforcement.rs   - Enforcer read path          │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod adapters;
pub mod cache_update;
pub mod config;
pub mod enforcement;
pub mod error;
pub mod feed;
pub mod observability;
pub mod policies;

use std::sync::Arc;

use rspolicy_domain::cache::ImportDependencyTracker;
use rspolicy_domain::enforcer::{EnforcerBuilder, EntryEnforcerBuilder, PolicyEnforcer};
use rspolicy_domain::{CommandResult, EnforcerCache, Entry, PolicyCache, PolicyCommand};
use rspolicy_storage::EventJournal;
use tokio::task::JoinHandle;
use tracing::info;

use cache_update::CacheUpdater;
use enforcement::{EnforcementMetadata, EnforcementReader};
use feed::PolicyChangeFeed;
use policies::{PolicyConfig, PolicyOwners};

// Re-exports for convenience
pub use config::{ConfigLoadError, ServerConfig};
pub use error::{ServiceError, ServiceResult};

/// The assembled policy service.
///
/// Commands go to the owners; every persisted change flows through the feed
/// into the caches; consumers read enforcers through the reader.
#[derive(Debug)]
pub struct PolicyService {
    owners: Arc<PolicyOwners>,
    policies: Arc<PolicyCache>,
    enforcers: Arc<EnforcerCache>,
    reader: EnforcementReader,
    updater: JoinHandle<()>,
}

impl PolicyService {
    /// Starts the service with the default enforcer builder.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(config: &ServerConfig, journal: Arc<dyn EventJournal>) -> Self {
        Self::start_with_builder(config, journal, Arc::new(EntryEnforcerBuilder))
    }

    /// Starts the service building enforcers with `builder`.
    pub fn start_with_builder(
        config: &ServerConfig,
        journal: Arc<dyn EventJournal>,
        builder: Arc<dyn EnforcerBuilder>,
    ) -> Self {
        let feed = PolicyChangeFeed::default();
        let changes = feed.subscribe();
        let owners = Arc::new(PolicyOwners::new(journal, feed, PolicyConfig::from(config)));

        let caches = &config.caches;
        let policies = Arc::new(PolicyCache::new(
            &caches.policy.to_cache_config(),
            owners.clone(),
            Arc::new(ImportDependencyTracker::new()),
            caches.ask_timeout(),
        ));
        let enforcers = EnforcerCache::new(
            &caches.enforcer.to_cache_config(),
            Arc::clone(&policies),
            builder,
            caches.blocking_lookups,
            caches.ask_timeout(),
        );

        let updater =
            CacheUpdater::new(Arc::clone(&policies), Arc::clone(&enforcers)).spawn(changes);
        let reader = EnforcementReader::new(
            Arc::clone(&policies),
            Arc::clone(&enforcers),
            caches.retry_delay(),
        );

        info!(
            ask_timeout_ms = caches.ask_timeout_ms,
            retry_delay_ms = caches.retry_delay_ms,
            "Policy service started"
        );
        Self {
            owners,
            policies,
            enforcers,
            reader,
            updater,
        }
    }

    /// Sends a command to the owner of its policy.
    pub async fn ask(&self, command: PolicyCommand) -> ServiceResult<CommandResult> {
        self.owners.ask(command).await
    }

    /// Reads the enforcer of a policy, reloading once if stale.
    pub async fn read_enforcer(&self, metadata: &EnforcementMetadata) -> Entry<Arc<PolicyEnforcer>> {
        self.reader.read_enforcer(metadata).await
    }

    pub fn owners(&self) -> &Arc<PolicyOwners> {
        &self.owners
    }

    pub fn policy_cache(&self) -> &Arc<PolicyCache> {
        &self.policies
    }

    pub fn enforcer_cache(&self) -> &Arc<EnforcerCache> {
        &self.enforcers
    }

    pub fn reader(&self) -> &EnforcementReader {
        &self.reader
    }

    /// Stops the cache updater.
    pub fn shutdown(self) {
        self.updater.abort();
        info!("Policy service stopped");
    }
}
