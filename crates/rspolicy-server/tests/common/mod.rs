//! Shared helpers for rspolicy-server integration tests.

// Helpers are used by different test files; each file is compiled on its own.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rspolicy_domain::cache::{ImportDependencyTracker, PolicyRetriever, RetrieveResponse};
use rspolicy_domain::enforcer::EntryEnforcerBuilder;
use rspolicy_domain::model::{
    EffectedPermissions, Label, Policy, PolicyEntry, PolicyImport, PolicyImports, Resource,
    ResourceKey, Subject, SubjectId,
};
use rspolicy_domain::{
    CacheConfig, CommandResult, DomainResult, EnforcerCache, PolicyCache, PolicyCommand,
    PolicyEvent, PolicyId,
};
use rspolicy_server::enforcement::EnforcementReader;
use rspolicy_server::feed::PolicyChangeFeed;
use rspolicy_server::policies::{PolicyConfig, PolicyOwners};
use rspolicy_server::{PolicyService, ServerConfig};
use rspolicy_storage::MemoryEventJournal;

/// Timeout for asks and blocking lookups in tests.
pub const ASK_TIMEOUT: Duration = Duration::from_secs(2);

/// Maximum time to wait for the cache updater to catch up.
pub const INVALIDATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between polling attempts.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub fn id(value: &str) -> PolicyId {
    PolicyId::parse(value).unwrap()
}

pub fn sid(value: &str) -> SubjectId {
    SubjectId::parse(value).unwrap()
}

pub fn key(value: &str) -> ResourceKey {
    ResourceKey::parse(value).unwrap()
}

/// Entry granting `grant` on `resource` to `subject`.
pub fn entry(label: &str, subject: &str, resource: &str, grant: &[&str]) -> PolicyEntry {
    PolicyEntry::new(
        Label::new(label).unwrap(),
        [Subject::new(sid(subject), "generated")],
        [Resource::new(
            key(resource),
            EffectedPermissions::new(grant.iter().copied(), Vec::<String>::new()),
        )],
    )
}

/// Entry whose only subject expires at `expiry`.
pub fn expiring_entry(label: &str, subject: &str, expiry: DateTime<Utc>) -> PolicyEntry {
    PolicyEntry::new(
        Label::new(label).unwrap(),
        [Subject::new(sid(subject), "generated").with_expiry(expiry)],
        [Resource::new(
            key("thing:/"),
            EffectedPermissions::new(["READ"], Vec::<String>::new()),
        )],
    )
}

pub fn policy(policy_id: &str, entries: impl IntoIterator<Item = PolicyEntry>) -> Policy {
    Policy::builder(id(policy_id)).set_entries(entries).build()
}

pub fn imports(imported: &[&str]) -> PolicyImports {
    PolicyImports::new(imported.iter().map(|i| PolicyImport::new(id(i)))).unwrap()
}

/// Test configuration with short delays.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.caches.ask_timeout_ms = ASK_TIMEOUT.as_millis() as u64;
    config.caches.retry_delay_ms = 1;
    config
}

pub fn start_service() -> PolicyService {
    PolicyService::start(&test_config(), MemoryEventJournal::new_shared())
}

/// Sends `command` and returns the persisted event, panicking on rejection.
pub async fn persist(service: &PolicyService, command: PolicyCommand) -> PolicyEvent {
    match service.ask(command).await.unwrap() {
        CommandResult::Mutation(mutation) => mutation.event,
        other => panic!("expected a mutation, got {other:?}"),
    }
}

/// Polls until the enforcer of `policy_id` is no longer cached.
pub async fn wait_for_enforcer_eviction(service: &PolicyService, policy_id: &PolicyId) {
    let start = std::time::Instant::now();
    while service.enforcer_cache().get_if_present(policy_id).await.is_some() {
        assert!(
            start.elapsed() < INVALIDATION_TIMEOUT,
            "timed out waiting for enforcer of {policy_id} to be evicted"
        );
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Polls until `policy_id` is no longer in the policy cache.
pub async fn wait_for_policy_eviction(service: &PolicyService, policy_id: &PolicyId) {
    let start = std::time::Instant::now();
    while service.policy_cache().get_if_present(policy_id).await.is_some() {
        assert!(
            start.elapsed() < INVALIDATION_TIMEOUT,
            "timed out waiting for policy {policy_id} to be evicted"
        );
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Retriever counting the asks it forwards to the owners.
pub struct CountingRetriever {
    inner: Arc<PolicyOwners>,
    calls: AtomicUsize,
}

impl CountingRetriever {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PolicyRetriever for CountingRetriever {
    async fn sudo_retrieve_policy(&self, policy_id: &PolicyId) -> DomainResult<RetrieveResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.sudo_retrieve_policy(policy_id).await
    }
}

/// Caches wired to the owners without a cache updater, so no change
/// notification ever reaches them.
pub struct DetachedCaches {
    pub owners: Arc<PolicyOwners>,
    pub retriever: Arc<CountingRetriever>,
    pub policies: Arc<PolicyCache>,
    pub enforcers: Arc<EnforcerCache>,
    pub reader: EnforcementReader,
}

impl DetachedCaches {
    pub fn new() -> Self {
        let owners = Arc::new(PolicyOwners::new(
            MemoryEventJournal::new_shared(),
            PolicyChangeFeed::default(),
            PolicyConfig::default(),
        ));
        let retriever = Arc::new(CountingRetriever {
            inner: Arc::clone(&owners),
            calls: AtomicUsize::new(0),
        });
        let policies = Arc::new(PolicyCache::new(
            &CacheConfig::default(),
            retriever.clone(),
            Arc::new(ImportDependencyTracker::new()),
            ASK_TIMEOUT,
        ));
        let enforcers = EnforcerCache::new(
            &CacheConfig::default(),
            Arc::clone(&policies),
            Arc::new(EntryEnforcerBuilder),
            4,
            ASK_TIMEOUT,
        );
        let reader = EnforcementReader::new(
            Arc::clone(&policies),
            Arc::clone(&enforcers),
            Duration::from_millis(1),
        );
        Self {
            owners,
            retriever,
            policies,
            enforcers,
            reader,
        }
    }

    /// Sends `command` straight to the owners, panicking on rejection.
    pub async fn persist(&self, command: PolicyCommand) -> PolicyEvent {
        match self.owners.ask(command).await.unwrap() {
            CommandResult::Mutation(mutation) => mutation.event,
            other => panic!("expected a mutation, got {other:?}"),
        }
    }
}

/// Waits until the cache updater has applied every change published so far.
///
/// Changes are applied in feed order, so once a marker change made now has
/// evicted the marker policy, all earlier changes were applied too.
pub async fn wait_for_updater(service: &PolicyService) {
    let marker = id("com.example:updater-marker");
    service.policy_cache().get(&marker).await.unwrap();
    let exists = !service
        .ask(PolicyCommand::RetrievePolicy { policy_id: marker.clone() })
        .await
        .unwrap()
        .is_error();
    let marker_entry = entry("Marker", "google:marker", "thing:/", &["READ"]);
    let command = if exists {
        PolicyCommand::ModifyPolicyEntry {
            policy_id: marker.clone(),
            entry: marker_entry,
        }
    } else {
        PolicyCommand::CreatePolicy {
            policy: policy("com.example:updater-marker", [marker_entry]),
        }
    };
    persist(service, command).await;

    wait_for_policy_eviction(service, &marker).await;
}
