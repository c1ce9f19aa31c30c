//! Read-through cache of raw policies.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use tracing::{debug, instrument, warn};

use crate::error::{DomainError, DomainResult};
use crate::model::{Policy, PolicyId};

use super::{
    build_cache, CacheConfig, CacheInvalidator, Entry, ImportDependencyTracker, PolicyRetriever,
    RetrieveResponse, Subscribers,
};

/// Cache of policies keyed by id, loaded from the owning aggregate.
///
/// Every successful load records the loaded policy's imports in the
/// [`ImportDependencyTracker`]. Invalidating a key notifies direct
/// subscribers with the same key, then lets the tracker cascade to importers.
pub struct PolicyCache {
    cache: Cache<PolicyId, Entry<Policy>>,
    retriever: Arc<dyn PolicyRetriever>,
    tracker: Arc<ImportDependencyTracker>,
    subscribers: Subscribers,
    ask_timeout: Duration,
}

impl fmt::Debug for PolicyCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyCache")
            .field("entry_count", &self.cache.entry_count())
            .field("ask_timeout", &self.ask_timeout)
            .finish()
    }
}

impl PolicyCache {
    pub fn new(
        config: &CacheConfig,
        retriever: Arc<dyn PolicyRetriever>,
        tracker: Arc<ImportDependencyTracker>,
        ask_timeout: Duration,
    ) -> Self {
        Self {
            cache: build_cache("policy-cache", config),
            retriever,
            tracker,
            subscribers: Subscribers::default(),
            ask_timeout,
        }
    }

    /// Returns the cached entry, loading it from the owner on a miss.
    ///
    /// Concurrent misses for one key share a single load. Load failures and
    /// timeouts are returned to every waiter and are not cached.
    #[instrument(skip(self), fields(policy_id = %policy_id))]
    pub async fn get(&self, policy_id: &PolicyId) -> DomainResult<Entry<Policy>> {
        if let Some(entry) = self.cache.get(policy_id).await {
            metrics::counter!("rspolicy_policy_cache_hits_total").increment(1);
            return Ok(entry);
        }
        metrics::counter!("rspolicy_policy_cache_misses_total").increment(1);

        self.cache
            .try_get_with(policy_id.clone(), self.load(policy_id))
            .await
            .map_err(|error| {
                metrics::counter!("rspolicy_policy_cache_load_failures_total").increment(1);
                warn!(policy_id = %policy_id, error = %error, "Policy load failed");
                (*error).clone()
            })
    }

    /// Returns the cached entry without loading.
    pub async fn get_if_present(&self, policy_id: &PolicyId) -> Option<Entry<Policy>> {
        self.cache.get(policy_id).await
    }

    /// Registers a callback receiving every key invalidated in this cache.
    pub fn subscribe(&self, invalidator: Weak<dyn CacheInvalidator>) {
        self.subscribers.add(invalidator);
    }

    pub fn tracker(&self) -> &Arc<ImportDependencyTracker> {
        &self.tracker
    }

    /// Evicts `policy_id` and propagates the invalidation.
    #[instrument(skip(self), fields(policy_id = %policy_id))]
    pub async fn invalidate(&self, policy_id: &PolicyId) {
        self.cache.invalidate(policy_id).await;
        for subscriber in self.subscribers.live() {
            subscriber.invalidate(policy_id).await;
        }
        self.tracker.on_invalidate(policy_id).await;
    }

    /// Evicts `policy_id` without notifying subscribers or cascading.
    pub async fn evict(&self, policy_id: &PolicyId) {
        self.cache.invalidate(policy_id).await;
    }

    /// Evicts every entry without notifying subscribers.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Approximate number of entries.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Runs pending maintenance so that counts and evictions are current.
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }

    async fn load(&self, policy_id: &PolicyId) -> DomainResult<Entry<Policy>> {
        let response = tokio::time::timeout(
            self.ask_timeout,
            self.retriever.sudo_retrieve_policy(policy_id),
        )
        .await
        .map_err(|_| DomainError::Timeout {
            duration_ms: self.ask_timeout.as_millis() as u64,
        })??;

        match response {
            RetrieveResponse::Policy(policy) => {
                self.tracker.record_imports(&policy);
                debug!(revision = policy.revision(), "Loaded policy");
                Ok(Entry::of(policy.revision(), policy))
            }
            RetrieveResponse::NotAccessible => {
                debug!("Policy not accessible, caching as nonexistent");
                Ok(Entry::nonexistent())
            }
        }
    }
}

#[async_trait]
impl CacheInvalidator for PolicyCache {
    async fn invalidate(&self, policy_id: &PolicyId) {
        PolicyCache::invalidate(self, policy_id).await;
    }
}
