//! Cache of enforcers built from merged policy entries.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use crate::enforcer::{EnforcerBuilder, PolicyEnforcer};
use crate::error::{DomainError, DomainResult};
use crate::model::{Policy, PolicyId};
use crate::resolver::{merge_imported_entries, PolicyLookup};

use super::{build_cache, CacheConfig, CacheInvalidator, Entry, PolicyCache};

/// Synchronous lookup of imported policies through the policy cache.
///
/// Each lookup blocks the current thread on the cache's future, so it must
/// only be used from a blocking thread (see [`tokio::task::spawn_blocking`]).
/// Load failures and timeouts are treated as an absent policy.
pub struct BlockingPolicyLookup {
    policies: Arc<PolicyCache>,
    handle: Handle,
    timeout: Duration,
}

impl BlockingPolicyLookup {
    pub fn new(policies: Arc<PolicyCache>, handle: Handle, timeout: Duration) -> Self {
        Self {
            policies,
            handle,
            timeout,
        }
    }
}

impl PolicyLookup for BlockingPolicyLookup {
    fn lookup(&self, policy_id: &PolicyId) -> Option<Policy> {
        let policies = &self.policies;
        let timeout = self.timeout;
        let result = self
            .handle
            .block_on(async { tokio::time::timeout(timeout, policies.get(policy_id)).await });

        match result {
            Ok(Ok(entry)) => entry.into_value(),
            Ok(Err(error)) => {
                warn!(policy_id = %policy_id, error = %error, "Imported policy lookup failed");
                None
            }
            Err(_) => {
                warn!(policy_id = %policy_id, timeout_ms = timeout.as_millis() as u64, "Imported policy lookup timed out");
                None
            }
        }
    }
}

/// Cache of [`PolicyEnforcer`]s keyed by the merging policy's id.
///
/// An entry carries the revision of the top-level policy, although its
/// content also depends on the imported policies. Staleness caused by an
/// import is handled by the cascade from the [`ImportDependencyTracker`].
///
/// Merges run on Tokio's blocking pool, bounded by a semaphore, because
/// resolving imports blocks on the policy cache.
///
/// [`ImportDependencyTracker`]: super::ImportDependencyTracker
pub struct EnforcerCache {
    cache: Cache<PolicyId, Entry<Arc<PolicyEnforcer>>>,
    policies: Arc<PolicyCache>,
    builder: Arc<dyn EnforcerBuilder>,
    blocking_permits: Arc<Semaphore>,
    ask_timeout: Duration,
}

impl fmt::Debug for EnforcerCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnforcerCache")
            .field("entry_count", &self.cache.entry_count())
            .field("available_permits", &self.blocking_permits.available_permits())
            .finish()
    }
}

impl EnforcerCache {
    /// Creates the cache and subscribes it to direct and cascaded
    /// invalidations of `policies`.
    pub fn new(
        config: &CacheConfig,
        policies: Arc<PolicyCache>,
        builder: Arc<dyn EnforcerBuilder>,
        blocking_lookups: usize,
        ask_timeout: Duration,
    ) -> Arc<Self> {
        let cache = Arc::new(Self {
            cache: build_cache("enforcer-cache", config),
            policies: Arc::clone(&policies),
            builder,
            blocking_permits: Arc::new(Semaphore::new(blocking_lookups.max(1))),
            ask_timeout,
        });

        let invalidator: Arc<dyn CacheInvalidator> = cache.clone();
        policies.subscribe(Arc::downgrade(&invalidator));
        policies.tracker().subscribe(Arc::downgrade(&invalidator));
        cache
    }

    /// Returns the enforcer of `policy_id`, building it on a miss.
    #[instrument(skip(self), fields(policy_id = %policy_id))]
    pub async fn get(&self, policy_id: &PolicyId) -> DomainResult<Entry<Arc<PolicyEnforcer>>> {
        if let Some(entry) = self.cache.get(policy_id).await {
            metrics::counter!("rspolicy_enforcer_cache_hits_total").increment(1);
            return Ok(entry);
        }
        metrics::counter!("rspolicy_enforcer_cache_misses_total").increment(1);

        self.cache
            .try_get_with(policy_id.clone(), self.load(policy_id))
            .await
            .map_err(|error| (*error).clone())
    }

    /// Returns the cached entry without loading.
    pub async fn get_if_present(&self, policy_id: &PolicyId) -> Option<Entry<Arc<PolicyEnforcer>>> {
        self.cache.get(policy_id).await
    }

    /// Evicts the entry of `policy_id` only.
    pub async fn invalidate(&self, policy_id: &PolicyId) {
        debug!(policy_id = %policy_id, "Invalidating enforcer");
        self.cache.invalidate(policy_id).await;
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }

    async fn load(&self, policy_id: &PolicyId) -> DomainResult<Entry<Arc<PolicyEnforcer>>> {
        let entry = self.policies.get(policy_id).await?;
        let revision = entry.revision();
        let Some(policy) = entry.into_value() else {
            return Ok(Entry::nonexistent());
        };

        let permit = Arc::clone(&self.blocking_permits)
            .acquire_owned()
            .await
            .map_err(|error| DomainError::CacheLoadFailed {
                policy_id: policy_id.to_string(),
                message: error.to_string(),
            })?;

        let lookup = BlockingPolicyLookup::new(
            Arc::clone(&self.policies),
            Handle::current(),
            self.ask_timeout,
        );
        let builder = Arc::clone(&self.builder);
        let enforcer = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let entries = merge_imported_entries(&policy, &lookup);
            debug!(
                policy_id = %policy.id(),
                revision,
                entry_count = entries.len(),
                "Building enforcer from merged entries"
            );
            PolicyEnforcer::build(policy.id().clone(), revision, entries, builder.as_ref())
        })
        .await
        .map_err(|error| DomainError::CacheLoadFailed {
            policy_id: policy_id.to_string(),
            message: error.to_string(),
        })?;

        Ok(Entry::of(revision, Arc::new(enforcer)))
    }
}

#[async_trait]
impl CacheInvalidator for EnforcerCache {
    async fn invalidate(&self, policy_id: &PolicyId) {
        EnforcerCache::invalidate(self, policy_id).await;
    }
}
