//! Read path for consumers that need the enforcer of a policy.
//!
//! A consumer knows the revision it needs, e.g. the revision of the event it
//! is processing. [`EnforcementReader::read_enforcer`] reads the enforcer
//! cache and, if the cached entry is missing or older than that revision,
//! reloads exactly once after a delay. The second answer is final, whatever
//! its revision, so a read never costs more than one extra round-trip.
//!
//! Cache errors never reach the consumer: they degrade to
//! [`Entry::nonexistent`], i.e. "no enforcer".

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use rspolicy_domain::enforcer::PolicyEnforcer;
use rspolicy_domain::{EnforcerCache, Entry, PolicyCache, PolicyEvent, PolicyId};
use tracing::{debug, instrument, warn};

/// What a consumer knows about the policy it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnforcementMetadata {
    pub policy_id: PolicyId,
    /// Minimum acceptable policy revision. Without one, any cached entry is
    /// considered stale on the first read.
    pub min_revision: Option<u64>,
}

impl EnforcementMetadata {
    pub fn new(policy_id: PolicyId) -> Self {
        Self {
            policy_id,
            min_revision: None,
        }
    }

    pub fn with_min_revision(mut self, revision: u64) -> Self {
        self.min_revision = Some(revision);
        self
    }

    /// Metadata requiring at least the revision of `event`.
    pub fn from_event(event: &PolicyEvent) -> Self {
        Self::new(event.policy_id.clone()).with_min_revision(event.revision)
    }
}

/// Whether a read at `iteration` must drop `entry` and reload.
///
/// Only the first read (iteration 0) may reload.
pub fn should_reload<T>(entry: Option<&Entry<T>>, metadata: &EnforcementMetadata, iteration: u32) -> bool {
    if iteration > 0 {
        return false;
    }
    match entry {
        None => true,
        Some(entry) => {
            !entry.exists() || entry.revision() < metadata.min_revision.unwrap_or(u64::MAX)
        }
    }
}

type ReadFuture<'a> = Pin<Box<dyn Future<Output = Entry<Arc<PolicyEnforcer>>> + Send + 'a>>;

/// Reads enforcers with the single-reload staleness rule.
#[derive(Debug, Clone)]
pub struct EnforcementReader {
    policies: Arc<PolicyCache>,
    enforcers: Arc<EnforcerCache>,
    retry_delay: Duration,
}

impl EnforcementReader {
    pub fn new(policies: Arc<PolicyCache>, enforcers: Arc<EnforcerCache>, retry_delay: Duration) -> Self {
        Self {
            policies,
            enforcers,
            retry_delay,
        }
    }

    /// Returns the enforcer for `metadata`, or a nonexistent entry.
    #[instrument(skip(self), fields(policy_id = %metadata.policy_id, min_revision = ?metadata.min_revision))]
    pub async fn read_enforcer(&self, metadata: &EnforcementMetadata) -> Entry<Arc<PolicyEnforcer>> {
        self.read(metadata, 0).await
    }

    fn read<'a>(&'a self, metadata: &'a EnforcementMetadata, iteration: u32) -> ReadFuture<'a> {
        Box::pin(async move {
            let entry = match self.enforcers.get(&metadata.policy_id).await {
                Ok(entry) => Some(entry),
                Err(error) => {
                    warn!(iteration, error = %error, "Enforcer lookup failed");
                    None
                }
            };

            if should_reload(entry.as_ref(), metadata, iteration) {
                debug!(
                    iteration,
                    cached_revision = entry.as_ref().map(Entry::revision),
                    "Cached enforcer stale, reloading once"
                );
                metrics::counter!("rspolicy_enforcement_reloads_total").increment(1);
                // The enforcer is rebuilt from the policy cache, so the raw
                // policy must be refreshed too.
                self.policies.evict(&metadata.policy_id).await;
                self.enforcers.invalidate(&metadata.policy_id).await;
                tokio::time::sleep(self.retry_delay).await;
                return self.read(metadata, iteration + 1).await;
            }

            entry
                .filter(Entry::exists)
                .unwrap_or_else(Entry::nonexistent)
        })
    }
}

/// Registers enforcement metrics descriptions.
pub fn register_enforcement_metrics() {
    metrics::describe_counter!(
        "rspolicy_enforcement_reloads_total",
        "Total number of enforcer reloads caused by stale or missing entries"
    );
}
