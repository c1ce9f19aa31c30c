//! Two-tier policy caching with cascading invalidation.
//!
//! This module provides the raw [`PolicyCache`], the derived
//! [`EnforcerCache`] and the [`ImportDependencyTracker`] connecting them.
//!
//! # Architecture
//!
//! ```text
//!                     invalidate(K)
//!  ┌──────────────┐ ───────────────────────────────▶ ┌───────────────┐
//!  │ PolicyCache  │        direct (same key)         │ EnforcerCache │
//!  │  moka cache  │                                  │  moka cache   │
//!  └──────┬───────┘                                  └───────▲───────┘
//!         │ on load: record "imported → importer"            │
//!         ▼                                                  │
//!  ┌───────────────────────┐   on_invalidate(K): every importer of K
//!  │ ImportDependencyTracker│ ─────────────────────────────────┘
//!  └───────────────────────┘            (one hop)
//! ```
//!
//! Both caches load single-flight per key through Moka's `try_get_with`:
//! concurrent requests for one key share a single in-flight load, and a
//! failed load is returned to every waiter without being cached.
//!
//! # Entries
//!
//! Cached values are wrapped in [`Entry`], which carries the revision of the
//! value it represents. A policy that does not exist is cached as
//! [`Entry::nonexistent`], a valid fact distinct from "not loaded yet".
//!
//! # Example
//!
//! ```rust,ignore
//! use rspolicy_domain::cache::{CacheConfig, EnforcerCache, ImportDependencyTracker, PolicyCache};
//! use rspolicy_domain::enforcer::EntryEnforcerBuilder;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let tracker = Arc::new(ImportDependencyTracker::new());
//! let policies = Arc::new(PolicyCache::new(
//!     &CacheConfig::default(),
//!     retriever,
//!     tracker,
//!     Duration::from_secs(5),
//! ));
//! let enforcers = EnforcerCache::new(
//!     &CacheConfig::default(),
//!     policies.clone(),
//!     Arc::new(EntryEnforcerBuilder),
//!     8,
//!     Duration::from_secs(5),
//! );
//!
//! let entry = enforcers.get(&policy_id).await?;
//! ```

mod cascade;
mod enforcer;
mod policy;
mod traits;

use std::hash::Hash;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant};

use moka::future::Cache;
use moka::Expiry;

pub use cascade::ImportDependencyTracker;
pub use enforcer::{BlockingPolicyLookup, EnforcerCache};
pub use policy::PolicyCache;
pub use traits::{CacheInvalidator, PolicyRetriever, RetrieveResponse};

/// A cached value together with the revision it represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<T> {
    revision: u64,
    value: Option<T>,
}

impl<T> Entry<T> {
    /// An existing value at `revision`.
    pub fn of(revision: u64, value: T) -> Self {
        Self {
            revision,
            value: Some(value),
        }
    }

    /// The cached fact that the value does not exist.
    pub fn nonexistent() -> Self {
        Self {
            revision: 0,
            value: None,
        }
    }

    /// A value that is never considered stale.
    pub fn permanent(value: T) -> Self {
        Self::of(u64::MAX, value)
    }

    pub fn exists(&self) -> bool {
        self.value.is_some()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn into_value(self) -> Option<T> {
        self.value
    }
}

/// Expiry policy of a cache. The modes are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryMode {
    /// Entries are only evicted by size or invalidation.
    Never,
    /// Expire a fixed time after the entry was written or replaced.
    AfterWrite(Duration),
    /// Expire after the entry has not been read for the given time.
    AfterAccess(Duration),
    /// Expire a fixed time after the entry was created; updates do not extend it.
    AfterCreate(Duration),
}

/// Configuration for a policy or enforcer cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries in the cache.
    pub maximum_size: u64,
    /// Expiry policy.
    pub expiry: ExpiryMode,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            maximum_size: 20_000,
            expiry: ExpiryMode::AfterWrite(Duration::from_secs(15 * 60)),
        }
    }
}

impl CacheConfig {
    /// Sets the maximum number of entries.
    pub fn with_maximum_size(mut self, maximum_size: u64) -> Self {
        self.maximum_size = maximum_size;
        self
    }

    /// Sets the expiry policy.
    pub fn with_expiry(mut self, expiry: ExpiryMode) -> Self {
        self.expiry = expiry;
        self
    }
}

/// Expiry counted from creation only.
struct ExpireAfterCreate(Duration);

impl<K, V> Expiry<K, V> for ExpireAfterCreate {
    fn expire_after_create(&self, _key: &K, _value: &V, _created_at: Instant) -> Option<Duration> {
        Some(self.0)
    }
}

/// Builds a Moka cache for `config`.
fn build_cache<K, V>(name: &str, config: &CacheConfig) -> Cache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    let builder = Cache::builder()
        .name(name)
        .max_capacity(config.maximum_size);
    match config.expiry {
        ExpiryMode::Never => builder.build(),
        ExpiryMode::AfterWrite(ttl) => builder.time_to_live(ttl).build(),
        ExpiryMode::AfterAccess(tti) => builder.time_to_idle(tti).build(),
        ExpiryMode::AfterCreate(ttl) => builder.expire_after(ExpireAfterCreate(ttl)).build(),
    }
}

/// Weakly held invalidation callbacks.
///
/// Callbacks are held weakly so that a cache subscribing to another cache
/// does not keep it alive.
#[derive(Default)]
pub(crate) struct Subscribers {
    inner: RwLock<Vec<Weak<dyn CacheInvalidator>>>,
}

impl Subscribers {
    pub(crate) fn add(&self, subscriber: Weak<dyn CacheInvalidator>) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.retain(|existing| existing.strong_count() > 0);
        inner.push(subscriber);
    }

    /// Returns the subscribers that are still alive.
    pub(crate) fn live(&self) -> Vec<Arc<dyn CacheInvalidator>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }
}

/// Registers cache metrics descriptions.
///
/// Call this function once during application startup to register metric
/// descriptions with the metrics recorder.
pub fn register_cache_metrics() {
    metrics::describe_counter!(
        "rspolicy_policy_cache_hits_total",
        "Total number of policy cache hits"
    );
    metrics::describe_counter!(
        "rspolicy_policy_cache_misses_total",
        "Total number of policy cache misses"
    );
    metrics::describe_counter!(
        "rspolicy_policy_cache_load_failures_total",
        "Total number of failed policy loads"
    );
    metrics::describe_counter!(
        "rspolicy_enforcer_cache_hits_total",
        "Total number of enforcer cache hits"
    );
    metrics::describe_counter!(
        "rspolicy_enforcer_cache_misses_total",
        "Total number of enforcer cache misses"
    );
    metrics::describe_counter!(
        "rspolicy_cascade_invalidations_total",
        "Total number of enforcer entries invalidated through an import"
    );
}
