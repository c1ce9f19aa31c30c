//! Seams between the caches and the rest of the system.

use async_trait::async_trait;

use crate::error::DomainResult;
use crate::model::{Policy, PolicyId};

/// Response of the process owning a policy to a privileged retrieve.
#[derive(Debug, Clone, PartialEq)]
pub enum RetrieveResponse {
    /// The current state of the policy.
    Policy(Policy),
    /// The policy does not exist or is deleted.
    NotAccessible,
}

/// Request/response access to the owner of a policy aggregate.
///
/// Implementations ask the single writer of `policy_id`; they are expected
/// to bound the call themselves or rely on the caller's timeout.
#[async_trait]
pub trait PolicyRetriever: Send + Sync {
    async fn sudo_retrieve_policy(&self, policy_id: &PolicyId) -> DomainResult<RetrieveResponse>;
}

/// Receives invalidations for a policy id.
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate(&self, policy_id: &PolicyId);
}
