//! Service-level errors.

use rspolicy_domain::{DomainError, PolicyId};
use rspolicy_storage::StorageError;
use thiserror::Error;

/// Errors of the policy service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A command was rejected or a domain operation failed.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The event journal failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The owner of a policy stopped before replying.
    #[error("policy owner unavailable: {policy_id}")]
    OwnerUnavailable { policy_id: String },

    /// The owner of a policy did not reply in time.
    #[error("policy owner of {policy_id} did not reply within {duration_ms}ms")]
    AskTimeout { policy_id: String, duration_ms: u64 },
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    /// Converts into the domain error reported by a cache load of `policy_id`.
    pub fn into_domain(self, policy_id: &PolicyId) -> DomainError {
        match self {
            ServiceError::Domain(error) => error,
            ServiceError::AskTimeout { duration_ms, .. } => DomainError::Timeout { duration_ms },
            other => DomainError::CacheLoadFailed {
                policy_id: policy_id.to_string(),
                message: other.to_string(),
            },
        }
    }
}
