//! Domain error types for policy operations.

use thiserror::Error;

/// Domain-specific errors for policy operations.
///
/// Errors are `Clone` so that a single failed cache load can be handed to
/// every waiter of the in-flight load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Invalid policy identifier.
    #[error("invalid policy id '{value}': {reason}")]
    InvalidPolicyId { value: String, reason: &'static str },

    /// Invalid entry label.
    #[error("invalid label '{value}': {reason}")]
    InvalidLabel { value: String, reason: &'static str },

    /// Invalid subject identifier.
    #[error("invalid subject id '{value}': {reason}")]
    InvalidSubjectId { value: String, reason: &'static str },

    /// Invalid resource key.
    #[error("invalid resource key '{value}': {reason}")]
    InvalidResourceKey { value: String, reason: &'static str },

    /// The same policy was imported twice.
    #[error("policy '{imported_policy_id}' is imported more than once")]
    DuplicateImport { imported_policy_id: String },

    /// Structural validation of a policy failed.
    #[error("policy '{policy_id}' is invalid: {message}")]
    PolicyInvalid { policy_id: String, message: String },

    /// Serialized policy exceeds the configured maximum.
    #[error("policy '{policy_id}' is too large: {actual} bytes (max: {max} bytes)")]
    PolicyTooLarge {
        policy_id: String,
        actual: usize,
        max: usize,
    },

    /// A command would introduce or keep a subject whose expiry has passed.
    #[error("subject '{subject_id}' in entry '{label}' of policy '{policy_id}' has already expired")]
    SubjectAlreadyExpired {
        policy_id: String,
        label: String,
        subject_id: String,
    },

    /// Policy does not exist or is deleted.
    #[error("policy '{policy_id}' is not accessible")]
    PolicyNotAccessible { policy_id: String },

    /// Policy already exists.
    #[error("policy '{policy_id}' already exists")]
    PolicyConflict { policy_id: String },

    /// Entry not found in policy.
    #[error("entry '{label}' not found in policy '{policy_id}'")]
    PolicyEntryNotFound { policy_id: String, label: String },

    /// The last entry of a policy cannot be removed.
    #[error("entry '{label}' is the last entry of policy '{policy_id}' and cannot be deleted")]
    PolicyEntryNotDeletable { policy_id: String, label: String },

    /// Import not found in policy.
    #[error("import of '{imported_policy_id}' not found in policy '{policy_id}'")]
    PolicyImportNotFound {
        policy_id: String,
        imported_policy_id: String,
    },

    /// Policy has no imports.
    #[error("policy '{policy_id}' has no imports")]
    PolicyImportsNotFound { policy_id: String },

    /// Event revision does not follow the aggregate revision.
    #[error("event for policy '{policy_id}' has revision {actual}, expected {expected}")]
    RevisionMismatch {
        policy_id: String,
        expected: u64,
        actual: u64,
    },

    /// Event cannot be applied to the current state.
    #[error("event '{event}' cannot be applied to policy '{policy_id}': {reason}")]
    EventNotApplicable {
        policy_id: String,
        event: &'static str,
        reason: &'static str,
    },

    /// Loading a cache entry failed.
    #[error("cache load for '{policy_id}' failed: {message}")]
    CacheLoadFailed { policy_id: String, message: String },

    /// Timeout while waiting for a response.
    #[error("timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Serialization of a model value failed.
    #[error("serialization error: {message}")]
    Serialization { message: String },
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Serialization {
            message: err.to_string(),
        }
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
