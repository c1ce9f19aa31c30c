//! Policy validation.
//!
//! Validates that policies are structurally correct:
//! - At least one entry exists
//! - Native entry labels do not use the reserved import prefix
//! - Permission names are non-empty
//! - A policy does not import itself
//!
//! Serialized size limits live in [`size`].

pub mod size;

use crate::error::DomainError;
use crate::model::{Policy, IMPORTED_PREFIX};

pub use size::{SizeEstimate, SizeLimit};

/// Validation error types
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Policy has no entries
    NoEntries,
    /// A native entry uses the reserved import prefix
    ReservedLabelPrefix { label: String },
    /// A resource lists an empty permission name
    EmptyPermission { label: String, resource: String },
    /// The policy imports itself
    SelfImport,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::NoEntries => write!(f, "policy must contain at least one entry"),
            ValidationError::ReservedLabelPrefix { label } => write!(
                f,
                "label '{}' uses the reserved prefix '{}'",
                label, IMPORTED_PREFIX
            ),
            ValidationError::EmptyPermission { label, resource } => write!(
                f,
                "empty permission name on resource '{}' in entry '{}'",
                resource, label
            ),
            ValidationError::SelfImport => write!(f, "policy cannot import itself"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, Vec<ValidationError>>;

/// Structural validator for policies
#[derive(Debug, Default, Clone, Copy)]
pub struct PoliciesValidator;

impl PoliciesValidator {
    /// Validate the policy and return every error found
    pub fn validate(&self, policy: &Policy) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if policy.entry_count() == 0 {
            errors.push(ValidationError::NoEntries);
        }

        for entry in policy.entries() {
            if entry.label.is_imported() {
                errors.push(ValidationError::ReservedLabelPrefix {
                    label: entry.label.to_string(),
                });
            }
            for resource in &entry.resources {
                let permissions = &resource.permissions;
                if permissions
                    .grant
                    .iter()
                    .chain(permissions.revoke.iter())
                    .any(|p| p.trim().is_empty())
                {
                    errors.push(ValidationError::EmptyPermission {
                        label: entry.label.to_string(),
                        resource: resource.key.to_string(),
                    });
                }
            }
        }

        if policy
            .imports()
            .is_some_and(|imports| imports.contains(policy.id()))
        {
            errors.push(ValidationError::SelfImport);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Validate a policy, folding all errors into a single [`DomainError`].
pub fn validate(policy: &Policy) -> Result<(), DomainError> {
    PoliciesValidator.validate(policy).map_err(|errors| {
        let message = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        DomainError::PolicyInvalid {
            policy_id: policy.id().to_string(),
            message,
        }
    })
}
