//! Serialized size limits.
//!
//! A cheap upper-bound estimate is computed first. Only when the estimate
//! exceeds the limit is the value serialized to obtain its exact length.

use serde::Serialize;

use crate::error::{DomainError, DomainResult};
use crate::model::{Policy, PolicyEntry, PolicyImport, PolicyImports, Resource, Subject};

/// Allowance for a field name with quotes, colon and separator.
const FIELD_OVERHEAD: usize = 32;
/// Allowance for braces or brackets and a separator around one element.
const ELEMENT_OVERHEAD: usize = 4;
/// Allowance for a rendered number or timestamp.
const SCALAR_BOUND: usize = 64;

/// Worst case for a JSON string: every char escaped as `\uXXXX`, plus quotes.
fn str_bound(s: &str) -> usize {
    s.len() * 6 + 2
}

fn strings_bound<'a>(values: impl IntoIterator<Item = &'a String>) -> usize {
    values
        .into_iter()
        .map(|v| str_bound(v) + ELEMENT_OVERHEAD)
        .sum::<usize>()
        + ELEMENT_OVERHEAD
}

/// Upper bound of the serialized JSON length of a value.
pub trait SizeEstimate {
    fn size_upper_bound(&self) -> usize;
}

impl SizeEstimate for Subject {
    fn size_upper_bound(&self) -> usize {
        ELEMENT_OVERHEAD
            + 3 * FIELD_OVERHEAD
            + str_bound(&self.id.to_string())
            + str_bound(&self.subject_type)
            + SCALAR_BOUND
    }
}

impl SizeEstimate for Resource {
    fn size_upper_bound(&self) -> usize {
        ELEMENT_OVERHEAD
            + 3 * FIELD_OVERHEAD
            + str_bound(&self.key.to_string())
            + strings_bound(&self.permissions.grant)
            + strings_bound(&self.permissions.revoke)
    }
}

impl SizeEstimate for PolicyEntry {
    fn size_upper_bound(&self) -> usize {
        ELEMENT_OVERHEAD
            + 3 * FIELD_OVERHEAD
            + str_bound(self.label.as_str())
            + ELEMENT_OVERHEAD
            + self.subjects.iter().map(SizeEstimate::size_upper_bound).sum::<usize>()
            + ELEMENT_OVERHEAD
            + self.resources.iter().map(SizeEstimate::size_upper_bound).sum::<usize>()
    }
}

impl SizeEstimate for PolicyImport {
    fn size_upper_bound(&self) -> usize {
        ELEMENT_OVERHEAD
            + 5 * FIELD_OVERHEAD
            + str_bound(&self.imported_policy_id.to_string())
            + SCALAR_BOUND
            + strings_bound(&self.effected_imports.included)
            + strings_bound(&self.effected_imports.excluded)
    }
}

impl SizeEstimate for PolicyImports {
    fn size_upper_bound(&self) -> usize {
        ELEMENT_OVERHEAD + self.iter().map(SizeEstimate::size_upper_bound).sum::<usize>()
    }
}

impl SizeEstimate for Policy {
    fn size_upper_bound(&self) -> usize {
        ELEMENT_OVERHEAD
            + 7 * FIELD_OVERHEAD
            + str_bound(&self.id().to_string())
            + 4 * SCALAR_BOUND
            + self.imports().map_or(0, SizeEstimate::size_upper_bound)
            + ELEMENT_OVERHEAD
            + self.entries().map(SizeEstimate::size_upper_bound).sum::<usize>()
    }
}

/// Maximum serialized size of a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeLimit {
    max_bytes: usize,
}

impl SizeLimit {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Checks `value` against the limit, serializing only if the estimate is
    /// inconclusive.
    pub fn check<T>(&self, policy: &Policy, value: &T) -> DomainResult<()>
    where
        T: SizeEstimate + Serialize,
    {
        if value.size_upper_bound() <= self.max_bytes {
            return Ok(());
        }
        let actual = serde_json::to_vec(value)?.len();
        if actual > self.max_bytes {
            return Err(DomainError::PolicyTooLarge {
                policy_id: policy.id().to_string(),
                actual,
                max: self.max_bytes,
            });
        }
        Ok(())
    }
}

impl Default for SizeLimit {
    fn default() -> Self {
        Self::new(100 * 1024)
    }
}
