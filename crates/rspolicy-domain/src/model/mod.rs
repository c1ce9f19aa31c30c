//! Policy model types.
//!
//! This module contains:
//! - Identifier types (PolicyId, Label, SubjectId, ResourceKey)
//! - Entries with their subjects and resources
//! - Imports and their include/exclude filters
//! - The Policy document and its builder

mod entry;
mod imports;
mod policy;
mod types;
#[cfg(test)]
mod types_proptest;

pub use entry::{EffectedPermissions, PolicyEntry, Resource, Subject};
pub use imports::{EffectedImports, PolicyImport, PolicyImports};
pub use policy::{Lifecycle, Policy, PolicyBuilder};
pub use types::*;
