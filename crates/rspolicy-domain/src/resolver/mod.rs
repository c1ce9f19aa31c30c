//! Import merge resolver.
//!
//! Computes the effective entry set of a policy: its own entries plus the
//! entries contributed by every policy it imports.
//!
//! # Semantics
//!
//! - **Filters**: for each import, with `included` and `excluded` label sets:
//!   both empty imports every entry; only `included` empty imports every
//!   entry not in `excluded`; otherwise the import contributes
//!   `(labels ∩ included) \ excluded`.
//!
//! - **Relabeling**: every imported entry is relabeled to
//!   `imported-<importedPolicyId>-<label>`, so imported entries never collide
//!   with native entries or with entries of another import.
//!
//! - **Single level**: imports of an imported policy are not expanded. No
//!   cycle detection is needed because nothing recurses.
//!
//! - **Lenient**: an import whose target cannot be looked up contributes
//!   nothing. The merge itself never fails.

mod traits;
#[cfg(test)]
mod merge_proptest;
#[cfg(test)]
mod tests;

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::model::{Label, Policy, PolicyEntry, PolicyImport};

pub use traits::PolicyLookup;

/// Merges the entries of `policy` with the entries of its imports.
///
/// Labels are the dedup key of the result. Native entries are inserted
/// first and are never replaced by an imported one.
pub fn merge_imported_entries(policy: &Policy, lookup: &dyn PolicyLookup) -> BTreeSet<PolicyEntry> {
    let mut merged: BTreeMap<Label, PolicyEntry> = policy
        .entries()
        .map(|entry| (entry.label.clone(), entry.clone()))
        .collect();

    let Some(imports) = policy.imports() else {
        return merged.into_values().collect();
    };

    for import in imports {
        let Some(imported) = lookup.lookup(&import.imported_policy_id) else {
            debug!(
                policy_id = %policy.id(),
                imported_policy_id = %import.imported_policy_id,
                "Imported policy not found, contributing no entries"
            );
            continue;
        };

        for entry in imported_entries(import, &imported) {
            let label = Label::imported(&import.imported_policy_id, &entry.label);
            merged
                .entry(label.clone())
                .or_insert_with(|| entry.relabeled(label));
        }
    }

    merged.into_values().collect()
}

/// Selects the entries of `imported` that pass the import's label filters.
fn imported_entries<'a>(
    import: &'a PolicyImport,
    imported: &'a Policy,
) -> impl Iterator<Item = &'a PolicyEntry> + 'a {
    let included = &import.effected_imports.included;
    let excluded = &import.effected_imports.excluded;

    imported.entries().filter(move |entry| {
        let label = entry.label.as_str();
        if excluded.contains(label) {
            return false;
        }
        included.is_empty() || included.contains(label)
    })
}
