//! Property-based tests for the import merge.

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashMap, HashSet};

    use proptest::prelude::*;

    use crate::model::{
        EffectedImports, Label, Policy, PolicyEntry, PolicyId, PolicyImport, PolicyImports,
    };
    use crate::resolver::merge_imported_entries;

    fn labels_strategy() -> impl Strategy<Value = BTreeSet<String>> {
        prop::collection::btree_set("[A-E]", 0..5)
    }

    fn policy_with(id: &PolicyId, labels: &BTreeSet<String>) -> Policy {
        Policy::builder(id.clone())
            .set_entries(
                labels
                    .iter()
                    .map(|l| PolicyEntry::new(Label::new(l.as_str()).unwrap(), [], [])),
            )
            .build()
    }

    proptest! {
        #[test]
        fn test_merge_contribution_matches_filter_rule(
            native in labels_strategy(),
            existing in labels_strategy(),
            included in labels_strategy(),
            excluded in labels_strategy(),
        ) {
            let importer_id = PolicyId::parse("com.example:importer").unwrap();
            let imported_id = PolicyId::parse("com.example:imported").unwrap();
            let imported = policy_with(&imported_id, &existing);
            let importer = policy_with(&importer_id, &native)
                .to_builder()
                .set_imports(Some(
                    PolicyImports::new([PolicyImport::new(imported_id.clone())
                        .with_effected_imports(EffectedImports::new(
                            included.iter().cloned(),
                            excluded.iter().cloned(),
                        ))])
                    .unwrap(),
                ))
                .build();
            let lookup: HashMap<PolicyId, Policy> =
                [(imported_id.clone(), imported)].into_iter().collect();

            let merged = merge_imported_entries(&importer, &lookup);

            let expected_imported: BTreeSet<&String> = if included.is_empty() {
                existing.difference(&excluded).collect()
            } else {
                existing
                    .intersection(&included)
                    .filter(|l| !excluded.contains(*l))
                    .collect()
            };

            let prefix = format!("imported-{imported_id}-");
            let actual_imported: BTreeSet<String> = merged
                .iter()
                .filter_map(|e| e.label.as_str().strip_prefix(prefix.as_str()).map(String::from))
                .collect();
            let expected_imported: BTreeSet<String> =
                expected_imported.into_iter().cloned().collect();

            prop_assert_eq!(actual_imported, expected_imported);
            prop_assert_eq!(merged.len(), native.len() + merged.iter().filter(|e| e.label.is_imported()).count());
        }

        #[test]
        fn test_merged_labels_are_unique(
            native in labels_strategy(),
            first in labels_strategy(),
            second in labels_strategy(),
        ) {
            let a = PolicyId::parse("com.example:a").unwrap();
            let b = PolicyId::parse("com.example:b").unwrap();
            let importer = policy_with(&PolicyId::parse("com.example:root").unwrap(), &native)
                .to_builder()
                .set_imports(Some(
                    PolicyImports::new([PolicyImport::new(a.clone()), PolicyImport::new(b.clone())])
                        .unwrap(),
                ))
                .build();
            let lookup: HashMap<PolicyId, Policy> = [
                (a.clone(), policy_with(&a, &first)),
                (b.clone(), policy_with(&b, &second)),
            ]
            .into_iter()
            .collect();

            let merged = merge_imported_entries(&importer, &lookup);

            let labels: HashSet<&Label> = merged.iter().map(|e| &e.label).collect();
            prop_assert_eq!(labels.len(), merged.len());
            prop_assert_eq!(merged.len(), native.len() + first.len() + second.len());
        }
    }
}
