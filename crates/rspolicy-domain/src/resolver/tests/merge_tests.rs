use std::collections::{BTreeSet, HashMap};

use super::mocks::*;
use crate::model::Policy;
use crate::resolver::merge_imported_entries;

#[test]
fn test_policy_without_imports_merges_to_own_entries() {
    let p1 = policy("com.example:p1", &["EndUser", "Admin"]);
    let lookup = RecordingLookup::new([]);

    let merged = merge_imported_entries(&p1, &lookup);

    let expected: BTreeSet<_> = p1.entries().cloned().collect();
    assert_eq!(merged, expected);
    assert!(lookup.requested().is_empty());
}

#[test]
fn test_empty_filters_import_all_entries() {
    let p2 = policy("com.example:p2", &["A", "B"]);
    let p1 = importing("com.example:p1", &["EndUser"], [import("com.example:p2", &[], &[])]);
    let lookup = RecordingLookup::new([p2]);

    let merged = merge_imported_entries(&p1, &lookup);

    assert_eq!(
        labels_of(&merged),
        vec![
            "EndUser",
            "imported-com.example:p2-A",
            "imported-com.example:p2-B",
        ]
    );
}

#[test]
fn test_only_excluded_imports_everything_else() {
    let p2 = policy("com.example:p2", &["A", "B", "C"]);
    let p1 = importing("com.example:p1", &["EndUser"], [import("com.example:p2", &[], &["B"])]);
    let lookup = RecordingLookup::new([p2]);

    let merged = merge_imported_entries(&p1, &lookup);

    assert_eq!(
        labels_of(&merged),
        vec![
            "EndUser",
            "imported-com.example:p2-A",
            "imported-com.example:p2-C",
        ]
    );
}

#[test]
fn test_included_minus_excluded() {
    let p2 = policy("com.example:p2", &["A", "B", "C"]);
    let p1 = importing(
        "com.example:p1",
        &["EndUser"],
        [import("com.example:p2", &["A", "B"], &["B"])],
    );
    let lookup = RecordingLookup::new([p2]);

    let merged = merge_imported_entries(&p1, &lookup);

    assert_eq!(labels_of(&merged), vec!["EndUser", "imported-com.example:p2-A"]);
}

#[test]
fn test_included_label_missing_from_imported_policy_is_ignored() {
    let p2 = policy("com.example:p2", &["A"]);
    let p1 = importing(
        "com.example:p1",
        &["EndUser"],
        [import("com.example:p2", &["Z"], &[])],
    );
    let lookup = RecordingLookup::new([p2]);

    let merged = merge_imported_entries(&p1, &lookup);

    assert_eq!(labels_of(&merged), vec!["EndUser"]);
}

#[test]
fn test_same_label_from_two_imports_does_not_collide() {
    let p2 = policy("com.example:p2", &["X"]);
    let p3 = policy("com.example:p3", &["X"]);
    let p1 = importing(
        "com.example:p1",
        &["X"],
        [
            import("com.example:p2", &[], &[]),
            import("com.example:p3", &[], &[]),
        ],
    );
    let lookup = RecordingLookup::new([p2, p3]);

    let merged = merge_imported_entries(&p1, &lookup);

    assert_eq!(
        labels_of(&merged),
        vec!["X", "imported-com.example:p2-X", "imported-com.example:p3-X"]
    );
}

#[test]
fn test_imported_entry_content_is_preserved() {
    let p2 = policy("com.example:p2", &["A"]);
    let original = p2.entries().next().unwrap().clone();
    let p1 = importing("com.example:p1", &["EndUser"], [import("com.example:p2", &[], &[])]);
    let lookup = RecordingLookup::new([p2]);

    let merged = merge_imported_entries(&p1, &lookup);
    let imported = merged
        .iter()
        .find(|e| e.label.is_imported())
        .unwrap();

    assert_eq!(imported.subjects, original.subjects);
    assert_eq!(imported.resources, original.resources);
}

/// A missing import is tolerated and contributes no entries.
#[test]
fn test_missing_import_contributes_nothing() {
    let p1 = importing(
        "com.example:p1",
        &["EndUser"],
        [import("com.example:gone", &[], &[])],
    );
    let lookup = RecordingLookup::new([]);

    let merged = merge_imported_entries(&p1, &lookup);

    assert_eq!(labels_of(&merged), vec!["EndUser"]);
    assert_eq!(lookup.requested(), vec![id("com.example:gone")]);
}

#[test]
fn test_imports_are_resolved_one_level_only() {
    let p3 = policy("com.example:p3", &["Deep"]);
    let p2 = importing("com.example:p2", &["Mid"], [import("com.example:p3", &[], &[])]);
    let p1 = importing("com.example:p1", &["Top"], [import("com.example:p2", &[], &[])]);
    let lookup = RecordingLookup::new([p2, p3]);

    let merged = merge_imported_entries(&p1, &lookup);

    assert_eq!(labels_of(&merged), vec!["Top", "imported-com.example:p2-Mid"]);
    assert_eq!(lookup.requested(), vec![id("com.example:p2")]);
}

#[test]
fn test_mutual_imports_terminate() {
    let p2 = importing("com.example:p2", &["B"], [import("com.example:p1", &[], &[])]);
    let p1 = importing("com.example:p1", &["A"], [import("com.example:p2", &[], &[])]);
    let lookup: HashMap<_, Policy> = [(p2.id().clone(), p2.clone())].into_iter().collect();

    let merged = merge_imported_entries(&p1, &lookup);

    assert_eq!(labels_of(&merged), vec!["A", "imported-com.example:p2-B"]);
}

#[test]
fn test_closure_lookup() {
    let p2 = policy("com.example:p2", &["A"]);
    let p1 = importing("com.example:p1", &["EndUser"], [import("com.example:p2", &[], &[])]);
    let lookup = move |policy_id: &crate::model::PolicyId| {
        (policy_id == p2.id()).then(|| p2.clone())
    };

    let merged = merge_imported_entries(&p1, &lookup);

    assert_eq!(merged.len(), 2);
}
