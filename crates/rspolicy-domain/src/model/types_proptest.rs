//! Property-based tests for model types.

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::model::{Label, PolicyId};

    /// Strategy for namespaces made of dot-separated word segments.
    fn namespace_strategy() -> impl Strategy<Value = String> {
        prop::collection::vec("[a-zA-Z][a-zA-Z0-9_]{0,8}", 0..4).prop_map(|segments| segments.join("."))
    }

    proptest! {
        #[test]
        fn test_policy_id_display_parses_back(
            namespace in namespace_strategy(),
            name in "[a-zA-Z0-9_:.-]{1,40}"
        ) {
            let id = PolicyId::new(&namespace, &name);
            prop_assert!(id.is_ok(), "Failed for {}:{}", namespace, name);
            let id = id.unwrap();
            let parsed = PolicyId::parse(&id.to_string()).unwrap();
            prop_assert_eq!(parsed, id);
        }

        #[test]
        fn test_policy_id_name_with_slash_is_invalid(
            prefix in "[a-z]{0,10}",
            suffix in "[a-z]{0,10}"
        ) {
            let name = format!("{prefix}/{suffix}");
            prop_assert!(PolicyId::new("com.example", name).is_err());
        }

        #[test]
        fn test_printable_labels_are_valid(value in "[a-zA-Z0-9 _.:-]{1,64}") {
            let label = Label::new(&value);
            prop_assert!(label.is_ok(), "Should accept: {}", value);
            let label = label.unwrap();
            prop_assert_eq!(label.as_str(), value.as_str());
        }

        #[test]
        fn test_imported_labels_never_equal_native_source(
            name in "[a-z0-9]{1,10}",
            value in "[a-zA-Z0-9]{1,20}"
        ) {
            let id = PolicyId::new("com.example", name).unwrap();
            let label = Label::new(value).unwrap();
            let imported = Label::imported(&id, &label);
            prop_assert!(imported.is_imported());
            prop_assert_ne!(imported, label);
        }
    }
}
