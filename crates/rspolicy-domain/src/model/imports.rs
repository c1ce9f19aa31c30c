//! Policy imports: references from one policy to entries of another.

use std::collections::btree_map::{BTreeMap, Values};
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::types::PolicyId;
use crate::error::{DomainError, DomainResult};

/// Label filters of an import.
///
/// Labels are kept as plain strings: they refer to entries of another
/// policy and are not validated against this policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EffectedImports {
    #[serde(default)]
    pub included: BTreeSet<String>,
    #[serde(default)]
    pub excluded: BTreeSet<String>,
}

impl EffectedImports {
    /// Creates filters from included and excluded labels.
    pub fn new<I, E>(included: I, excluded: E) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        Self {
            included: included.into_iter().map(Into::into).collect(),
            excluded: excluded.into_iter().map(Into::into).collect(),
        }
    }
}

/// A reference to another policy whose entries are merged into this one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyImport {
    pub imported_policy_id: PolicyId,
    #[serde(default)]
    pub is_protected: bool,
    #[serde(default)]
    pub effected_imports: EffectedImports,
}

impl PolicyImport {
    /// Creates an unprotected import of all entries of `imported_policy_id`.
    pub fn new(imported_policy_id: PolicyId) -> Self {
        Self {
            imported_policy_id,
            is_protected: false,
            effected_imports: EffectedImports::default(),
        }
    }

    /// Sets the include/exclude filters.
    pub fn with_effected_imports(mut self, effected_imports: EffectedImports) -> Self {
        self.effected_imports = effected_imports;
        self
    }

    /// Marks the import as protected.
    pub fn with_protected(mut self, is_protected: bool) -> Self {
        self.is_protected = is_protected;
        self
    }
}

/// The imports of a policy, keyed by imported policy id.
///
/// Serialized as a list; deserializing a list with duplicate ids fails.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<PolicyImport>", into = "Vec<PolicyImport>")]
pub struct PolicyImports {
    imports: BTreeMap<PolicyId, PolicyImport>,
}

impl PolicyImports {
    /// Creates imports from a list, failing on duplicate imported ids.
    pub fn new(imports: impl IntoIterator<Item = PolicyImport>) -> DomainResult<Self> {
        let mut map = BTreeMap::new();
        for import in imports {
            let id = import.imported_policy_id.clone();
            if map.insert(id.clone(), import).is_some() {
                return Err(DomainError::DuplicateImport {
                    imported_policy_id: id.to_string(),
                });
            }
        }
        Ok(Self { imports: map })
    }

    /// Returns the import of `imported_policy_id`, if present.
    pub fn get(&self, imported_policy_id: &PolicyId) -> Option<&PolicyImport> {
        self.imports.get(imported_policy_id)
    }

    /// Returns true if `imported_policy_id` is imported.
    pub fn contains(&self, imported_policy_id: &PolicyId) -> bool {
        self.imports.contains_key(imported_policy_id)
    }

    /// Inserts or replaces the import addressed by its imported policy id.
    pub fn set_import(mut self, import: PolicyImport) -> Self {
        self.imports
            .insert(import.imported_policy_id.clone(), import);
        self
    }

    /// Removes the import of `imported_policy_id`.
    pub fn remove_import(mut self, imported_policy_id: &PolicyId) -> Self {
        self.imports.remove(imported_policy_id);
        self
    }

    pub fn len(&self) -> usize {
        self.imports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.imports.is_empty()
    }

    /// Iterates imports in imported-id order.
    pub fn iter(&self) -> Values<'_, PolicyId, PolicyImport> {
        self.imports.values()
    }

    /// Iterates the imported policy ids.
    pub fn imported_ids(&self) -> impl Iterator<Item = &PolicyId> {
        self.imports.keys()
    }
}

impl<'a> IntoIterator for &'a PolicyImports {
    type Item = &'a PolicyImport;
    type IntoIter = Values<'a, PolicyId, PolicyImport>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl TryFrom<Vec<PolicyImport>> for PolicyImports {
    type Error = DomainError;

    fn try_from(imports: Vec<PolicyImport>) -> Result<Self, Self::Error> {
        Self::new(imports)
    }
}

impl From<PolicyImports> for Vec<PolicyImport> {
    fn from(imports: PolicyImports) -> Self {
        imports.imports.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(value: &str) -> PolicyId {
        PolicyId::parse(value).unwrap()
    }

    #[test]
    fn test_duplicate_imported_ids_fail() {
        let result = PolicyImports::new([
            PolicyImport::new(id("com.example:p2")),
            PolicyImport::new(id("com.example:p2")).with_protected(true),
        ]);
        assert!(matches!(result, Err(DomainError::DuplicateImport { .. })));
    }

    #[test]
    fn test_set_import_replaces_existing() {
        let imports = PolicyImports::new([PolicyImport::new(id("com.example:p2"))]).unwrap();
        let replaced = imports.set_import(
            PolicyImport::new(id("com.example:p2"))
                .with_effected_imports(EffectedImports::new(["A"], Vec::<String>::new())),
        );
        assert_eq!(replaced.len(), 1);
        let import = replaced.get(&id("com.example:p2")).unwrap();
        assert!(import.effected_imports.included.contains("A"));
    }

    #[test]
    fn test_iteration_is_ordered_by_imported_id() {
        let imports = PolicyImports::new([
            PolicyImport::new(id("org:z")),
            PolicyImport::new(id("com:a")),
        ])
        .unwrap();
        let ids: Vec<String> = imports.imported_ids().map(ToString::to_string).collect();
        assert_eq!(ids, vec!["com:a", "org:z"]);
    }

    #[test]
    fn test_remove_import() {
        let imports = PolicyImports::new([PolicyImport::new(id("com:a"))]).unwrap();
        let removed = imports.remove_import(&id("com:a"));
        assert!(removed.is_empty());
    }

    #[test]
    fn test_deserializing_duplicates_fails() {
        let json = serde_json::json!([
            {"importedPolicyId": "com:a"},
            {"importedPolicyId": "com:a", "isProtected": true}
        ]);
        assert!(serde_json::from_value::<PolicyImports>(json).is_err());
    }
}
