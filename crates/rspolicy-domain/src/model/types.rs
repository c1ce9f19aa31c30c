//! Identifier types for the policy model.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Maximum length of a rendered policy id (`namespace:name`).
pub const MAX_POLICY_ID_LENGTH: usize = 256;

/// Maximum length of an entry label.
pub const MAX_LABEL_LENGTH: usize = 256;

/// Prefix reserved for labels of entries contributed by a policy import.
pub const IMPORTED_PREFIX: &str = "imported-";

fn is_control(c: char) -> bool {
    c.is_control()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// A policy identifier of the form `namespace:name` (e.g. "com.example:p1").
///
/// The namespace is either empty or a dot-separated list of segments, each
/// starting with a letter followed by word characters. The name must be
/// non-empty and may not contain control characters or `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PolicyId {
    namespace: String,
    name: String,
}

impl PolicyId {
    /// Creates a new PolicyId from namespace and name, validating both.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> DomainResult<Self> {
        let namespace = namespace.into();
        let name = name.into();
        let invalid = |reason| DomainError::InvalidPolicyId {
            value: format!("{namespace}:{name}"),
            reason,
        };

        if namespace.chars().count() + name.chars().count() + 1 > MAX_POLICY_ID_LENGTH {
            return Err(invalid("policy id exceeds 256 characters"));
        }
        if !namespace.is_empty() && !namespace.split('.').all(Self::is_namespace_segment) {
            return Err(invalid(
                "namespace segments must start with a letter followed by word characters",
            ));
        }
        if name.is_empty() {
            return Err(invalid("name cannot be empty"));
        }
        if name.chars().any(|c| is_control(c) || c == '/') {
            return Err(invalid("name cannot contain control characters or '/'"));
        }

        Ok(Self { namespace, name })
    }

    /// Parses a policy id from "namespace:name" format.
    ///
    /// Splits at the first `:`, so names may themselves contain colons.
    pub fn parse(value: &str) -> DomainResult<Self> {
        match value.split_once(':') {
            Some((namespace, name)) => Self::new(namespace, name),
            None => Err(DomainError::InvalidPolicyId {
                value: value.to_string(),
                reason: "policy id must be in 'namespace:name' format",
            }),
        }
    }

    /// Returns the namespace portion.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the name portion.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn is_namespace_segment(segment: &str) -> bool {
        let mut chars = segment.chars();
        match chars.next() {
            Some(first) if first.is_ascii_alphabetic() => chars.all(is_word_char),
            _ => false,
        }
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

impl FromStr for PolicyId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PolicyId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PolicyId> for String {
    fn from(id: PolicyId) -> Self {
        id.to_string()
    }
}

/// A label identifying a [`PolicyEntry`](super::PolicyEntry) within a policy.
///
/// Labels starting with [`IMPORTED_PREFIX`] are produced by the import
/// merge; natively authored entries carrying that prefix are rejected by the
/// policy validator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Label(String);

impl Label {
    /// Creates a new Label, validating length and characters.
    pub fn new(value: impl Into<String>) -> DomainResult<Self> {
        let value = value.into();
        let invalid = |value: String, reason| DomainError::InvalidLabel { value, reason };

        if value.is_empty() {
            return Err(invalid(value, "label cannot be empty"));
        }
        if value.chars().count() > MAX_LABEL_LENGTH {
            return Err(invalid(value, "label exceeds 256 characters"));
        }
        if value.chars().any(|c| is_control(c) || c == '/') {
            return Err(invalid(
                value,
                "label cannot contain control characters or '/'",
            ));
        }
        Ok(Self(value))
    }

    /// Builds the label an entry receives when merged in from `imported_policy_id`.
    ///
    /// The result is `imported-<importedPolicyId>-<label>`, which cannot
    /// collide with a valid native label or with entries of another import.
    pub fn imported(imported_policy_id: &PolicyId, label: &Label) -> Self {
        Self(format!("{IMPORTED_PREFIX}{imported_policy_id}-{}", label.0))
    }

    /// Returns true if this label carries the reserved import prefix.
    pub fn is_imported(&self) -> bool {
        self.0.starts_with(IMPORTED_PREFIX)
    }

    /// Returns the label as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Label {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Label> for String {
    fn from(label: Label) -> Self {
        label.0
    }
}

/// A subject identifier of the form `issuer:subject` (e.g. "google:alice").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectId {
    issuer: String,
    subject: String,
}

impl SubjectId {
    /// Creates a new SubjectId from issuer and subject.
    pub fn new(issuer: impl Into<String>, subject: impl Into<String>) -> DomainResult<Self> {
        let issuer = issuer.into();
        let subject = subject.into();
        if issuer.is_empty() || subject.is_empty() {
            return Err(DomainError::InvalidSubjectId {
                value: format!("{issuer}:{subject}"),
                reason: "issuer and subject cannot be empty",
            });
        }
        Ok(Self { issuer, subject })
    }

    /// Parses a subject id from "issuer:subject" format.
    pub fn parse(value: &str) -> DomainResult<Self> {
        match value.split_once(':') {
            Some((issuer, subject)) => Self::new(issuer, subject),
            None => Err(DomainError::InvalidSubjectId {
                value: value.to_string(),
                reason: "subject id must be in 'issuer:subject' format",
            }),
        }
    }

    /// Returns the issuer portion.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Returns the subject portion.
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.issuer, self.subject)
    }
}

impl TryFrom<String> for SubjectId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SubjectId> for String {
    fn from(id: SubjectId) -> Self {
        id.to_string()
    }
}

/// A resource key of the form `type:/path` (e.g. "thing:/features/lamp").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceKey {
    resource_type: String,
    path: String,
}

impl ResourceKey {
    /// Creates a new ResourceKey. The path is normalized to start with `/`
    /// and carry no trailing `/` (except for the root).
    pub fn new(resource_type: impl Into<String>, path: impl AsRef<str>) -> DomainResult<Self> {
        let resource_type = resource_type.into();
        if resource_type.is_empty() || resource_type.contains(':') {
            return Err(DomainError::InvalidResourceKey {
                value: format!("{resource_type}:{}", path.as_ref()),
                reason: "resource type cannot be empty or contain ':'",
            });
        }
        let trimmed = path.as_ref().trim_matches('/');
        Ok(Self {
            resource_type,
            path: format!("/{trimmed}"),
        })
    }

    /// Parses a resource key from "type:/path" format.
    pub fn parse(value: &str) -> DomainResult<Self> {
        match value.split_once(':') {
            Some((resource_type, path)) => Self::new(resource_type, path),
            None => Err(DomainError::InvalidResourceKey {
                value: value.to_string(),
                reason: "resource key must be in 'type:/path' format",
            }),
        }
    }

    /// Returns the resource type (e.g. "policy", "thing").
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Returns the normalized path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns true if `other` is this resource or lies below it.
    pub fn covers(&self, other: &ResourceKey) -> bool {
        if self.resource_type != other.resource_type {
            return false;
        }
        if self.path == "/" || self.path == other.path {
            return true;
        }
        other
            .path
            .strip_prefix(self.path.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.path)
    }
}

impl TryFrom<String> for ResourceKey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ResourceKey> for String {
    fn from(key: ResourceKey) -> Self {
        key.to_string()
    }
}
