//! Policy entries: labeled bundles of subjects and resources.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{Label, ResourceKey, SubjectId};

/// A subject that is granted or revoked permissions by an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    /// Issuer-qualified subject id.
    pub id: SubjectId,
    /// Free-form subject type (e.g. "generated", "user").
    #[serde(rename = "type")]
    pub subject_type: String,
    /// Point in time after which the subject no longer applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl Subject {
    /// Creates a subject without expiry.
    pub fn new(id: SubjectId, subject_type: impl Into<String>) -> Self {
        Self {
            id,
            subject_type: subject_type.into(),
            expiry: None,
        }
    }

    /// Sets the expiry timestamp.
    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// Returns true if the subject's expiry lies before `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|expiry| expiry < now)
    }
}

/// Granted and revoked permission names for a resource.
///
/// Permission names are opaque identifiers (e.g. "READ", "WRITE").
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EffectedPermissions {
    #[serde(default)]
    pub grant: BTreeSet<String>,
    #[serde(default)]
    pub revoke: BTreeSet<String>,
}

impl EffectedPermissions {
    /// Creates permissions from grant and revoke lists.
    pub fn new<G, R>(grant: G, revoke: R) -> Self
    where
        G: IntoIterator,
        G::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            grant: grant.into_iter().map(Into::into).collect(),
            revoke: revoke.into_iter().map(Into::into).collect(),
        }
    }
}

/// A resource with the permissions an entry grants or revokes on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Resource {
    pub key: ResourceKey,
    #[serde(flatten)]
    pub permissions: EffectedPermissions,
}

impl Resource {
    /// Creates a new Resource.
    pub fn new(key: ResourceKey, permissions: EffectedPermissions) -> Self {
        Self { key, permissions }
    }
}

/// A labeled bundle of subjects and resources within a policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyEntry {
    pub label: Label,
    #[serde(default)]
    pub subjects: BTreeSet<Subject>,
    #[serde(default)]
    pub resources: BTreeSet<Resource>,
}

impl PolicyEntry {
    /// Creates a new PolicyEntry.
    pub fn new(
        label: Label,
        subjects: impl IntoIterator<Item = Subject>,
        resources: impl IntoIterator<Item = Resource>,
    ) -> Self {
        Self {
            label,
            subjects: subjects.into_iter().collect(),
            resources: resources.into_iter().collect(),
        }
    }

    /// Returns a copy of this entry carrying a different label.
    pub fn relabeled(&self, label: Label) -> Self {
        Self {
            label,
            subjects: self.subjects.clone(),
            resources: self.resources.clone(),
        }
    }

    /// Returns the first subject already expired at `now`, if any.
    pub fn first_expired_subject(&self, now: DateTime<Utc>) -> Option<&Subject> {
        self.subjects.iter().find(|s| s.is_expired(now))
    }
}
