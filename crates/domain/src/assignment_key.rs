use std::str::FromStr;

use polgrant_core::AppError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace used for every assignment key.
pub const ASSIGNMENT_KEY_NAMESPACE: Uuid = Uuid::NAMESPACE_URL;

/// Deterministic identity of a (principal, scope, role definition) triple.
///
/// The key doubles as the cloud-side role assignment name, which makes
/// repeated creation requests for the same triple idempotent. Distinct triples
/// that collide on the same key are not detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssignmentKey(Uuid);

impl AssignmentKey {
    /// Derives the key from the raw triple values.
    ///
    /// Values are concatenated as given; the role-definition id is not
    /// normalized first so keys of previously persisted assignments stay stable.
    #[must_use]
    pub fn derive(principal_id: &str, scope: &str, role_definition_id: &str) -> Self {
        let name = format!("{principal_id}{scope}{role_definition_id}");
        Self(Uuid::new_v5(&ASSIGNMENT_KEY_NAMESPACE, name.as_bytes()))
    }

    /// Creates a key from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for AssignmentKey {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl FromStr for AssignmentKey {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value).map(Self).map_err(|error| {
            AppError::Validation(format!("invalid assignment key '{value}': {error}"))
        })
    }
}
