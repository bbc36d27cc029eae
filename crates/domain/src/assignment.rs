//! Desired and applied role assignment records.

use polgrant_core::{AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

use crate::assignment_key::AssignmentKey;
use crate::role_definition::normalize_role_definition_id;

/// Structural identity used to pair desired entries with applied ones.
///
/// The role-definition id is held in normalized form so subscription-scoped
/// and tenant-root spellings of the same role match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssignmentMatchKey {
    principal_id: String,
    role_definition_id: String,
    scope: String,
}

impl AssignmentMatchKey {
    /// Builds a match key from raw triple values.
    #[must_use]
    pub fn new(principal_id: &str, scope: &str, role_definition_id: &str) -> Self {
        Self {
            principal_id: principal_id.to_owned(),
            role_definition_id: normalize_role_definition_id(role_definition_id),
            scope: scope.to_owned(),
        }
    }
}

/// A role assignment the caller wants to exist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DesiredAssignment {
    principal_id: NonEmptyString,
    scope: NonEmptyString,
    role_definition_id: NonEmptyString,
}

impl DesiredAssignment {
    /// Creates a validated desired assignment.
    pub fn new(
        principal_id: impl Into<String>,
        scope: impl Into<String>,
        role_definition_id: impl Into<String>,
    ) -> AppResult<Self> {
        Ok(Self {
            principal_id: NonEmptyString::new(principal_id)?,
            scope: NonEmptyString::new(scope)?,
            role_definition_id: NonEmptyString::new(role_definition_id)?,
        })
    }

    /// Returns the principal object id.
    #[must_use]
    pub fn principal_id(&self) -> &str {
        self.principal_id.as_str()
    }

    /// Returns the ARM scope the role is granted on.
    #[must_use]
    pub fn scope(&self) -> &str {
        self.scope.as_str()
    }

    /// Returns the role-definition id as supplied by the caller.
    #[must_use]
    pub fn role_definition_id(&self) -> &str {
        self.role_definition_id.as_str()
    }

    /// Returns the deterministic key for this triple.
    #[must_use]
    pub fn assignment_key(&self) -> AssignmentKey {
        AssignmentKey::derive(
            self.principal_id(),
            self.scope(),
            self.role_definition_id(),
        )
    }

    /// Returns the structural identity of this triple.
    #[must_use]
    pub fn match_key(&self) -> AssignmentMatchKey {
        AssignmentMatchKey::new(
            self.principal_id(),
            self.scope(),
            self.role_definition_id(),
        )
    }
}

/// A role assignment materialized in the cloud and tracked in persisted state.
///
/// After a refresh finds the backing object gone, the identifying fields are
/// cleared while the record itself is kept; see [`AppliedAssignment::is_drifted`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedAssignment {
    principal_id: Option<String>,
    scope: Option<String>,
    role_definition_id: Option<String>,
    resource_id: Option<String>,
    assignment_key: AssignmentKey,
}

impl AppliedAssignment {
    /// Creates a record for an assignment the cloud has just accepted.
    #[must_use]
    pub fn created(
        desired: &DesiredAssignment,
        assignment_key: AssignmentKey,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            principal_id: Some(desired.principal_id().to_owned()),
            scope: Some(desired.scope().to_owned()),
            role_definition_id: Some(normalize_role_definition_id(
                desired.role_definition_id(),
            )),
            resource_id: Some(resource_id.into()),
            assignment_key,
        }
    }

    /// Rebuilds a record from persisted values.
    #[must_use]
    pub fn from_parts(
        principal_id: Option<String>,
        scope: Option<String>,
        role_definition_id: Option<String>,
        resource_id: Option<String>,
        assignment_key: AssignmentKey,
    ) -> Self {
        Self {
            principal_id,
            scope,
            role_definition_id: role_definition_id
                .as_deref()
                .map(normalize_role_definition_id),
            resource_id,
            assignment_key,
        }
    }

    /// Returns the principal object id, if known.
    #[must_use]
    pub fn principal_id(&self) -> Option<&str> {
        self.principal_id.as_deref()
    }

    /// Returns the ARM scope, if known.
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Returns the normalized role-definition id, if known.
    #[must_use]
    pub fn role_definition_id(&self) -> Option<&str> {
        self.role_definition_id.as_deref()
    }

    /// Returns the cloud resource id, if the assignment is live.
    #[must_use]
    pub fn resource_id(&self) -> Option<&str> {
        self.resource_id.as_deref()
    }

    /// Returns the key the assignment was created under.
    #[must_use]
    pub fn assignment_key(&self) -> AssignmentKey {
        self.assignment_key
    }

    /// Returns the structural identity, or `None` for drifted records.
    #[must_use]
    pub fn match_key(&self) -> Option<AssignmentMatchKey> {
        match (
            self.principal_id.as_deref(),
            self.scope.as_deref(),
            self.role_definition_id.as_deref(),
        ) {
            (Some(principal_id), Some(scope), Some(role_definition_id)) => Some(
                AssignmentMatchKey::new(principal_id, scope, role_definition_id),
            ),
            _ => None,
        }
    }

    /// Returns true when a refresh found the backing object gone.
    #[must_use]
    pub fn is_drifted(&self) -> bool {
        self.resource_id.is_none()
            && self.principal_id.is_none()
            && self.scope.is_none()
            && self.role_definition_id.is_none()
    }

    /// Overwrites the identifying fields with values read from the cloud.
    pub fn apply_refresh(
        &mut self,
        principal_id: impl Into<String>,
        scope: impl Into<String>,
        role_definition_id: &str,
    ) {
        self.principal_id = Some(principal_id.into());
        self.scope = Some(scope.into());
        self.role_definition_id = Some(normalize_role_definition_id(role_definition_id));
    }

    /// Clears the identifying fields after the backing object disappeared.
    pub fn mark_drifted(&mut self) {
        self.principal_id = None;
        self.scope = None;
        self.role_definition_id = None;
        self.resource_id = None;
    }
}
