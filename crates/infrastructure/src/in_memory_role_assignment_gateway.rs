use std::collections::HashMap;

use async_trait::async_trait;
use polgrant_application::{
    CreateRoleAssignmentRequest, RemoteRoleAssignment, RoleAssignmentGateway,
};
use polgrant_core::{AppError, AppResult};
use polgrant_domain::normalize_role_definition_id;
use tokio::sync::RwLock;

/// In-memory role assignment gateway with ARM-like conflict rules.
///
/// Resource ids follow the ARM layout
/// `{scope}/providers/Microsoft.Authorization/roleAssignments/{name}`.
#[derive(Debug, Default)]
pub struct InMemoryRoleAssignmentGateway {
    assignments: RwLock<HashMap<String, RemoteRoleAssignment>>,
}

impl InMemoryRoleAssignmentGateway {
    /// Creates an empty gateway.
    #[must_use]
    pub fn new() -> Self {
        Self {
            assignments: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the number of stored assignments.
    pub async fn assignment_count(&self) -> usize {
        self.assignments.read().await.len()
    }

    /// Returns true when the resource id is stored.
    pub async fn contains(&self, resource_id: &str) -> bool {
        self.assignments.read().await.contains_key(resource_id)
    }

    /// Removes an assignment behind the reconciler's back.
    pub async fn remove_out_of_band(&self, resource_id: &str) -> bool {
        self.assignments.write().await.remove(resource_id).is_some()
    }
}

fn same_grant(left: &RemoteRoleAssignment, right: &RemoteRoleAssignment) -> bool {
    left.principal_id == right.principal_id
        && left.scope == right.scope
        && normalize_role_definition_id(left.role_definition_id.as_str())
            == normalize_role_definition_id(right.role_definition_id.as_str())
}

#[async_trait]
impl RoleAssignmentGateway for InMemoryRoleAssignmentGateway {
    async fn create_role_assignment(
        &self,
        request: CreateRoleAssignmentRequest,
    ) -> AppResult<String> {
        let scope = request.scope.trim_end_matches('/');
        let resource_id = format!(
            "{scope}/providers/Microsoft.Authorization/roleAssignments/{}",
            request.name
        );
        let assignment = RemoteRoleAssignment {
            principal_id: request.principal_id,
            scope: scope.to_owned(),
            role_definition_id: request.role_definition_id,
        };

        let mut assignments = self.assignments.write().await;

        if let Some(existing) = assignments.get(&resource_id) {
            if same_grant(existing, &assignment) {
                return Ok(resource_id);
            }
            return Err(AppError::Conflict(format!(
                "role assignment '{resource_id}' exists with different properties"
            )));
        }

        if let Some(other_id) = assignments
            .iter()
            .find_map(|(id, existing)| same_grant(existing, &assignment).then_some(id))
        {
            return Err(AppError::Conflict(format!(
                "role assignment already exists as '{other_id}'"
            )));
        }

        assignments.insert(resource_id.clone(), assignment);
        Ok(resource_id)
    }

    async fn get_role_assignment(&self, resource_id: &str) -> AppResult<RemoteRoleAssignment> {
        self.assignments
            .read()
            .await
            .get(resource_id)
            .cloned()
            .ok_or_else(|| {
                AppError::NotFound(format!("role assignment '{resource_id}' does not exist"))
            })
    }

    async fn delete_role_assignment(&self, resource_id: &str) -> AppResult<()> {
        self.assignments
            .write()
            .await
            .remove(resource_id)
            .map(|_| ())
            .ok_or_else(|| {
                AppError::NotFound(format!("role assignment '{resource_id}' does not exist"))
            })
    }
}
