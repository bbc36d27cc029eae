use async_trait::async_trait;

use polgrant_core::AppResult;
use polgrant_domain::AssignmentKey;

/// Input payload for creating one cloud role assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRoleAssignmentRequest {
    /// ARM scope the role is granted on.
    pub scope: String,
    /// Assignment name; repeating a request with the same name is idempotent.
    pub name: AssignmentKey,
    /// Principal object id receiving the role.
    pub principal_id: String,
    /// Role-definition id as declared by the caller.
    pub role_definition_id: String,
}

/// Role assignment fields as currently stored by the cloud.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRoleAssignment {
    /// Principal object id.
    pub principal_id: String,
    /// ARM scope.
    pub scope: String,
    /// Role-definition id in whichever form the cloud returns.
    pub role_definition_id: String,
}

/// Gateway port for single role assignment operations.
///
/// Implementations report a missing assignment as `AppError::NotFound`.
#[async_trait]
pub trait RoleAssignmentGateway: Send + Sync {
    /// Creates the assignment and returns its cloud resource id.
    async fn create_role_assignment(
        &self,
        request: CreateRoleAssignmentRequest,
    ) -> AppResult<String>;

    /// Reads the assignment identified by a cloud resource id.
    async fn get_role_assignment(&self, resource_id: &str) -> AppResult<RemoteRoleAssignment>;

    /// Deletes the assignment identified by a cloud resource id.
    async fn delete_role_assignment(&self, resource_id: &str) -> AppResult<()>;
}
