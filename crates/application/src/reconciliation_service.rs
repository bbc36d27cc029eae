use std::sync::Arc;

use polgrant_core::{AppError, AppResult, Diagnostic, Diagnostics};
use polgrant_domain::{AppliedAssignment, DesiredAssignment};
use tracing::{debug, info, warn};

use crate::role_assignment_ports::{CreateRoleAssignmentRequest, RoleAssignmentGateway};

mod lifecycle;
mod run;

#[cfg(test)]
mod tests;

pub use run::{ReconcileMode, ReconcileRun};

/// Counts of gateway effects observed during one operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Assignments created, drift recreations included.
    pub created: usize,
    /// Assignments refreshed from the cloud.
    pub refreshed: usize,
    /// Assignments found missing in the cloud.
    pub drifted: usize,
    /// Assignments deleted, already-gone ones included.
    pub deleted: usize,
}

/// Resulting applied set and diagnostics of one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Applied set to persist.
    pub assignments: Vec<AppliedAssignment>,
    /// User-visible diagnostics; errors mean the pass stopped early.
    pub diagnostics: Diagnostics,
    /// Gateway effect counters.
    pub summary: ReconcileSummary,
}

impl ReconcileOutcome {
    /// Returns true when the operation reported an error diagnostic.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }
}

/// Reconciles desired role assignments with the persisted applied set.
///
/// Every operation runs entries sequentially. Create, read and update stop at
/// the first gateway failure and return what was converged so far together
/// with the untouched remainder; delete continues past failures.
#[derive(Clone)]
pub struct RoleAssignmentReconciler {
    gateway: Arc<dyn RoleAssignmentGateway>,
}

enum RefreshResult {
    Refreshed,
    Drifted,
    NotMaterialized,
}

enum DeleteResult {
    Deleted,
    AlreadyGone,
    NotMaterialized,
}

impl RoleAssignmentReconciler {
    /// Creates a reconciler on top of a gateway implementation.
    #[must_use]
    pub fn new(gateway: Arc<dyn RoleAssignmentGateway>) -> Self {
        Self { gateway }
    }

    async fn create_one(&self, desired: &DesiredAssignment) -> AppResult<AppliedAssignment> {
        let assignment_key = desired.assignment_key();
        let resource_id = self
            .gateway
            .create_role_assignment(CreateRoleAssignmentRequest {
                scope: desired.scope().to_owned(),
                name: assignment_key,
                principal_id: desired.principal_id().to_owned(),
                role_definition_id: desired.role_definition_id().to_owned(),
            })
            .await?;

        info!(
            assignment_key = %assignment_key,
            principal_id = %desired.principal_id(),
            scope = %desired.scope(),
            resource_id = %resource_id,
            "role assignment created"
        );

        Ok(AppliedAssignment::created(
            desired,
            assignment_key,
            resource_id,
        ))
    }

    async fn refresh_one(&self, applied: &mut AppliedAssignment) -> AppResult<RefreshResult> {
        let Some(resource_id) = applied.resource_id().map(str::to_owned) else {
            return Ok(RefreshResult::NotMaterialized);
        };

        match self.gateway.get_role_assignment(resource_id.as_str()).await {
            Ok(remote) => {
                applied.apply_refresh(
                    remote.principal_id,
                    remote.scope,
                    remote.role_definition_id.as_str(),
                );
                debug!(resource_id = %resource_id, "role assignment refreshed");
                Ok(RefreshResult::Refreshed)
            }
            Err(error) if error.is_not_found() => {
                warn!(
                    resource_id = %resource_id,
                    assignment_key = %applied.assignment_key(),
                    "role assignment no longer exists"
                );
                applied.mark_drifted();
                Ok(RefreshResult::Drifted)
            }
            Err(error) => Err(error),
        }
    }

    async fn delete_one(&self, applied: &AppliedAssignment) -> AppResult<DeleteResult> {
        let Some(resource_id) = applied.resource_id() else {
            return Ok(DeleteResult::NotMaterialized);
        };

        match self.gateway.delete_role_assignment(resource_id).await {
            Ok(()) => {
                info!(resource_id = %resource_id, "role assignment deleted");
                Ok(DeleteResult::Deleted)
            }
            Err(error) if error.is_not_found() => {
                debug!(resource_id = %resource_id, "role assignment already deleted");
                Ok(DeleteResult::AlreadyGone)
            }
            Err(error) => Err(error),
        }
    }

    /// Deletes every entry, keeping the ones whose deletion failed.
    async fn teardown(&self, current: Vec<AppliedAssignment>) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();

        for applied in current {
            match self.delete_one(&applied).await {
                Ok(DeleteResult::Deleted | DeleteResult::AlreadyGone) => {
                    outcome.summary.deleted += 1;
                }
                Ok(DeleteResult::NotMaterialized) => {}
                Err(error) => {
                    warn!(
                        assignment_key = %applied.assignment_key(),
                        error = %error,
                        "failed to delete role assignment"
                    );
                    push_failure(
                        &mut outcome.diagnostics,
                        "failed to delete role assignment",
                        describe_applied(&applied),
                        &error,
                    );
                    outcome.assignments.push(applied);
                }
            }
        }

        outcome
    }
}

fn describe_desired(desired: &DesiredAssignment) -> String {
    format!(
        "principal '{}' on scope '{}' with role '{}'",
        desired.principal_id(),
        desired.scope(),
        desired.role_definition_id()
    )
}

fn describe_applied(applied: &AppliedAssignment) -> String {
    format!(
        "assignment '{}' with resource id '{}'",
        applied.assignment_key(),
        applied.resource_id().unwrap_or("<none>")
    )
}

fn push_failure(diagnostics: &mut Diagnostics, summary: &str, subject: String, error: &AppError) {
    diagnostics.push(Diagnostic::error(summary, format!("{subject}: {error}")));
}
