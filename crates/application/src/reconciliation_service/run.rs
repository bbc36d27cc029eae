use super::*;

use std::str::FromStr;

use chrono::Utc;
use polgrant_domain::ReconciliationPlan;

use crate::role_assignment_ports::{AssignmentState, AssignmentStateStore};

/// Operation performed by a stateful reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconcileMode {
    /// Converge the stored applied set onto the desired set.
    Apply,
    /// Compute the plan without calling the gateway or saving state.
    Plan,
    /// Refresh the stored applied set from the cloud.
    Refresh,
    /// Delete every stored assignment.
    Destroy,
}

impl ReconcileMode {
    /// Returns a stable configuration value for this mode.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Apply => "apply",
            Self::Plan => "plan",
            Self::Refresh => "refresh",
            Self::Destroy => "destroy",
        }
    }

    /// Returns true when the mode reads a desired set.
    #[must_use]
    pub fn requires_desired_assignments(&self) -> bool {
        matches!(self, Self::Apply | Self::Plan)
    }

    /// Returns true when the mode talks to the gateway.
    #[must_use]
    pub fn requires_gateway(&self) -> bool {
        !matches!(self, Self::Plan)
    }
}

impl FromStr for ReconcileMode {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "apply" => Ok(Self::Apply),
            "plan" => Ok(Self::Plan),
            "refresh" => Ok(Self::Refresh),
            "destroy" => Ok(Self::Destroy),
            _ => Err(AppError::Validation(format!(
                "unknown reconcile mode '{value}'"
            ))),
        }
    }
}

/// Result of one stateful reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileRun {
    /// Mode the run executed.
    pub mode: ReconcileMode,
    /// Plan computed against the stored state, for apply and plan runs.
    pub plan: Option<ReconciliationPlan>,
    /// Operation outcome; for plan runs the stored set unchanged.
    pub outcome: ReconcileOutcome,
}

impl RoleAssignmentReconciler {
    /// Loads stored state, runs one operation and saves the resulting state.
    ///
    /// The first apply against an empty store uses [`Self::create`]; later ones
    /// use [`Self::update`]. State is saved even when the operation reported
    /// errors so partial progress is kept for the next run.
    pub async fn run(
        &self,
        mode: ReconcileMode,
        desired: Vec<DesiredAssignment>,
        store: &dyn AssignmentStateStore,
    ) -> AppResult<ReconcileRun> {
        let state = store.load().await?;

        let plan = mode
            .requires_desired_assignments()
            .then(|| ReconciliationPlan::compute(desired.clone(), state.assignments.clone()));

        let outcome = match mode {
            ReconcileMode::Plan => {
                return Ok(ReconcileRun {
                    mode,
                    plan,
                    outcome: ReconcileOutcome {
                        assignments: state.assignments,
                        ..ReconcileOutcome::default()
                    },
                });
            }
            ReconcileMode::Apply if state.is_empty() => self.create(desired).await,
            ReconcileMode::Apply => self.update(desired, state.assignments).await,
            ReconcileMode::Refresh => self.read(state.assignments).await,
            ReconcileMode::Destroy => self.teardown(state.assignments).await,
        };

        store
            .save(&AssignmentState {
                assignments: outcome.assignments.clone(),
                reconciled_at: Some(Utc::now()),
            })
            .await?;

        info!(
            mode = mode.as_str(),
            created = outcome.summary.created,
            refreshed = outcome.summary.refreshed,
            drifted = outcome.summary.drifted,
            deleted = outcome.summary.deleted,
            errors = outcome.diagnostics.error_count(),
            "role assignment reconciliation finished"
        );

        Ok(ReconcileRun {
            mode,
            plan,
            outcome,
        })
    }
}
