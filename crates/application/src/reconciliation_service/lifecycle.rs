use super::*;

use std::collections::HashSet;

use polgrant_domain::{PlanStep, ReconciliationPlan};

impl RoleAssignmentReconciler {
    /// Creates every desired assignment.
    ///
    /// Structural duplicates are created once. Stops at the first failure;
    /// assignments created before it are returned and are safe to persist
    /// because creation is keyed and idempotent.
    pub async fn create(&self, desired: Vec<DesiredAssignment>) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();
        let mut seen = HashSet::new();

        for entry in desired {
            if !seen.insert(entry.match_key()) {
                continue;
            }

            match self.create_one(&entry).await {
                Ok(applied) => {
                    outcome.summary.created += 1;
                    outcome.assignments.push(applied);
                }
                Err(error) => {
                    push_failure(
                        &mut outcome.diagnostics,
                        "failed to create role assignment",
                        describe_desired(&entry),
                        &error,
                    );
                    break;
                }
            }
        }

        outcome
    }

    /// Refreshes every materialized entry from the cloud.
    ///
    /// Entries whose backing assignment is gone are kept with their fields
    /// cleared. Stops at the first other failure and returns the remaining
    /// entries unchanged.
    pub async fn read(&self, current: Vec<AppliedAssignment>) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();
        let mut remaining = current.into_iter();

        while let Some(mut applied) = remaining.next() {
            match self.refresh_one(&mut applied).await {
                Ok(RefreshResult::Refreshed) => outcome.summary.refreshed += 1,
                Ok(RefreshResult::Drifted) => outcome.summary.drifted += 1,
                Ok(RefreshResult::NotMaterialized) => {}
                Err(error) => {
                    push_failure(
                        &mut outcome.diagnostics,
                        "failed to read role assignment",
                        describe_applied(&applied),
                        &error,
                    );
                    outcome.assignments.push(applied);
                    outcome.assignments.extend(remaining.by_ref());
                    break;
                }
            }

            outcome.assignments.push(applied);
        }

        outcome
    }

    /// Moves the applied set to the planned set.
    ///
    /// Planned entries already applied are refreshed, new ones are created and
    /// applied entries no longer planned are deleted. A planned entry whose
    /// assignment vanished is recreated in the same pass. Deletions run last
    /// and only when every create and refresh succeeded.
    pub async fn update(
        &self,
        planned: Vec<DesiredAssignment>,
        current: Vec<AppliedAssignment>,
    ) -> ReconcileOutcome {
        let plan = ReconciliationPlan::compute(planned, current);
        debug!(
            creates = plan.create_count(),
            refreshes = plan.refresh_count(),
            deletes = plan.delete_count(),
            "role assignment plan computed"
        );

        let (steps, deletions) = plan.into_parts();
        let mut outcome = ReconcileOutcome::default();
        let mut steps = steps.into_iter();

        while let Some(step) = steps.next() {
            if let Err(failed) = self.apply_step(step, &mut outcome).await {
                if let Some(applied) = failed {
                    outcome.assignments.push(applied);
                }
                for step in steps.by_ref() {
                    if let PlanStep::Refresh { current, .. } = step {
                        outcome.assignments.push(current);
                    }
                }
                outcome.assignments.extend(deletions);
                return outcome;
            }
        }

        let teardown = self.teardown(deletions).await;
        outcome.summary.deleted += teardown.summary.deleted;
        outcome.assignments.extend(teardown.assignments);
        outcome.diagnostics.append(teardown.diagnostics);

        outcome
    }

    /// Deletes every entry, continuing past failures.
    ///
    /// Assignments that are already gone count as deleted.
    pub async fn delete(&self, current: Vec<AppliedAssignment>) -> Diagnostics {
        self.teardown(current).await.diagnostics
    }

    /// Applies one plan step, returning the record to keep when it failed.
    async fn apply_step(
        &self,
        step: PlanStep,
        outcome: &mut ReconcileOutcome,
    ) -> Result<(), Option<AppliedAssignment>> {
        match step {
            PlanStep::Create(desired) => match self.create_one(&desired).await {
                Ok(applied) => {
                    outcome.summary.created += 1;
                    outcome.assignments.push(applied);
                    Ok(())
                }
                Err(error) => {
                    push_failure(
                        &mut outcome.diagnostics,
                        "failed to create role assignment",
                        describe_desired(&desired),
                        &error,
                    );
                    Err(None)
                }
            },
            PlanStep::Refresh {
                desired,
                mut current,
            } => match self.refresh_one(&mut current).await {
                Ok(RefreshResult::Refreshed) => {
                    outcome.summary.refreshed += 1;
                    outcome.assignments.push(current);
                    Ok(())
                }
                Ok(RefreshResult::Drifted | RefreshResult::NotMaterialized) => {
                    outcome.summary.drifted += 1;
                    match self.create_one(&desired).await {
                        Ok(applied) => {
                            outcome.summary.created += 1;
                            outcome.diagnostics.push_warning(
                                "role assignment recreated",
                                format!(
                                    "{} was missing and has been recreated",
                                    describe_desired(&desired)
                                ),
                            );
                            outcome.assignments.push(applied);
                            Ok(())
                        }
                        Err(error) => {
                            push_failure(
                                &mut outcome.diagnostics,
                                "failed to recreate role assignment",
                                describe_desired(&desired),
                                &error,
                            );
                            Err(Some(current))
                        }
                    }
                }
                Err(error) => {
                    push_failure(
                        &mut outcome.diagnostics,
                        "failed to read role assignment",
                        describe_applied(&current),
                        &error,
                    );
                    Err(Some(current))
                }
            },
        }
    }
}
