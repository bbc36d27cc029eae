//! Set difference between desired and applied assignments.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::assignment::{AppliedAssignment, AssignmentMatchKey, DesiredAssignment};
use crate::assignment_key::AssignmentKey;

/// One step of a reconciliation plan, in desired order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanStep {
    /// The desired assignment has no applied counterpart.
    Create(DesiredAssignment),
    /// The desired assignment is already applied and only needs a refresh.
    Refresh {
        /// Desired entry, kept so a drifted assignment can be recreated.
        desired: DesiredAssignment,
        /// Applied record matched structurally or by assignment key.
        current: AppliedAssignment,
    },
}

/// Operations needed to move applied state to desired state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationPlan {
    steps: Vec<PlanStep>,
    deletions: Vec<AppliedAssignment>,
}

impl ReconciliationPlan {
    /// Computes the plan for a desired set against the current applied set.
    ///
    /// Desired entries are a set: structural duplicates collapse onto the first
    /// occurrence. A desired entry without a structural match adopts a live
    /// applied record carrying its assignment key, since the cloud may return
    /// the fields in another spelling. Drifted applied records never match and
    /// are scheduled for deletion. Duplicate applied records sharing a resource
    /// id with a kept record are dropped without a deletion so the live
    /// assignment survives.
    #[must_use]
    pub fn compute(desired: Vec<DesiredAssignment>, current: Vec<AppliedAssignment>) -> Self {
        let mut unmatched: Vec<Option<AppliedAssignment>> =
            current.into_iter().map(Some).collect();
        let mut by_match_key: HashMap<AssignmentMatchKey, VecDeque<usize>> = HashMap::new();
        for (position, applied) in unmatched.iter().enumerate() {
            if let Some(match_key) = applied.as_ref().and_then(AppliedAssignment::match_key) {
                by_match_key.entry(match_key).or_default().push_back(position);
            }
        }

        let mut seen = HashSet::new();
        let desired: Vec<DesiredAssignment> = desired
            .into_iter()
            .filter(|entry| seen.insert(entry.match_key()))
            .collect();

        let mut matches: Vec<Option<AppliedAssignment>> = desired
            .iter()
            .map(|entry| take_next(by_match_key.get_mut(&entry.match_key()), &mut unmatched))
            .collect();

        let mut by_assignment_key: HashMap<AssignmentKey, VecDeque<usize>> = HashMap::new();
        for (position, applied) in unmatched.iter().enumerate() {
            if let Some(applied) = applied
                .as_ref()
                .filter(|applied| applied.resource_id().is_some())
            {
                by_assignment_key
                    .entry(applied.assignment_key())
                    .or_default()
                    .push_back(position);
            }
        }
        for (entry, matched) in desired.iter().zip(matches.iter_mut()) {
            if matched.is_none() {
                *matched = take_next(
                    by_assignment_key.get_mut(&entry.assignment_key()),
                    &mut unmatched,
                );
            }
        }

        let steps: Vec<PlanStep> = desired
            .into_iter()
            .zip(matches)
            .map(|(desired, matched)| match matched {
                Some(current) => PlanStep::Refresh { desired, current },
                None => PlanStep::Create(desired),
            })
            .collect();

        let kept_resource_ids: HashSet<String> = steps
            .iter()
            .filter_map(|step| match step {
                PlanStep::Refresh { current, .. } => current.resource_id().map(str::to_owned),
                PlanStep::Create(_) => None,
            })
            .collect();

        let deletions = unmatched
            .into_iter()
            .flatten()
            .filter(|applied| {
                applied
                    .resource_id()
                    .is_none_or(|resource_id| !kept_resource_ids.contains(resource_id))
            })
            .collect();

        Self { steps, deletions }
    }

    /// Returns create and refresh steps in desired order.
    #[must_use]
    pub fn steps(&self) -> &[PlanStep] {
        self.steps.as_slice()
    }

    /// Returns applied records that are no longer desired.
    #[must_use]
    pub fn deletions(&self) -> &[AppliedAssignment] {
        self.deletions.as_slice()
    }

    /// Consumes the plan into its steps and deletions.
    #[must_use]
    pub fn into_parts(self) -> (Vec<PlanStep>, Vec<AppliedAssignment>) {
        (self.steps, self.deletions)
    }

    /// Returns the number of assignments to create.
    #[must_use]
    pub fn create_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| matches!(step, PlanStep::Create(_)))
            .count()
    }

    /// Returns the number of assignments that only need a refresh.
    #[must_use]
    pub fn refresh_count(&self) -> usize {
        self.steps.len() - self.create_count()
    }

    /// Returns the number of applied records to tear down.
    #[must_use]
    pub fn delete_count(&self) -> usize {
        self.deletions.len()
    }

    /// Returns true when the plan contains no mutations.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.create_count() == 0 && self.deletions.is_empty()
    }
}

fn take_next(
    positions: Option<&mut VecDeque<usize>>,
    unmatched: &mut [Option<AppliedAssignment>],
) -> Option<AppliedAssignment> {
    let positions = positions?;
    while let Some(position) = positions.pop_front() {
        if let Some(applied) = unmatched[position].take() {
            return Some(applied);
        }
    }
    None
}
