//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod assignment;
mod assignment_key;
mod reconciliation_plan;
mod role_definition;

pub use assignment::{AppliedAssignment, AssignmentMatchKey, DesiredAssignment};
pub use assignment_key::{ASSIGNMENT_KEY_NAMESPACE, AssignmentKey};
pub use reconciliation_plan::{PlanStep, ReconciliationPlan};
pub use role_definition::{SUBSCRIPTION_SCOPED_SEGMENT_COUNT, normalize_role_definition_id};
