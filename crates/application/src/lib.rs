//! Application services and ports.

#![forbid(unsafe_code)]

mod reconciliation_service;
mod role_assignment_ports;

pub use reconciliation_service::{
    ReconcileMode, ReconcileOutcome, ReconcileRun, ReconcileSummary, RoleAssignmentReconciler,
};
pub use role_assignment_ports::{
    AssignmentState, AssignmentStateStore, CreateRoleAssignmentRequest, RemoteRoleAssignment,
    RoleAssignmentGateway,
};
