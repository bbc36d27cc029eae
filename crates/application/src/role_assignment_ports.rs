mod gateway;
mod state_store;

pub use gateway::{CreateRoleAssignmentRequest, RemoteRoleAssignment, RoleAssignmentGateway};
pub use state_store::{AssignmentState, AssignmentStateStore};
