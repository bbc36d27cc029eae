//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod arm_role_assignment_gateway;
mod in_memory_role_assignment_gateway;
mod json_file_assignment_state_store;
mod json_file_desired_assignment_source;

pub use arm_role_assignment_gateway::{
    ArmGatewaySettings, ArmRoleAssignmentGateway, DEFAULT_ARM_ENDPOINT,
    DEFAULT_ROLE_ASSIGNMENT_API_VERSION,
};
pub use in_memory_role_assignment_gateway::InMemoryRoleAssignmentGateway;
pub use json_file_assignment_state_store::JsonFileAssignmentStateStore;
pub use json_file_desired_assignment_source::JsonFileDesiredAssignmentSource;
