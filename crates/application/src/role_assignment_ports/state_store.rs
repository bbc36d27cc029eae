use async_trait::async_trait;
use chrono::{DateTime, Utc};

use polgrant_core::AppResult;
use polgrant_domain::AppliedAssignment;

/// Persisted applied set carried between reconciliation passes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentState {
    /// Applied assignments, drifted records included.
    pub assignments: Vec<AppliedAssignment>,
    /// Completion time of the pass that produced this state.
    pub reconciled_at: Option<DateTime<Utc>>,
}

impl AssignmentState {
    /// Returns true when no pass has ever applied an assignment.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

/// Storage port for the persisted applied set.
#[async_trait]
pub trait AssignmentStateStore: Send + Sync {
    /// Loads the last saved state; a store that was never written yields an
    /// empty state.
    async fn load(&self) -> AppResult<AssignmentState>;

    /// Replaces the stored state.
    async fn save(&self, state: &AssignmentState) -> AppResult<()>;
}
