//! JSON file storage for the persisted applied set.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use polgrant_application::{AssignmentState, AssignmentStateStore};
use polgrant_core::{AppError, AppResult};
use polgrant_domain::AppliedAssignment;
use serde::{Deserialize, Serialize};
use tracing::debug;

const STATE_DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StateDocument {
    version: u32,
    reconciled_at: Option<DateTime<Utc>>,
    assignments: Vec<AppliedAssignment>,
}

/// File-backed state store writing a versioned JSON document.
///
/// Saves go through a sibling temporary file that is renamed over the target.
#[derive(Debug, Clone)]
pub struct JsonFileAssignmentStateStore {
    path: PathBuf,
}

impl JsonFileAssignmentStateStore {
    /// Creates a store for the given document path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the document path.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    fn temporary_path(&self) -> PathBuf {
        let mut file_name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        file_name.push(".tmp");
        self.path.with_file_name(file_name)
    }
}

#[async_trait]
impl AssignmentStateStore for JsonFileAssignmentStateStore {
    async fn load(&self) -> AppResult<AssignmentState> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no assignment state file yet");
                return Ok(AssignmentState::default());
            }
            Err(error) => {
                return Err(AppError::Internal(format!(
                    "failed to read assignment state '{}': {error}",
                    self.path.display()
                )));
            }
        };

        let document = serde_json::from_slice::<StateDocument>(&bytes).map_err(|error| {
            AppError::Validation(format!(
                "invalid assignment state '{}': {error}",
                self.path.display()
            ))
        })?;

        if document.version != STATE_DOCUMENT_VERSION {
            return Err(AppError::Validation(format!(
                "unsupported assignment state version {} in '{}'",
                document.version,
                self.path.display()
            )));
        }

        Ok(AssignmentState {
            assignments: document.assignments,
            reconciled_at: document.reconciled_at,
        })
    }

    async fn save(&self, state: &AssignmentState) -> AppResult<()> {
        let document = StateDocument {
            version: STATE_DOCUMENT_VERSION,
            reconciled_at: state.reconciled_at,
            assignments: state.assignments.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&document).map_err(|error| {
            AppError::Internal(format!("failed to encode assignment state: {error}"))
        })?;

        let temporary_path = self.temporary_path();
        tokio::fs::write(&temporary_path, bytes)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to write assignment state '{}': {error}",
                    temporary_path.display()
                ))
            })?;
        tokio::fs::rename(&temporary_path, &self.path)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to replace assignment state '{}': {error}",
                    self.path.display()
                ))
            })?;

        debug!(
            path = %self.path.display(),
            assignments = state.assignments.len(),
            "assignment state saved"
        );
        Ok(())
    }
}
