//! JSON file source for the desired assignment set.

use std::path::{Path, PathBuf};

use polgrant_core::{AppError, AppResult};
use polgrant_domain::DesiredAssignment;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DesiredAssignmentDocument {
    assignments: Vec<DesiredAssignment>,
}

/// Reads desired assignments from `{"assignments": [...]}` documents.
#[derive(Debug, Clone)]
pub struct JsonFileDesiredAssignmentSource {
    path: PathBuf,
}

impl JsonFileDesiredAssignmentSource {
    /// Creates a source for the given document path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the document path.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Loads and validates every desired assignment in the document.
    pub async fn load(&self) -> AppResult<Vec<DesiredAssignment>> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|error| {
            AppError::Validation(format!(
                "failed to read desired assignments '{}': {error}",
                self.path.display()
            ))
        })?;

        parse_document(&bytes).map_err(|error| {
            AppError::Validation(format!(
                "invalid desired assignments '{}': {error}",
                self.path.display()
            ))
        })
    }
}

fn parse_document(bytes: &[u8]) -> Result<Vec<DesiredAssignment>, serde_json::Error> {
    serde_json::from_slice::<DesiredAssignmentDocument>(bytes).map(|document| document.assignments)
}
