//! Typed workflow failures.
//!
//! Components return `anyhow::Result` like the rest of the crate; failures the
//! orchestrator must classify are raised as [`WorkflowError`] and recovered with
//! `downcast_ref` at the workflow boundary.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Which artifact a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    Archive,
    Statement,
    Solution,
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Artifact::Archive => "archive",
            Artifact::Statement => "statement",
            Artifact::Solution => "solution",
        })
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{artifact} {name} not found (searched: {})", display_paths(.searched))]
    NotFound {
        artifact: Artifact,
        name: String,
        searched: Vec<PathBuf>,
    },

    #[error("corrupt archive {}: {reason}", .path.display())]
    CorruptArchive { path: PathBuf, reason: String },

    #[error(
        "organize conflict: {} differs from existing {}",
        .incoming.display(),
        .existing.display()
    )]
    OrganizeConflict { incoming: PathBuf, existing: PathBuf },

    #[error("refusing to delete {}: {reason}", .path.display())]
    CleanupViolation { path: PathBuf, reason: String },

    #[error("invalid transition {from} -> {to}")]
    InvalidTransition {
        from: crate::core::types::WorkflowState,
        to: crate::core::types::WorkflowState,
    },
}

impl WorkflowError {
    /// Short stable identifier used in the run report.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::NotFound { .. } => "not_found",
            WorkflowError::CorruptArchive { .. } => "corrupt_archive",
            WorkflowError::OrganizeConflict { .. } => "organize_conflict",
            WorkflowError::CleanupViolation { .. } => "cleanup_violation",
            WorkflowError::InvalidTransition { .. } => "invalid_transition",
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "nothing".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
