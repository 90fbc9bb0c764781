//! Typed error hierarchy for the conductor engine.
//!
//! Three top-level enums cover the three places where things can go wrong:
//! - `CollaboratorError` — a dialogue, docs, implementation or audit call failed
//! - `WorkspaceError` — the project's file tree is unusable or already claimed
//! - `ResolveError` — an operator resolution was requested in the wrong phase
//!
//! Missing artifacts are not errors (they drive phase inference) and permission
//! denials are values (`scope::PermissionDecision`), so neither appears here.

use std::path::PathBuf;
use thiserror::Error;

use crate::agents::Role;
use crate::state::Phase;

/// Errors from a single collaborator call.
///
/// The Action Executor catches every variant and records it as a failed
/// outcome; none of them stops the orchestration loop.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("{role} session used before it was acquired")]
    NotConnected { role: Role },

    #[error("{role} call timed out after {secs}s")]
    Timeout { role: Role, secs: u64 },

    #[error("Failed to spawn {role} process: {source}")]
    Spawn {
        role: Role,
        #[source]
        source: std::io::Error,
    },

    #[error("{role} process exited with code {code}: {stderr}")]
    NonZeroExit {
        role: Role,
        code: i32,
        stderr: String,
    },

    #[error("{role} reported an error: {message}")]
    Reported { role: Role, message: String },

    #[error("{role} returned an empty response")]
    EmptyResponse { role: Role },

    #[error("I/O error talking to {role}: {source}")]
    Io {
        role: Role,
        #[source]
        source: std::io::Error,
    },
}

impl CollaboratorError {
    /// The collaborator role the failure belongs to.
    pub fn role(&self) -> Role {
        match self {
            CollaboratorError::NotConnected { role }
            | CollaboratorError::Timeout { role, .. }
            | CollaboratorError::Spawn { role, .. }
            | CollaboratorError::NonZeroExit { role, .. }
            | CollaboratorError::Reported { role, .. }
            | CollaboratorError::EmptyResponse { role }
            | CollaboratorError::Io { role, .. } => *role,
        }
    }
}

/// Errors from the workspace file tree.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Invalid project name '{name}': {reason}")]
    InvalidProjectName { name: String, reason: String },

    #[error("Workspace is busy: another run holds {}", lock.display())]
    Busy { lock: PathBuf },

    #[error("Required artifact is missing: {}", path.display())]
    MissingArtifact { path: PathBuf },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WorkspaceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WorkspaceError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors from operator resolution of a failed audit.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Nothing to resolve: project is in phase {phase}, resolution needs a failed audit")]
    NotFailed { phase: Phase },

    #[error("Revising the architecture failed: {0}")]
    RevisionFailed(String),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}
