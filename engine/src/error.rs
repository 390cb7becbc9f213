//! Typed failures for lab resolution, staging, and evaluation.
//!
//! Every variant belongs to one [`ErrorKind`], which is what callers (the CLI
//! and the HTTP surface) branch on. Collaborator failures arrive as
//! `anyhow::Error` and are carried through untouched.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::core::types::SessionStatus;

pub type LabResult<T> = std::result::Result<T, LabError>;

/// Coarse classification used to pick exit codes and HTTP statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The lab definition is wrong and must be fixed by its author.
    Configuration,
    /// Unknown lab id or session id.
    NotFound,
    /// The request collides with existing state (staging dir, finished session).
    Conflict,
    /// A submission could not be evaluated.
    Validation,
    /// I/O or collaborator failure.
    Internal,
}

#[derive(Debug, Error)]
pub enum LabError {
    #[error("parameter {name}: unsupported parameter type '{kind}'")]
    UnsupportedParameterType { name: String, kind: String },

    #[error("parameter {name}: choice parameter needs a non-empty `choices` list")]
    InvalidChoiceSpec { name: String },

    #[error("parameter {name}: missing required `{field}`")]
    MissingParameterBound { name: String, field: &'static str },

    #[error("parameter {name}: {reason}")]
    InvalidParameterBound { name: String, reason: String },

    #[error("parameter {name} is declared more than once")]
    DuplicateParameter { name: String },

    #[error("parameter name {name} is reserved")]
    ReservedParameterName { name: String },

    #[error("artifact name '{name}' must be a single path segment")]
    InvalidArtifactName { name: String },

    #[error("template references unknown placeholder '{name}'")]
    UnresolvedPlaceholder { name: String },

    #[error("path '{path}' resolves outside the staging directory")]
    PathEscapesStaging { path: String },

    #[error("lab {lab_id} not found")]
    LabNotFound { lab_id: String },

    #[error("session {session_id} not found")]
    SessionNotFound { session_id: String },

    #[error("invalid session id '{session_id}'")]
    InvalidSessionId { session_id: String },

    #[error("staging directory for session {session_id} already exists")]
    StagingConflict { session_id: String },

    #[error("session {session_id} already finished with status {status}")]
    SessionFinished {
        session_id: String,
        status: SessionStatus,
    },

    #[error("unsupported validator type '{kind}'")]
    UnknownValidatorType { kind: String },

    #[error("validator {kind}: missing string field `{field}`")]
    MissingValidatorField { kind: String, field: String },

    #[error("session {session_id}: stored parameters are not valid JSON")]
    CorruptSnapshot {
        session_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{context} {}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

impl LabError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedParameterType { .. }
            | Self::InvalidChoiceSpec { .. }
            | Self::MissingParameterBound { .. }
            | Self::InvalidParameterBound { .. }
            | Self::DuplicateParameter { .. }
            | Self::ReservedParameterName { .. }
            | Self::InvalidArtifactName { .. }
            | Self::UnresolvedPlaceholder { .. }
            | Self::PathEscapesStaging { .. } => ErrorKind::Configuration,
            Self::LabNotFound { .. } | Self::SessionNotFound { .. } => ErrorKind::NotFound,
            Self::InvalidSessionId { .. } => ErrorKind::NotFound,
            Self::StagingConflict { .. } | Self::SessionFinished { .. } => ErrorKind::Conflict,
            Self::UnknownValidatorType { .. } | Self::MissingValidatorField { .. } => {
                ErrorKind::Validation
            }
            Self::CorruptSnapshot { .. } | Self::Io { .. } | Self::Collaborator(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            context,
            path: path.into(),
            source,
        }
    }
}
