//! Error types for the BSA core
//!
//! Provides error handling for:
//! - Proposal validation at submission time
//! - Staging I/O (enqueue, drain, remove)
//! - Corrupt staged entries

use std::path::PathBuf;

/// Proposal validation errors
///
/// Surfaced synchronously to the submitter and never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProposalError {
    /// `intent_id` is empty
    #[error("intent_id is required")]
    MissingIntentId,

    /// `delta_patch` is empty
    #[error("delta_patch is required")]
    MissingDeltaPatch,

    /// `intent_id` collides with a key the state store maintains itself
    #[error("intent_id '{0}' is reserved")]
    ReservedIntentId(String),
}

/// Staging queue errors
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    /// Proposal rejected before anything was written
    #[error(transparent)]
    Validation(#[from] ProposalError),

    /// Filesystem failure while creating, reading, writing or deleting an entry
    #[error("staging io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Staged entry exists but does not deserialize into a proposal
    #[error("corrupt staged entry {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Proposal could not be serialized
    #[error("failed to serialize proposal: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl StagingError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create parse error for path
    pub fn parse_error(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Parse {
            path: path.into(),
            source,
        }
    }

    /// Check if error is a validation failure
    #[inline]
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if a later reconciliation pass may succeed where this one failed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Parse { .. })
    }
}

/// Errors returned by [`crate::StateAuthority`] operations
#[derive(Debug, thiserror::Error)]
pub enum AuthorityError {
    /// Proposal failed validation
    #[error(transparent)]
    InvalidProposal(#[from] ProposalError),

    /// Proposal could not be staged
    #[error("failed to stage proposal: {0}")]
    Staging(StagingError),
}

impl From<StagingError> for AuthorityError {
    fn from(value: StagingError) -> Self {
        match value {
            StagingError::Validation(e) => Self::InvalidProposal(e),
            other => Self::Staging(other),
        }
    }
}

impl AuthorityError {
    /// Check if the submitter is at fault
    #[inline]
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidProposal(_))
    }
}
