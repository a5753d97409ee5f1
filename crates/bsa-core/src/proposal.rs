//! Change proposals and submission-time validation

use crate::error::ProposalError;
use crate::store::LAST_PROCESSED_INTENT;
use serde::{Deserialize, Serialize};

/// A change request from an external agent
///
/// Identity is `intent_id`: two proposals with the same id are the same
/// logical change, and the later one replaces the earlier while staged.
/// Missing JSON fields deserialize to their defaults so that the validator,
/// not the decoder, reports them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Proposal {
    /// Caller-supplied unique identifier for the change
    pub intent_id: String,
    /// Opaque payload; stored, never interpreted
    pub delta_patch: String,
    /// Whether the submitter considers the change provisional
    pub provisional: bool,
}

impl Proposal {
    /// Create a non-provisional proposal
    #[inline]
    #[must_use]
    pub fn new(intent_id: impl Into<String>, delta_patch: impl Into<String>) -> Self {
        Self {
            intent_id: intent_id.into(),
            delta_patch: delta_patch.into(),
            provisional: false,
        }
    }

    /// With provisional flag
    #[inline]
    #[must_use]
    pub fn provisional(mut self, provisional: bool) -> Self {
        self.provisional = provisional;
        self
    }

    /// Run [`ProposalValidator::validate`] on this proposal
    pub fn validate(&self) -> Result<(), ProposalError> {
        ProposalValidator::validate(self)
    }
}

/// Stateless submission-time check
#[derive(Debug, Clone, Copy, Default)]
pub struct ProposalValidator;

impl ProposalValidator {
    /// Check required fields
    ///
    /// # Errors
    /// - `ProposalError::MissingIntentId` if `intent_id` is empty
    /// - `ProposalError::MissingDeltaPatch` if `delta_patch` is empty
    /// - `ProposalError::ReservedIntentId` if `intent_id` names the
    ///   `last_processed_intent` bookkeeping key
    pub fn validate(proposal: &Proposal) -> Result<(), ProposalError> {
        if proposal.intent_id.is_empty() {
            return Err(ProposalError::MissingIntentId);
        }
        if proposal.delta_patch.is_empty() {
            return Err(ProposalError::MissingDeltaPatch);
        }
        if proposal.intent_id == LAST_PROCESSED_INTENT {
            return Err(ProposalError::ReservedIntentId(proposal.intent_id.clone()));
        }
        Ok(())
    }
}
