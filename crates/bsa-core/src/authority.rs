//! State authority
//!
//! Owns the canonical state and the staging queue. Created once at process
//! start and shared by `Arc` between request handling and the reconciler.

use crate::config::AuthorityConfig;
use crate::error::AuthorityError;
use crate::proposal::Proposal;
use crate::staging::StagingQueue;
use crate::store::{CanonicalState, StateStore};

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Entries folded into canonical state
    pub applied: usize,
    /// Entries that could not be read or parsed; still staged
    pub failed: usize,
    /// Applied entries whose staging file could not be deleted
    pub remove_failures: usize,
}

impl PassReport {
    /// Entries the pass looked at
    #[inline]
    #[must_use]
    pub fn seen(&self) -> usize {
        self.applied + self.failed
    }

    /// Whether the pass found nothing staged
    #[inline]
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.seen() == 0
    }
}

/// Single-writer authority over canonical state
#[derive(Debug)]
pub struct StateAuthority {
    config: AuthorityConfig,
    store: StateStore,
    staging: StagingQueue,
}

impl StateAuthority {
    /// Create authority with empty canonical state
    #[must_use]
    pub fn new(config: AuthorityConfig) -> Self {
        let staging = StagingQueue::new(&config.repo_path);
        Self {
            config,
            store: StateStore::new(),
            staging,
        }
    }

    /// Create authority for a repository root with default settings
    #[must_use]
    pub fn open(repo_path: impl Into<std::path::PathBuf>) -> Self {
        Self::new(AuthorityConfig::new().with_repo_path(repo_path))
    }

    /// Snapshot of canonical state
    ///
    /// `version` is accepted but only the latest state exists.
    #[must_use]
    pub fn get_state(&self, version: Option<&str>) -> CanonicalState {
        self.store.snapshot(version)
    }

    /// Validate and stage a proposal
    ///
    /// Pure filesystem work; never waits on a reconciliation pass.
    ///
    /// # Errors
    /// - `AuthorityError::InvalidProposal` if required fields are missing
    /// - `AuthorityError::Staging` if the entry cannot be written
    pub fn propose_change(&self, proposal: &Proposal) -> Result<(), AuthorityError> {
        proposal.validate()?;

        tracing::info!(
            intent_id = %proposal.intent_id,
            provisional = proposal.provisional,
            "received proposal"
        );

        self.staging.enqueue(proposal)?;
        Ok(())
    }

    /// Fold every staged proposal into canonical state
    ///
    /// Holds the exclusive state lock for the whole pass. Per-entry failures
    /// are logged and skipped; unreadable entries stay staged for the next
    /// pass. An empty queue is a silent no-op.
    pub fn reconcile_once(&self) -> PassReport {
        let mut report = PassReport::default();
        let mut writer = self.store.write();

        let drain = match self.staging.drain() {
            Ok(drain) => drain,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list staged proposals");
                return report;
            }
        };

        if drain.len() == 0 {
            return report;
        }

        tracing::info!(count = drain.len(), "reconciling proposals");

        for (entry, parsed) in drain {
            let proposal = match parsed {
                Ok(proposal) => proposal,
                Err(e) => {
                    tracing::warn!(
                        entry = %entry.name(),
                        error = %e,
                        "leaving unreadable proposal staged"
                    );
                    report.failed += 1;
                    continue;
                }
            };

            writer.apply(&proposal.intent_id, &proposal.delta_patch);
            report.applied += 1;

            if let Err(e) = self.staging.remove(&entry) {
                tracing::warn!(
                    intent_id = %proposal.intent_id,
                    error = %e,
                    "applied proposal could not be removed from staging"
                );
                report.remove_failures += 1;
            }
        }

        drop(writer);

        tracing::debug!(
            applied = report.applied,
            failed = report.failed,
            remove_failures = report.remove_failures,
            "reconciliation pass complete"
        );

        report
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &AuthorityConfig {
        &self.config
    }

    /// Canonical state store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Staging queue
    #[inline]
    #[must_use]
    pub fn staging(&self) -> &StagingQueue {
        &self.staging
    }
}
