//! Authority configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default repository root
pub const DEFAULT_REPO_PATH: &str = "./data";

/// Default reconciliation interval
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(5);

/// Configuration for a [`crate::StateAuthority`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityConfig {
    /// Repository root; staging lives under `<repo_path>/staging`
    pub repo_path: PathBuf,
    /// Time between reconciliation passes
    pub reconcile_interval: Duration,
}

impl AuthorityConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With repository root
    #[inline]
    #[must_use]
    pub fn with_repo_path(mut self, repo_path: impl Into<PathBuf>) -> Self {
        self.repo_path = repo_path.into();
        self
    }

    /// With reconciliation interval
    #[inline]
    #[must_use]
    pub fn with_reconcile_interval(mut self, interval: Duration) -> Self {
        self.reconcile_interval = interval;
        self
    }
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            repo_path: PathBuf::from(DEFAULT_REPO_PATH),
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
        }
    }
}
