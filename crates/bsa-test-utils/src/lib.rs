//! Testing utilities for BSA workspace
//!
//! Shared test helpers, fixtures, and assertions.

#![allow(missing_docs)]

use bsa_core::{
    AuthorityConfig, CanonicalState, Proposal, StateAuthority, APPLIED, LAST_PROCESSED_INTENT,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Authority backed by a throwaway repository directory
///
/// The directory is deleted when the value is dropped.
pub struct TestRepo {
    dir: TempDir,
    pub authority: Arc<StateAuthority>,
}

impl TestRepo {
    pub fn new() -> Self {
        Self::with_interval(Duration::from_millis(25))
    }

    pub fn with_interval(interval: Duration) -> Self {
        let dir = TempDir::new().expect("create temp repo");
        let config = AuthorityConfig::new()
            .with_repo_path(dir.path())
            .with_reconcile_interval(interval);
        Self {
            authority: Arc::new(StateAuthority::new(config)),
            dir,
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn staging_dir(&self) -> &Path {
        self.authority.staging().root()
    }

    /// Write raw bytes into the staging directory, bypassing validation
    pub fn write_raw_entry(&self, file_name: &str, content: &[u8]) {
        std::fs::create_dir_all(self.staging_dir()).expect("create staging dir");
        std::fs::write(self.staging_dir().join(file_name), content).expect("write raw entry");
    }

    /// Names of all files currently in staging
    pub fn staged_files(&self) -> Vec<String> {
        let Ok(listing) = std::fs::read_dir(self.staging_dir()) else {
            return Vec::new();
        };
        let mut names: Vec<String> = listing
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}

pub fn proposal(intent_id: &str) -> Proposal {
    Proposal::new(intent_id, format!("{intent_id}=1"))
}

/// Assert `intent_id` was applied and is the most recent intent
pub fn assert_applied_last(state: &CanonicalState, intent_id: &str) {
    assert_applied(state, intent_id);
    assert_eq!(
        state.get(LAST_PROCESSED_INTENT).and_then(|v| v.as_str()),
        Some(intent_id),
        "last_processed_intent"
    );
}

pub fn assert_applied(state: &CanonicalState, intent_id: &str) {
    assert_eq!(
        state.get(intent_id).and_then(|v| v.as_str()),
        Some(APPLIED),
        "intent {intent_id} not applied"
    );
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
