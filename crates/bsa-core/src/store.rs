//! Canonical state store
//!
//! One reader/writer lock over the whole mapping:
//! - Snapshots take the shared lock and return a deep copy
//! - Mutation happens only through a [`StateWriter`], which holds the
//!   exclusive lock for as long as it lives

use parking_lot::{RwLock, RwLockWriteGuard};
use serde_json::Value;
use std::collections::BTreeMap;

/// Reserved key tracking the most recently applied intent id
pub const LAST_PROCESSED_INTENT: &str = "last_processed_intent";

/// Sentinel stored under every applied intent id
pub const APPLIED: &str = "applied";

/// Version selector meaning "current state"
pub const LATEST_VERSION: &str = "latest";

/// The authoritative mapping served by the read path
pub type CanonicalState = BTreeMap<String, Value>;

/// In-memory canonical state behind a single lock
#[derive(Debug, Default)]
pub struct StateStore {
    state: RwLock<CanonicalState>,
}

impl StateStore {
    /// Create an empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current canonical state
    ///
    /// `version` is accepted for forward compatibility; only the latest
    /// state is retained, so every selector resolves to it. The copy shares
    /// nothing with the live mapping.
    #[must_use]
    pub fn snapshot(&self, version: Option<&str>) -> CanonicalState {
        if let Some(requested) = version.filter(|v| !v.is_empty() && *v != LATEST_VERSION) {
            tracing::debug!(requested, "version selector ignored, serving latest state");
        }
        self.state.read().clone()
    }

    /// Acquire the exclusive lock for a multi-entry critical section
    ///
    /// Snapshots block until the returned writer is dropped.
    #[must_use]
    pub fn write(&self) -> StateWriter<'_> {
        StateWriter {
            guard: self.state.write(),
        }
    }

    /// Apply a single intent under its own exclusive lock
    pub fn apply(&self, intent_id: &str, patch: &str) {
        self.write().apply(intent_id, patch);
    }

    /// Number of keys in canonical state
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    /// Whether canonical state holds no keys
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().is_empty()
    }
}

/// Exclusive access to canonical state
pub struct StateWriter<'a> {
    guard: RwLockWriteGuard<'a, CanonicalState>,
}

impl StateWriter<'_> {
    /// Fold an intent into canonical state
    ///
    /// Records `intent_id -> "applied"` and moves `last_processed_intent` to
    /// `intent_id`. The patch is opaque and not merged. Applying the same
    /// intent again leaves the state unchanged.
    pub fn apply(&mut self, intent_id: &str, _patch: &str) {
        self.guard
            .insert(intent_id.to_string(), Value::String(APPLIED.to_string()));
        self.guard.insert(
            LAST_PROCESSED_INTENT.to_string(),
            Value::String(intent_id.to_string()),
        );
    }

    /// Read a key while holding the lock
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.guard.get(key)
    }
}

impl std::fmt::Debug for StateWriter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateWriter")
            .field("keys", &self.guard.len())
            .finish()
    }
}
