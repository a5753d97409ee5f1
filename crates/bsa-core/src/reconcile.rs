//! Background reconciliation loop
//!
//! Two states: idle until the next tick, then one reconciliation pass. The
//! loop has no failure mode of its own; it runs until its handle asks it to
//! stop or is dropped.

use crate::authority::StateAuthority;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Periodic driver for [`StateAuthority::reconcile_once`]
#[derive(Debug)]
pub struct Reconciler {
    authority: Arc<StateAuthority>,
    interval: Duration,
}

impl Reconciler {
    /// Reconciler using the authority's configured interval
    ///
    /// # Panics
    /// Panics if the configured `reconcile_interval` is zero.
    #[must_use]
    pub fn new(authority: Arc<StateAuthority>) -> Self {
        let interval = authority.config().reconcile_interval;
        Self::with_interval(authority, interval)
    }

    /// Reconciler with an explicit interval
    ///
    /// # Panics
    /// Panics if `interval` is zero.
    #[must_use]
    pub fn with_interval(authority: Arc<StateAuthority>, interval: Duration) -> Self {
        assert!(!interval.is_zero(), "reconcile interval must be non-zero");
        Self {
            authority,
            interval,
        }
    }

    /// Start the loop on the current tokio runtime
    ///
    /// The first pass runs one interval after spawning.
    #[must_use]
    pub fn spawn(self) -> ReconcilerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(stop_rx));
        ReconcilerHandle {
            stop: stop_tx,
            task: Some(task),
        }
    }

    async fn run(self, mut stop: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.interval,
            self.interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval = ?self.interval, "reconciliation loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = stop.changed() => {
                    // Sender dropped counts as a stop request
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let authority = Arc::clone(&self.authority);
            if let Err(e) = tokio::task::spawn_blocking(move || authority.reconcile_once()).await {
                tracing::error!(error = %e, "reconciliation pass panicked");
            }
        }

        tracing::info!("reconciliation loop stopped");
    }
}

/// Stop signal and join handle for a running [`Reconciler`]
///
/// Dropping the handle stops the loop after any in-flight pass.
#[derive(Debug)]
pub struct ReconcilerHandle {
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl ReconcilerHandle {
    /// Ask the loop to stop without waiting for it
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    /// Stop the loop and wait for the in-flight pass, if any, to finish
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "reconciliation task failed");
            }
        }
    }

    /// Whether the loop task has exited
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for ReconcilerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
