//! Periodic trial-expiry re-evaluation.
//!
//! A trial's gate flips from full access to the activation prompt purely
//! because wall-clock time passes. The watcher re-runs
//! [`LicenseStatusMachine::publish_gate`] every interval, so subscribers see
//! the flip at most one interval late.

use crate::machine::LicenseStatusMachine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Handle to the background polling task.
///
/// Dropping the handle also stops the task.
pub struct TrialExpiryWatcher {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl TrialExpiryWatcher {
    /// Start polling. The first check runs one `interval` from now.
    pub fn spawn(machine: Arc<LicenseStatusMachine>, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run(machine, interval, shutdown_rx));
        info!(interval_ms = interval.as_millis() as u64, "Trial expiry watcher started");
        Self {
            shutdown_tx: Some(shutdown_tx),
            task,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop polling and wait for the task to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}

async fn run(
    machine: Arc<LicenseStatusMachine>,
    period: Duration,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                info!("Shutting down trial expiry watcher");
                break;
            }
            _ = ticker.tick() => {
                let gate = machine.publish_gate();
                debug!(gate = ?gate, "Trial expiry check");
            }
        }
    }
}
