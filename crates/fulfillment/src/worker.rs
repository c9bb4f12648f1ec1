//! Periodic background tasks.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// Handle to a running periodic task.
pub struct WorkerHandle {
    name: &'static str,
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signals the task to stop after its current tick.
    pub fn stop(&self) {
        let _ = self.cancel.send(true);
    }

    /// Stops the task and waits for it to finish.
    pub async fn shutdown(self) {
        self.stop();
        if let Err(e) = self.task.await {
            tracing::warn!(worker = self.name, error = %e, "Worker task ended abnormally");
        }
    }
}

/// Runs `tick` every `interval` until the returned handle is stopped.
///
/// The first tick fires immediately. Missed ticks are skipped, so a slow
/// sweep never causes a burst of catch-up sweeps.
pub fn spawn_periodic<F, Fut>(name: &'static str, interval: Duration, mut tick: F) -> WorkerHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let (cancel, mut cancel_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(worker = name, "Worker started");

        loop {
            tokio::select! {
                _ = interval.tick() => tick().await,
                changed = cancel_rx.changed() => {
                    if changed.is_err() || *cancel_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!(worker = name, "Worker stopped");
    });

    WorkerHandle { name, cancel, task }
}
