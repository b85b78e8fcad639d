//! Fixed-interval refresh scheduling.
//!
//! One background task ticks at the configured interval and runs a full
//! refresh cycle per tick. The first tick fires immediately, so starting
//! the scheduler is also the startup refresh. Cycles never overlap: a
//! tick that arrives while a cycle is still running is delayed, not
//! stacked.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::refresh::Refresher;

/// Owns the scheduler task. Dropping the handle detaches the task;
/// [`SchedulerHandle::stop`] shuts it down and waits for it.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal shutdown and wait for the in-flight cycle (if any) to end.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// Start the refresh scheduler.
pub fn start(refresher: Arc<Refresher>, interval: Duration) -> SchedulerHandle {
    start_with(interval, move || {
        let refresher = Arc::clone(&refresher);
        async move { refresher.run_cycle().await }
    })
}

/// Scheduler core, parameterized over the per-tick cycle.
fn start_with<F, Fut>(interval: Duration, mut cycle: F) -> SchedulerHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let (shutdown, mut shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        log::info!("scheduler started, interval {:?}", interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    log::debug!("refresh cycle starting");
                    cycle().await;
                }
                _ = shutdown_rx.changed() => {
                    log::info!("scheduler stopping");
                    break;
                }
            }
        }
    });

    SchedulerHandle { shutdown, task }
}
