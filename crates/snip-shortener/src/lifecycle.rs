//! Background hard-delete sweep.
//!
//! Soft-deleted links stay in the store until the sweep removes them. One
//! sweep task runs per service; it stops when its token is cancelled.

use snip_core::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Shortest accepted delay between two sweeps.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(100);

pub struct LifecycleManager;

impl LifecycleManager {
    /// Spawns the sweep task on the current runtime.
    ///
    /// The first sweep runs one full `interval` after spawning. A failed sweep
    /// is logged and the next tick tries again. Intervals shorter than
    /// [`MIN_SWEEP_INTERVAL`] are raised to it.
    pub fn spawn<S: Store>(
        store: Arc<S>,
        interval: Duration,
        token: CancellationToken,
    ) -> LifecycleHandle {
        if interval < MIN_SWEEP_INTERVAL {
            warn!(
                requested_ms = interval.as_millis() as u64,
                used_ms = MIN_SWEEP_INTERVAL.as_millis() as u64,
                "sweep interval too short, using the minimum"
            );
        }
        let interval = interval.max(MIN_SWEEP_INTERVAL);

        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => {
                        debug!("hard-delete sweep cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        match store.hard_delete_urls().await {
                            Ok(0) => {}
                            Ok(removed) => info!(removed, "hard-deleted soft-deleted links"),
                            Err(e) => error!(error = %e, "hard-delete sweep failed"),
                        }
                    }
                }
            }
        });

        LifecycleHandle { token, handle }
    }
}

/// Owner of a running sweep task.
#[derive(Debug)]
pub struct LifecycleHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl LifecycleHandle {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancels the sweep and waits for the task to exit.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            error!(error = %e, "hard-delete sweep task failed");
        }
    }
}
