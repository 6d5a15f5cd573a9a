//! Background re-verification.

use crate::guard::LicenseGuard;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Spawns a task that calls [`LicenseGuard::refresh`] every `every`, starting
/// one interval from now. The startup check is the caller's job.
///
/// Verification runs on the blocking pool because fingerprinting may wait on
/// the operating system. Abort the returned handle to stop the task.
pub fn spawn_refresh_task(guard: Arc<LicenseGuard>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let guard = Arc::clone(&guard);
            match tokio::task::spawn_blocking(move || guard.refresh()).await {
                Ok(verdict) => debug!("scheduled license check: {}", verdict.message()),
                Err(e) => warn!("scheduled license check did not complete: {e}"),
            }
        }
    })
}
