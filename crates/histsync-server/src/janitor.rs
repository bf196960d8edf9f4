//! Background maintenance: release resolution and garbage collection.
//!
//! Best effort. Failures are logged and the loop keeps its schedule.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info};

use crate::api::AppState;
use crate::error::ServerError;
use crate::release::RefreshOutcome;

/// `time::interval` panics on a zero period.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Run one maintenance cycle: resolve the release, then reclaim rows.
pub async fn run_cycle(state: &AppState) {
    match state.release.refresh().await {
        Ok(RefreshOutcome::Resolved(version)) => {
            info!(version = %version, "Release version resolved");
        }
        Ok(RefreshOutcome::RateLimited) => {}
        Err(e) => error!(error = %e, "Failed to update release version"),
    }

    let gc = state
        .lock_db()
        .and_then(|db| db.collect_garbage().map_err(ServerError::from));
    match gc {
        Ok(stats) => info!(
            entries = stats.entries_deleted,
            deletion_requests = stats.deletion_requests_deleted,
            "Cleaned database"
        ),
        Err(e) => error!(error = %e, "Failed to clean database"),
    }
}

/// Spawn the periodic janitor.
pub fn spawn(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        time::sleep(state.config.cron_initial_delay).await;

        let mut interval = time::interval(state.config.cron_interval.max(MIN_INTERVAL));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            run_cycle(&state).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::{test_config, test_state};

    #[tokio::test]
    async fn zero_interval_keeps_janitor_alive() {
        let mut config = test_config();
        config.cron_initial_delay = Duration::ZERO;
        config.cron_interval = Duration::ZERO;

        let handle = spawn(test_state(config));
        time::sleep(Duration::from_millis(200)).await;

        assert!(!handle.is_finished());
        handle.abort();
    }
}
