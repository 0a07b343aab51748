use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::session::SessionRegistry;

/// Run [`SessionRegistry::check_all_health`] every `period` until `cancel` fires.
pub fn spawn_health_monitor(
    registry: Arc<SessionRegistry>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer.tick().await; // Skip the first immediate tick

        info!(period_secs = period.as_secs(), "session health monitor started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = timer.tick() => {
                    let dropped = registry.check_all_health().await;
                    debug!(dropped, "periodic session health check");
                }
            }
        }
        info!("session health monitor stopped");
    })
}
