use std::sync::Arc;

use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::location::WatchSubscription;

use super::controller::SessionCore;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

/// Feed every watch sample into the session until cancelled or the source
/// hangs up.
pub(crate) async fn watch_loop(
    core: Arc<SessionCore>,
    mut subscription: WatchSubscription,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                log_info!("position watch shutting down");
                break;
            }
            sample = subscription.next() => match sample {
                Some(sample) => core.handle_sample(sample, false).await,
                None => {
                    log_info!("position source closed the watch");
                    break;
                }
            }
        }
    }
    subscription.cancel();
}

/// Re-roll the safety score every `period`. The first check runs one period
/// after start.
pub(crate) async fn health_check_loop(
    core: Arc<SessionCore>,
    period: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                core.health_check().await;
            }
            _ = cancel_token.cancelled() => {
                log_info!("health check loop shutting down");
                break;
            }
        }
    }
}

/// Re-fetch the geofence feed every `period`. A failed fetch keeps the
/// current snapshot.
pub(crate) async fn geofence_refresh_loop(
    core: Arc<SessionCore>,
    period: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = core.refresh_geofences().await {
                    log_error!("geofence refresh failed: {err:?}");
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("geofence refresh loop shutting down");
                break;
            }
        }
    }
}
