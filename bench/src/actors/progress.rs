use crate::counter::MessageCounter;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Logs counter snapshots every `interval` until `stop` is cancelled.
pub fn spawn_progress_reporter(
    counter: Arc<MessageCounter>,
    interval: Duration,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if interval.is_zero() {
            stop.cancelled().await;
            return;
        }

        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    info!(
                        "processed: {}/{}, {:.2} msg/s",
                        counter.count(),
                        counter.expected(),
                        counter.mean_per_second()
                    );
                }
            }
        }
    })
}
