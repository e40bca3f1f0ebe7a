use core::time::Duration;
use sift_ingest::Counters;
use std::sync::Arc;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

/// Logs a counter snapshot every `period` until `shutdown` fires.
///
/// This is the log-only counterpart of the `metrics` exporter: it reads the
/// shared [`Counters`] and never writes to them.
pub async fn report_counters(
    counters: Arc<Counters>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let snap = counters.snapshot();
                tracing::info!(
                    ingested = snap.ingested,
                    classified = snap.classified,
                    parse_errors = snap.parse_errors,
                    persistence_errors = snap.persistence_errors,
                    "Pipeline counters"
                );
            }
        }
    }
}
