//! Periodic jobs: keep-alive ping and background node refresh.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::processor::Job;

/// Queues `make()` every `period` until cancelled.
///
/// The jobs go through the regular queue, so they never overtake a
/// command already submitted.
pub(crate) async fn ticker_pump(
    queue: mpsc::UnboundedSender<Job>,
    period: Duration,
    make: fn() -> Job,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval.tick().await; // Skip immediate first tick.

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let job = make();
                trace!(kind = ?job.kind(), "periodic job queued");
                if queue.send(job).is_err() {
                    break;
                }
            }
        }
    }
}
