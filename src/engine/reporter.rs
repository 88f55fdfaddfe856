//! Reporter task: periodic progress snapshots for one run.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tracing::debug;

use super::state::{ProgressSnapshot, RunState};

/// Publish a snapshot of the run counters on a fixed interval until the stop
/// flag is observed or the driver signals shutdown.
///
/// Each tick is independent; missed ticks are skipped, never buffered. The
/// watch channel keeps only the latest snapshot, so a slow subscriber delays
/// nothing.
pub(crate) async fn run_reporter(
    run_id: String,
    state: Arc<RunState>,
    progress_tx: watch::Sender<ProgressSnapshot>,
    interval: Duration,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; skip it so the first snapshot lands
    // one full interval into the run.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown_rx => {
                debug!(run_id = run_id.as_str(), "reporter shutdown signal received");
                break;
            }
            _ = ticker.tick() => {
                if state.is_stopped() {
                    break;
                }
                let snap = state.snapshot();
                debug!(
                    run_id = run_id.as_str(),
                    attempts = snap.attempts,
                    successes = snap.successes,
                    failures = snap.failures,
                    rate = snap.rate,
                    "progress"
                );
                if progress_tx.send(snap).is_err() {
                    // Every receiver is gone; nothing left to report to.
                    break;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
