//! Worker loop: one concurrent unit of the bounded probe run.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::payload::PayloadPool;
use super::state::RunState;
use super::transport::Transport;

/// Everything a worker needs, cloned once per worker.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub state: Arc<RunState>,
    pub transport: Arc<dyn Transport>,
    pub payloads: Arc<PayloadPool>,
    /// Wall-clock deadline for the run.
    pub deadline: tokio::time::Instant,
    /// Bound on a single I/O operation, so the stop flag is re-checked
    /// promptly.
    pub iter_timeout: Duration,
    /// Total attempts cap across all workers. `0` means unlimited.
    pub max_attempts: u64,
    /// Per-worker packets-per-second cap. `0` means unlimited.
    pub max_packet_rate: u32,
}

/// Run one worker until the stop flag, the deadline, or the attempts cap
/// trips. Transient I/O errors are counted and never end the loop.
pub(crate) async fn run_worker(id: u32, ctx: WorkerContext) {
    let mut packets_this_second: u32 = 0;
    let mut second_start = tokio::time::Instant::now();
    let mut first_error_logged = false;

    loop {
        // Bounds are re-checked at every iteration boundary.
        if ctx.state.is_stopped() || tokio::time::Instant::now() >= ctx.deadline {
            break;
        }
        if ctx.max_attempts > 0 && ctx.state.attempts() >= ctx.max_attempts {
            break;
        }

        // Rate limiting.
        if ctx.max_packet_rate > 0 {
            let now = tokio::time::Instant::now();
            if now.duration_since(second_start) >= Duration::from_secs(1) {
                packets_this_second = 0;
                second_start = now;
            }
            if packets_this_second >= ctx.max_packet_rate {
                // Budget spent; sleep out the rest of the window, but never
                // past the deadline.
                let window_end = second_start + Duration::from_secs(1);
                tokio::time::sleep_until(window_end.min(ctx.deadline)).await;
                continue;
            }
            packets_this_second += 1;
        }

        let payload = ctx.payloads.next();
        ctx.state.record_attempt();

        match tokio::time::timeout(ctx.iter_timeout, ctx.transport.probe_once(&payload)).await {
            Ok(Ok(bytes)) => {
                ctx.state.record_success(bytes);
            }
            Ok(Err(e)) => {
                ctx.state.record_failure();
                if !first_error_logged {
                    warn!(worker = id, error = %e, "probe error, continuing");
                    first_error_logged = true;
                } else {
                    debug!(worker = id, error = %e, "probe error");
                }
            }
            Err(_) => {
                ctx.state.record_failure();
                debug!(worker = id, timeout_ms = ctx.iter_timeout.as_millis() as u64, "probe timed out");
            }
        }
    }

    debug!(worker = id, "worker exiting");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::transport::{self, ProbeMethod};

    async fn loopback_ctx(
        deadline_ms: u64,
        max_attempts: u64,
        max_packet_rate: u32,
    ) -> (WorkerContext, tokio::net::UdpSocket) {
        // A bound socket we own, so sends always have a live destination.
        let listener = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = listener.local_addr().unwrap();

        let transport = transport::build(ProbeMethod::Udp, target).await.unwrap();
        let ctx = WorkerContext {
            state: Arc::new(RunState::new()),
            transport: Arc::from(transport),
            payloads: Arc::new(PayloadPool::new(64, 4)),
            deadline: tokio::time::Instant::now() + Duration::from_millis(deadline_ms),
            iter_timeout: Duration::from_millis(250),
            max_attempts,
            max_packet_rate,
        };
        (ctx, listener)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_worker_stops_at_deadline() {
        let (ctx, _listener) = loopback_ctx(200, 0, 0).await;
        let state = ctx.state.clone();

        run_worker(0, ctx).await;

        let snap = state.snapshot();
        assert!(snap.attempts > 0, "worker should have made attempts");
        assert!(snap.attempts >= snap.successes);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_worker_observes_stop_flag() {
        let (ctx, _listener) = loopback_ctx(10_000, 0, 0).await;
        let state = ctx.state.clone();

        let worker = tokio::spawn(run_worker(0, ctx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        state.request_stop();

        // The worker must exit well before the 10s deadline.
        tokio::time::timeout(Duration::from_secs(2), worker)
            .await
            .expect("worker should exit promptly after stop")
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_worker_honors_attempts_cap() {
        let (ctx, _listener) = loopback_ctx(10_000, 50, 0).await;
        let state = ctx.state.clone();

        tokio::time::timeout(Duration::from_secs(5), run_worker(0, ctx))
            .await
            .expect("worker should exit at the attempts cap");

        // A single worker checks the cap before each attempt, so it lands
        // exactly on it.
        assert_eq!(state.snapshot().attempts, 50);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_worker_rate_cap_bounds_attempts() {
        // 10 packets/sec for ~1.1s: expect roughly one window's budget,
        // never an unbounded burst.
        let (ctx, _listener) = loopback_ctx(1100, 0, 10).await;
        let state = ctx.state.clone();

        run_worker(0, ctx).await;

        let attempts = state.snapshot().attempts;
        assert!(attempts >= 10, "expected at least one window, got {attempts}");
        assert!(attempts <= 30, "rate cap not enforced, got {attempts}");
    }
}
