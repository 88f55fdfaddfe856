//! Controller: validates a run request, spawns the run, owns its lifecycle.
//!
//! The driver task spawned here owns every worker and the reporter; all of
//! them are joined before the final report is produced, so a finished run
//! leaves no background work behind.

use std::sync::Arc;

use tokio::sync::{oneshot, watch};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::policy;

use super::payload::PayloadPool;
use super::state::RunState;
use super::transport::{self, Transport};
use super::worker::{self, WorkerContext};
use super::{reporter, EndState, FinalReport, RunConfig, RunHandle, ValidationError};

/// Validate `config` and start a probe run.
///
/// Non-blocking: returns a [`RunHandle`] as soon as the driver task is
/// spawned. Validation failures reject the run before any resource is
/// created. The permitted-range check on the target happens here,
/// unconditionally; callers cannot opt out of it.
pub async fn start(config: RunConfig, engine: &EngineConfig) -> Result<RunHandle, ValidationError> {
    if config.width == 0 {
        return Err(ValidationError::ZeroWidth);
    }
    if config.width > engine.limits.max_width {
        return Err(ValidationError::WidthTooLarge {
            requested: config.width,
            max: engine.limits.max_width,
        });
    }
    if config.duration.is_zero() {
        return Err(ValidationError::ZeroDuration);
    }
    let max_duration = std::time::Duration::from_secs(engine.limits.max_duration_sec);
    if config.duration > max_duration {
        return Err(ValidationError::DurationTooLong {
            requested_sec: config.duration.as_secs(),
            max_sec: engine.limits.max_duration_sec,
        });
    }

    let addr = policy::resolve_target(&config.target).await?;

    let run_id = Uuid::new_v4().to_string();
    let state = Arc::new(RunState::new());
    let (progress_tx, progress_rx) = watch::channel(state.snapshot());

    info!(
        run_id = run_id.as_str(),
        target = %addr,
        method = %config.method,
        duration_sec = config.duration.as_secs_f64(),
        width = config.width,
        "starting probe run"
    );

    let driver = tokio::spawn(drive(
        run_id.clone(),
        config.clone(),
        addr,
        state.clone(),
        progress_tx,
        engine.clone(),
    ));

    Ok(RunHandle {
        run_id,
        target: addr.to_string(),
        method: config.method,
        state,
        progress_rx,
        driver,
    })
}

/// Own the whole run: acquire the transport, spawn workers and the reporter,
/// join everything, emit the terminal snapshot, and build the final report.
async fn drive(
    run_id: String,
    config: RunConfig,
    addr: std::net::SocketAddr,
    state: Arc<RunState>,
    progress_tx: watch::Sender<super::ProgressSnapshot>,
    engine: EngineConfig,
) -> FinalReport {
    let target = addr.to_string();

    // Socket acquisition failure is fatal: the run ends Failed with no
    // workers spawned.
    let transport: Arc<dyn Transport> = match transport::build(config.method, addr).await {
        Ok(t) => Arc::from(t),
        Err(e) => {
            warn!(run_id = run_id.as_str(), error = %e, "transport setup failed");
            state.request_stop();
            return FinalReport {
                run_id,
                target,
                method: config.method,
                attempts: 0,
                successes: 0,
                failures: 0,
                bytes_sent: 0,
                elapsed_sec: state.elapsed().as_secs_f64(),
                rate: 0.0,
                end_state: EndState::Failed,
                finished_at: chrono::Utc::now(),
                error: Some(e.to_string()),
            };
        }
    };

    let payloads = Arc::new(PayloadPool::new(
        engine.probe.payload_size,
        engine.probe.payload_pool,
    ));
    let deadline = tokio::time::Instant::now() + config.duration;

    // The operator's hard cap wins over whatever the run requested.
    let max_attempts = match (engine.limits.max_attempts, config.max_attempts) {
        (0, run_cap) => run_cap,
        (hard_cap, 0) => hard_cap,
        (hard_cap, run_cap) => hard_cap.min(run_cap),
    };

    let ctx = WorkerContext {
        state: state.clone(),
        transport,
        payloads,
        deadline,
        iter_timeout: engine.probe.iter_timeout(),
        max_attempts,
        max_packet_rate: engine.limits.max_packet_rate,
    };

    let interval = config
        .report_interval
        .unwrap_or_else(|| engine.probe.report_interval());
    let (reporter_shutdown_tx, reporter_shutdown_rx) = oneshot::channel();
    let reporter_task = tokio::spawn(reporter::run_reporter(
        run_id.clone(),
        state.clone(),
        progress_tx.clone(),
        interval,
        reporter_shutdown_rx,
    ));

    let mut workers = Vec::with_capacity(config.width as usize);
    for id in 0..config.width {
        workers.push(tokio::spawn(worker::run_worker(id, ctx.clone())));
    }

    // Workers end themselves on stop, deadline, or the attempts cap.
    for w in workers {
        let _ = w.await;
    }

    let elapsed = state.elapsed();
    // A stop flag raised before the deadline means the run was stopped; a
    // flag raised in the same instant the deadline fired loses the race.
    let end_state = if state.is_stopped() && elapsed < config.duration {
        EndState::Stopped
    } else {
        EndState::Completed
    };

    // Wind down the reporter before the terminal snapshot so the final
    // value is published exactly once, after every worker has been joined.
    state.request_stop();
    let _ = reporter_shutdown_tx.send(());
    let _ = reporter_task.await;

    let snap = state.snapshot();
    let _ = progress_tx.send(snap.clone());

    info!(
        run_id = run_id.as_str(),
        attempts = snap.attempts,
        successes = snap.successes,
        failures = snap.failures,
        elapsed_sec = snap.elapsed_sec,
        end_state = %end_state,
        "probe run finished"
    );

    FinalReport {
        run_id,
        target,
        method: config.method,
        attempts: snap.attempts,
        successes: snap.successes,
        failures: snap.failures,
        bytes_sent: snap.bytes_sent,
        elapsed_sec: snap.elapsed_sec,
        rate: snap.rate,
        end_state,
        finished_at: chrono::Utc::now(),
        error: None,
    }
}
