//! Bounded probe loop engine.
//!
//! Each run is started by the [`controller`] and owns N workers plus one
//! reporter, all joined before the final report is produced. The
//! [`RunHandle`] is the caller's view of a running probe: it can stop the
//! run, subscribe to progress snapshots, and await the single final report.

pub mod controller;
pub mod payload;
pub mod reporter;
pub mod state;
pub mod transport;
pub mod worker;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::policy::IpClass;

pub use state::{ProgressSnapshot, RunState};
pub use transport::ProbeMethod;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Rejection of a run before any resources are created.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("target is empty")]
    EmptyTarget,

    #[error("target {target} could not be resolved: {reason}")]
    UnresolvableTarget { target: String, reason: String },

    #[error("target {target} is in {class} address space; only private/loopback/reserved targets are permitted")]
    DisallowedTarget { target: String, class: IpClass },

    #[error("target port must be non-zero")]
    ZeroPort,

    #[error("duration must be greater than zero")]
    ZeroDuration,

    #[error("duration {requested_sec}s exceeds the configured maximum of {max_sec}s")]
    DurationTooLong { requested_sec: u64, max_sec: u64 },

    #[error("width must be greater than zero")]
    ZeroWidth,

    #[error("width {requested} exceeds the configured maximum of {max}")]
    WidthTooLarge { requested: u32, max: u32 },

    #[error("unknown probe method {input:?} (expected \"udp\" or \"tcp\")")]
    UnknownMethod { input: String },

    #[error("invalid duration {input:?}")]
    InvalidDuration { input: String },
}

// ---------------------------------------------------------------------------
// RunConfig
// ---------------------------------------------------------------------------

/// Immutable parameters of one probe run.
///
/// Validated by [`controller::start`] against the operator's
/// [`EngineConfig`](crate::config::EngineConfig) before anything is spawned.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Target as `host:port`; must resolve into permitted address space.
    pub target: String,
    /// Probe transport.
    pub method: ProbeMethod,
    /// Wall-clock bound on the run.
    pub duration: Duration,
    /// Number of concurrent workers.
    pub width: u32,
    /// Optional total attempts cap. `0` means unlimited.
    pub max_attempts: u64,
    /// Reporting cadence override. `None` uses the configured default.
    pub report_interval: Option<Duration>,
}

impl RunConfig {
    pub fn new(target: impl Into<String>, method: ProbeMethod, duration: Duration, width: u32) -> Self {
        Self {
            target: target.into(),
            method,
            duration,
            width,
            max_attempts: 0,
            report_interval: None,
        }
    }
}

// ---------------------------------------------------------------------------
// EndState
// ---------------------------------------------------------------------------

/// Terminal state of a run.
///
/// A run moves `Idle → Running` when [`controller::start`] succeeds, then to
/// exactly one of these. Terminal states are final; re-running requires a
/// new [`RunConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndState {
    /// The run reached its deadline or attempts cap.
    Completed,
    /// The stop flag was set externally before the deadline.
    Stopped,
    /// Setup failed before any worker made progress.
    Failed,
}

impl EndState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for EndState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// FinalReport
// ---------------------------------------------------------------------------

/// Outcome of a run. Exactly one is produced per run, after every worker and
/// the reporter have been joined.
#[derive(Debug, Clone, Serialize)]
pub struct FinalReport {
    pub run_id: String,
    pub target: String,
    pub method: ProbeMethod,
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub bytes_sent: u64,
    pub elapsed_sec: f64,
    /// Attempts per second over the whole run.
    pub rate: f64,
    pub end_state: EndState,
    /// When the run reached its terminal state.
    pub finished_at: chrono::DateTime<chrono::Utc>,
    /// Setup error detail when `end_state` is [`EndState::Failed`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// RunHandle
// ---------------------------------------------------------------------------

/// Handle to a running probe.
///
/// Dropping the handle does not stop the run; call [`RunHandle::stop`] for
/// that. [`RunHandle::await_completion`] consumes the handle, so the final
/// report can be obtained exactly once.
#[derive(Debug)]
pub struct RunHandle {
    pub(crate) run_id: String,
    pub(crate) target: String,
    pub(crate) method: ProbeMethod,
    pub(crate) state: Arc<RunState>,
    pub(crate) progress_rx: watch::Receiver<ProgressSnapshot>,
    pub(crate) driver: JoinHandle<FinalReport>,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Request a cooperative stop. Idempotent; returns `true` only for the
    /// call that performed the false→true transition.
    pub fn stop(&self) -> bool {
        self.state.request_stop()
    }

    /// A detached stop trigger for use from signal handlers or other tasks.
    pub fn stopper(&self) -> Stopper {
        Stopper {
            state: self.state.clone(),
        }
    }

    /// Subscribe to progress snapshots. Latest-value semantics: a slow
    /// subscriber only misses intermediate ticks, it never blocks the run.
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.progress_rx.clone()
    }

    /// Wait for the run to reach a terminal state and return its final
    /// report. All workers and the reporter are joined before this returns.
    pub async fn await_completion(self) -> FinalReport {
        match self.driver.await {
            Ok(report) => report,
            Err(e) => FinalReport {
                run_id: self.run_id,
                target: self.target,
                method: self.method,
                attempts: 0,
                successes: 0,
                failures: 0,
                bytes_sent: 0,
                elapsed_sec: self.state.elapsed().as_secs_f64(),
                rate: 0.0,
                end_state: EndState::Failed,
                finished_at: chrono::Utc::now(),
                error: Some(format!("run driver panicked: {e}")),
            },
        }
    }
}

/// Clonable stop trigger detached from the [`RunHandle`] lifetime.
#[derive(Clone)]
pub struct Stopper {
    state: Arc<RunState>,
}

impl Stopper {
    /// See [`RunHandle::stop`].
    pub fn stop(&self) -> bool {
        self.state.request_stop()
    }
}
