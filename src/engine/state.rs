//! Shared run state: monotonic counters plus the stop flag.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

// ---------------------------------------------------------------------------
// RunState
// ---------------------------------------------------------------------------

/// Mutable state of one run, shared by `Arc` across workers and the
/// reporter.
///
/// Counters are monotonically increasing and mutated only via atomic
/// increments; the stop flag transitions false→true exactly once.
#[derive(Debug)]
pub struct RunState {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    bytes_sent: AtomicU64,
    stop: AtomicBool,
    started: Instant,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            attempts: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            stop: AtomicBool::new(false),
            started: Instant::now(),
        }
    }

    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, bytes: u64) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        if bytes > 0 {
            self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
        }
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Set the stop flag. Returns `true` only for the call that performed
    /// the false→true transition.
    pub fn request_stop(&self) -> bool {
        !self.stop.swap(true, Ordering::Relaxed)
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let elapsed = self.elapsed().as_secs_f64().max(0.001);
        let attempts = self.attempts.load(Ordering::Relaxed);
        ProgressSnapshot {
            attempts,
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            elapsed_sec: elapsed,
            rate: attempts as f64 / elapsed,
        }
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// ProgressSnapshot
// ---------------------------------------------------------------------------

/// Point-in-time view of a run's counters. Value type; never mutated after
/// creation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProgressSnapshot {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub bytes_sent: u64,
    pub elapsed_sec: f64,
    /// Attempts per second since the run started.
    pub rate: f64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let state = RunState::new();

        state.record_attempt();
        state.record_attempt();
        state.record_success(100);
        state.record_failure();

        let snap = state.snapshot();
        assert_eq!(snap.attempts, 2);
        assert_eq!(snap.successes, 1);
        assert_eq!(snap.failures, 1);
        assert_eq!(snap.bytes_sent, 100);
        assert!(snap.rate > 0.0);
        assert!(snap.attempts >= snap.successes);
    }

    #[test]
    fn test_stop_transitions_once() {
        let state = RunState::new();

        assert!(!state.is_stopped());
        assert!(state.request_stop());
        assert!(state.is_stopped());

        // Second request is a no-op.
        assert!(!state.request_stop());
        assert!(state.is_stopped());
    }
}
