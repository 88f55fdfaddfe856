//! TOML configuration for the PacketPulse engine.
//!
//! Layered configuration model with compiled-in defaults, environment
//! variable override for the config file path, and a standard filesystem
//! location. The config carries operator policy: hard caps on what a single
//! run may request, probe payload shape, and reporting cadence.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::engine::ValidationError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for the probe engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub limits: LimitsConfig,
    pub probe: ProbeConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded engine configuration");
        Ok(config)
    }

    /// Try to load configuration from, in order:
    /// 1. The path specified by the `PACKETPULSE_CONFIG` environment variable.
    /// 2. `/etc/packetpulse/packetpulse.toml`.
    /// 3. Fall back to compiled-in defaults.
    pub fn load_or_default() -> Self {
        // 1. Environment variable override.
        if let Ok(env_path) = std::env::var("PACKETPULSE_CONFIG") {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "PACKETPULSE_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        // 2. Standard system location.
        let system_path = Path::new("/etc/packetpulse/packetpulse.toml");
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        // 3. Defaults.
        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Hard caps on what a single run may request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum duration for a single run (seconds).
    pub max_duration_sec: u64,
    /// Maximum number of concurrent workers a run may request.
    pub max_width: u32,
    /// Per-worker packet rate cap (packets per second). `0` means unlimited.
    pub max_packet_rate: u32,
    /// Hard cap on total attempts per run. `0` means unlimited.
    pub max_attempts: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_duration_sec: 300,
            max_width: 64,
            max_packet_rate: 0,
            max_attempts: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Probe
// ---------------------------------------------------------------------------

/// Probe payload shape and loop timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// UDP payload size in bytes.
    pub payload_size: usize,
    /// Number of pre-generated payload buffers in the ring.
    pub payload_pool: usize,
    /// Per-iteration I/O timeout (milliseconds). Bounds how long a worker
    /// can go without re-checking the stop flag.
    pub iter_timeout_ms: u64,
    /// Default reporting interval (seconds) when a run does not specify one.
    pub report_interval_sec: u64,
}

impl ProbeConfig {
    pub fn iter_timeout(&self) -> Duration {
        Duration::from_millis(self.iter_timeout_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_sec)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            payload_size: 1200,
            payload_pool: 64,
            iter_timeout_ms: 1000,
            report_interval_sec: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Duration parsing
// ---------------------------------------------------------------------------

/// Parse a human duration like `"10s"`, `"500ms"`, `"2m"`, or a bare number
/// of seconds.
pub fn parse_duration(input: &str) -> Result<Duration, ValidationError> {
    let s = input.trim();
    let invalid = || ValidationError::InvalidDuration {
        input: input.to_string(),
    };

    let (digits, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => s.split_at(idx),
        None => (s, "s"),
    };

    let value: u64 = digits.parse().map_err(|_| invalid())?;

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" | "sec" | "" => Ok(Duration::from_secs(value)),
        "m" | "min" => Ok(Duration::from_secs(value * 60)),
        _ => Err(invalid()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
