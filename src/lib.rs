//! PacketPulse -- self-bounded network probe loops for private and lab targets.
//!
//! This crate provides the core library for running bounded concurrent probe
//! runs: N workers send UDP datagrams or open TCP connections against a
//! permitted-range target until a deadline, an attempts cap, or a stop signal
//! ends the run, while a reporter publishes live progress snapshots.

pub mod config;
pub mod engine;
pub mod policy;
pub mod report;

pub use engine::controller::start;
pub use engine::{EndState, FinalReport, RunConfig, RunHandle, ValidationError};
