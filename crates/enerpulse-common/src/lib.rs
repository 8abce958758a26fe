//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the telemetry core."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Core shared primitives for the EnerPulse workspace.
//! This crate exposes configuration loading, logging initialisation and the
//! injectable wall clock consumed by the series synthesizer and the stream.

pub mod clock;
pub mod config;
pub mod logging;

pub use clock::{Clock, FixedClock, SharedClock, SystemClock};
pub use config::{
    AppConfig, ConsoleTarget, LoggingConfig, MetricsConfig, PollutionMetric, ReconnectConfig,
    SeriesConfig, SimulatorConfig, StreamConfig, TransportConfig,
};
pub use logging::{init_tracing, LogFormat};
