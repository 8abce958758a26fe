//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "01-bootstrap"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Simulation module exports and shared types."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Synthetic data for the EnerPulse dashboard: the correlated solar versus
//! carbon-intensity daily series, the load profile behind live telemetry,
//! the telemetry sample generator and a lightweight load forecast heuristic.

pub mod forecast;
pub mod profile;
pub mod series;
pub mod telemetry;

pub use enerpulse_common::PollutionMetric;
pub use forecast::{forecast_load, AnomalySeverity, ForecastError, LoadForecast};
pub use profile::LoadProfile;
pub use series::{
    Band, Baseline, DashboardDataPoint, SeriesError, SeriesSynthesizer, SeriesWindow,
};
pub use telemetry::{SampleSynthesizer, TelemetryMetrics, TelemetrySample, TelemetryStatus};
