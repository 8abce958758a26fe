//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Observable stream state and live chart mapping."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use enerpulse_sim::TelemetrySample;
use serde::Serialize;

use crate::history::HistoryOrder;
use crate::state::ConnectionState;

/// Point-in-time view of a stream, published after every event the driver
/// handles.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamSnapshot {
    state: ConnectionState,
    current_sample: Option<TelemetrySample>,
    history: Vec<TelemetrySample>,
    last_error: Option<String>,
    retry_attempt: u32,
}

/// One record of the live usage chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    /// `HH:MM:SS` in UTC.
    pub time: String,
    pub usage: f64,
    pub solar: f64,
    pub grid: f64,
    pub anomaly: bool,
}

impl From<&TelemetrySample> for ChartPoint {
    fn from(sample: &TelemetrySample) -> Self {
        Self {
            time: sample.timestamp.format("%H:%M:%S").to_string(),
            usage: sample.metrics.current_usage,
            solar: sample.metrics.solar_output,
            grid: sample.metrics.grid_dependency,
            anomaly: sample.status.anomaly_detected,
        }
    }
}

impl StreamSnapshot {
    pub(crate) fn new(
        state: ConnectionState,
        current_sample: Option<TelemetrySample>,
        history: Vec<TelemetrySample>,
        last_error: Option<String>,
        retry_attempt: u32,
    ) -> Self {
        Self {
            state,
            current_sample,
            history,
            last_error,
            retry_attempt,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn current_sample(&self) -> Option<&TelemetrySample> {
        self.current_sample.as_ref()
    }

    pub fn history(&self, order: HistoryOrder) -> Vec<&TelemetrySample> {
        match order {
            HistoryOrder::OldestFirst => self.history.iter().collect(),
            HistoryOrder::NewestFirst => self.history.iter().rev().collect(),
        }
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Retries consumed by the current failure streak, zero when healthy.
    pub fn retry_attempt(&self) -> u32 {
        self.retry_attempt
    }

    /// Usage values oldest first, the input expected by
    /// [`enerpulse_sim::forecast_load`].
    pub fn usage_series(&self) -> Vec<f64> {
        self.history
            .iter()
            .map(|sample| sample.metrics.current_usage)
            .collect()
    }

    /// History mapped to chart records, oldest first.
    pub fn chart_points(&self) -> Vec<ChartPoint> {
        self.history.iter().map(ChartPoint::from).collect()
    }
}
