//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Prometheus instrumentation for telemetry streams."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use enerpulse_metrics::SharedRegistry;
use prometheus::{IntCounterVec, IntGaugeVec, Opts};

use crate::error::Result;
use crate::state::ConnectionState;

/// Metrics published by telemetry streams, labelled by source name.
#[derive(Clone)]
pub struct StreamMetrics {
    registry: SharedRegistry,
    samples_total: IntCounterVec,
    anomalies_total: IntCounterVec,
    rejected_samples_total: IntCounterVec,
    reconnect_attempts_total: IntCounterVec,
    exhausted_total: IntCounterVec,
    connection_state: IntGaugeVec,
    history_length: IntGaugeVec,
}

impl StreamMetrics {
    /// Register the stream metric family against the provided registry.
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let samples_total = IntCounterVec::new(
            Opts::new(
                "enerpulse_stream_samples_total",
                "Telemetry samples accepted into the rolling history",
            ),
            &["source"],
        )?;
        registry.register(Box::new(samples_total.clone()))?;

        let anomalies_total = IntCounterVec::new(
            Opts::new(
                "enerpulse_stream_anomalies_total",
                "Accepted samples flagged as anomalous",
            ),
            &["source"],
        )?;
        registry.register(Box::new(anomalies_total.clone()))?;

        let rejected_samples_total = IntCounterVec::new(
            Opts::new(
                "enerpulse_stream_rejected_samples_total",
                "Samples discarded as stale or out of order",
            ),
            &["source"],
        )?;
        registry.register(Box::new(rejected_samples_total.clone()))?;

        let reconnect_attempts_total = IntCounterVec::new(
            Opts::new(
                "enerpulse_stream_reconnect_attempts_total",
                "Reconnect attempts scheduled after a feed failure",
            ),
            &["source"],
        )?;
        registry.register(Box::new(reconnect_attempts_total.clone()))?;

        let exhausted_total = IntCounterVec::new(
            Opts::new(
                "enerpulse_stream_reconnect_exhausted_total",
                "Sessions abandoned after the reconnect budget ran out",
            ),
            &["source"],
        )?;
        registry.register(Box::new(exhausted_total.clone()))?;

        let connection_state = IntGaugeVec::new(
            Opts::new(
                "enerpulse_stream_connection_state",
                "0 disconnected, 1 connecting, 2 connected, 3 reconnecting",
            ),
            &["source"],
        )?;
        registry.register(Box::new(connection_state.clone()))?;

        let history_length = IntGaugeVec::new(
            Opts::new(
                "enerpulse_stream_history_length",
                "Samples currently held in the rolling history",
            ),
            &["source"],
        )?;
        registry.register(Box::new(history_length.clone()))?;

        Ok(Self {
            registry,
            samples_total,
            anomalies_total,
            rejected_samples_total,
            reconnect_attempts_total,
            exhausted_total,
            connection_state,
            history_length,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn record_sample(&self, source: &str, anomalous: bool) {
        self.samples_total.with_label_values(&[source]).inc();
        if anomalous {
            self.anomalies_total.with_label_values(&[source]).inc();
        }
    }

    pub fn record_rejected(&self, source: &str) {
        self.rejected_samples_total.with_label_values(&[source]).inc();
    }

    pub fn record_reconnect_attempt(&self, source: &str) {
        self.reconnect_attempts_total
            .with_label_values(&[source])
            .inc();
    }

    pub fn record_exhausted(&self, source: &str) {
        self.exhausted_total.with_label_values(&[source]).inc();
    }

    pub fn observe(&self, source: &str, state: ConnectionState, history_len: usize) {
        self.connection_state
            .with_label_values(&[source])
            .set(state.as_gauge());
        self.history_length
            .with_label_values(&[source])
            .set(history_len as i64);
    }
}
