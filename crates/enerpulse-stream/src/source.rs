//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Telemetry source abstraction and construction from config."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use async_trait::async_trait;
use enerpulse_common::{SharedClock, SimulatorConfig, StreamConfig, TransportConfig};
use enerpulse_sim::TelemetrySample;

use crate::error::Result;
use crate::simulated::SimulatedSource;
use crate::websocket::WebSocketSource;

/// A push-based feed of telemetry samples.
///
/// The driver calls `open`, then `next_sample` repeatedly until it errors, and
/// `close` before any reopen. `open` and `next_sample` may be cancelled at an
/// await point and must leave the source ready for `close`.
#[async_trait]
pub trait TelemetrySource: Send {
    /// Human-readable source name for logging/metrics.
    fn name(&self) -> &'static str;

    async fn open(&mut self) -> Result<()>;

    /// Wait for the next sample. An error ends the current connection.
    async fn next_sample(&mut self) -> Result<TelemetrySample>;

    async fn close(&mut self);
}

/// Build the source selected by `config.transport`.
pub fn source_from_config(
    config: &StreamConfig,
    simulator: &SimulatorConfig,
    clock: SharedClock,
) -> Result<Box<dyn TelemetrySource>> {
    match &config.transport {
        TransportConfig::Simulated => Ok(Box::new(SimulatedSource::new(
            simulator,
            config.tick_interval,
            clock,
        ))),
        TransportConfig::WebSocket { url } => Ok(Box::new(WebSocketSource::new(url)?)),
    }
}
