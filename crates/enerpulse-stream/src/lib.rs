//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "01-bootstrap"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Live telemetry stream exports."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Push-based telemetry feed for the live dashboard: a rolling sample history,
//! an observable connection state and bounded automatic reconnection over a
//! simulated or WebSocket source.

pub mod error;
pub mod history;
pub mod metrics;
pub mod reconnect;
pub mod simulated;
pub mod snapshot;
pub mod source;
pub mod state;
pub mod stream;
pub mod websocket;

pub use error::{Result, StreamError};
pub use history::{HistoryBuffer, HistoryOrder};
pub use metrics::StreamMetrics;
pub use reconnect::ReconnectPolicy;
pub use simulated::SimulatedSource;
pub use snapshot::{ChartPoint, StreamSnapshot};
pub use source::{source_from_config, TelemetrySource};
pub use state::{ConnectionState, CoreAction, StreamCore};
pub use stream::{TelemetryStream, TelemetryStreamBuilder, DEFAULT_HISTORY_CAPACITY};
pub use websocket::WebSocketSource;
