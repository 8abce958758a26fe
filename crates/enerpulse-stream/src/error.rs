//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Error taxonomy for telemetry sources and the stream driver."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use tokio_tungstenite::tungstenite;

/// Shared result type for stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The feed could not be reached.
    #[error("connection failed: {0}")]
    Connect(String),
    /// An established feed went away.
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    /// The simulator injected a drop.
    #[error("simulated connection drop")]
    SimulatedDrop,
    #[error("source is not open")]
    NotOpen,
    #[error("invalid websocket url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("websocket error: {0}")]
    WebSocket(#[source] Box<tungstenite::Error>),
    /// The driver task has stopped and no longer accepts commands.
    #[error("telemetry stream is no longer running")]
    Closed,
    #[error("stream task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl From<tungstenite::Error> for StreamError {
    fn from(err: tungstenite::Error) -> Self {
        StreamError::WebSocket(Box::new(err))
    }
}
