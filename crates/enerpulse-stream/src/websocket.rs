//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "WebSocket client transport for remote telemetry feeds."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use async_trait::async_trait;
use enerpulse_sim::TelemetrySample;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Result, StreamError};
use crate::source::TelemetrySource;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Consumes JSON telemetry frames from a `ws://` or `wss://` endpoint.
///
/// Frames that do not decode as a sample are logged and skipped. A close
/// frame or end of stream surfaces as [`StreamError::ConnectionLost`].
pub struct WebSocketSource {
    url: Url,
    socket: Option<Socket>,
    skipped_frames: u64,
}

impl WebSocketSource {
    pub fn new(url: &str) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|err| StreamError::InvalidUrl {
            url: url.to_owned(),
            reason: err.to_string(),
        })?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(StreamError::InvalidUrl {
                url: url.to_owned(),
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }
        Ok(Self {
            url: parsed,
            socket: None,
            skipped_frames: 0,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Frames discarded because they were not valid samples.
    pub fn skipped_frames(&self) -> u64 {
        self.skipped_frames
    }

    fn decode(&mut self, payload: &[u8]) -> Option<TelemetrySample> {
        match serde_json::from_slice::<TelemetrySample>(payload) {
            Ok(sample) => Some(sample),
            Err(err) => {
                self.skipped_frames += 1;
                warn!(url = %self.url, error = %err, "skipping malformed telemetry frame");
                None
            }
        }
    }
}

#[async_trait]
impl TelemetrySource for WebSocketSource {
    fn name(&self) -> &'static str {
        "websocket"
    }

    async fn open(&mut self) -> Result<()> {
        let (socket, response) = connect_async(self.url.as_str())
            .await
            .map_err(|err| StreamError::Connect(err.to_string()))?;
        info!(url = %self.url, status = %response.status(), "websocket feed connected");
        self.socket = Some(socket);
        Ok(())
    }

    async fn next_sample(&mut self) -> Result<TelemetrySample> {
        loop {
            let socket = self.socket.as_mut().ok_or(StreamError::NotOpen)?;
            let message = match socket.next().await {
                Some(Ok(message)) => message,
                Some(Err(err)) => return Err(err.into()),
                None => return Err(StreamError::ConnectionLost("stream ended".into())),
            };
            let decoded = match message {
                Message::Text(text) => self.decode(text.as_bytes()),
                Message::Binary(bytes) => self.decode(&bytes),
                Message::Close(frame) => {
                    let reason = frame
                        .map(|f| f.reason.into_owned())
                        .filter(|reason| !reason.is_empty())
                        .unwrap_or_else(|| "closed by peer".to_owned());
                    return Err(StreamError::ConnectionLost(reason));
                }
                // Pings are answered by the protocol layer.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
            };
            if let Some(sample) = decoded {
                return Ok(sample);
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            if let Err(err) = socket.close(None).await {
                debug!(url = %self.url, error = %err, "websocket close handshake failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ws_and_wss() {
        assert!(WebSocketSource::new("ws://localhost:8080/telemetry").is_ok());
        assert!(WebSocketSource::new("wss://feed.example.com/live").is_ok());
    }

    #[test]
    fn rejects_other_schemes() {
        let err = WebSocketSource::new("https://feed.example.com").err().unwrap();
        assert!(matches!(err, StreamError::InvalidUrl { .. }));
        assert!(WebSocketSource::new("not a url").is_err());
    }

    #[test]
    fn malformed_payloads_are_counted() {
        let mut source = WebSocketSource::new("ws://localhost:1").unwrap();
        assert!(source.decode(b"{\"hello\":1}").is_none());
        let sample = source.decode(
            br#"{"timestamp":"2024-06-03T10:00:00Z","metrics":{"current_usage":1.0,"solar_output":0.5,"grid_dependency":0.5},"status":{"anomaly_detected":false}}"#,
        );
        assert!(sample.is_some());
        assert_eq!(source.skipped_frames(), 1);
    }
}
