//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "tests"
//! ems_type: "test"
//! ems_scope: "code"
//! ems_description: "WebSocket transport against a local feed server."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use chrono::{TimeZone, Utc};
use enerpulse_sim::{TelemetryMetrics, TelemetrySample, TelemetryStatus};
use enerpulse_stream::{
    ConnectionState, ReconnectPolicy, StreamError, TelemetrySource, TelemetryStream,
    WebSocketSource,
};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

fn sample(second: u32, usage: f64) -> TelemetrySample {
    TelemetrySample {
        timestamp: Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, second).unwrap(),
        metrics: TelemetryMetrics {
            current_usage: usage,
            solar_output: 20.0,
            grid_dependency: usage - 20.0,
        },
        status: TelemetryStatus {
            anomaly_detected: false,
        },
    }
}

/// Accept one client, send `frames`, then close.
async fn serve_once(frames: Vec<Message>) -> Result<(SocketAddr, JoinHandle<Result<()>>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let task = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await?;
        let mut socket = accept_async(tcp).await?;
        for frame in frames {
            socket.send(frame).await?;
        }
        socket.close(None).await?;
        while let Some(Ok(_)) = socket.next().await {}
        Ok(())
    });
    Ok((addr, task))
}

fn text(sample: &TelemetrySample) -> Result<Message> {
    Ok(Message::Text(serde_json::to_string(sample)?))
}

#[tokio::test]
async fn decodes_text_and_binary_frames_and_skips_garbage() -> Result<()> {
    let first = sample(1, 120.0);
    let second = sample(2, 135.5);
    let frames = vec![
        Message::Text("not telemetry".into()),
        text(&first)?,
        Message::Binary(serde_json::to_vec(&second)?),
    ];
    let (addr, server) = serve_once(frames).await?;

    let mut source = WebSocketSource::new(&format!("ws://{}/feed", addr))?;
    source.open().await?;
    assert_eq!(source.next_sample().await?, first);
    assert_eq!(source.next_sample().await?, second);
    assert!(matches!(
        source.next_sample().await,
        Err(StreamError::ConnectionLost(_))
    ));
    assert_eq!(source.skipped_frames(), 1);
    source.close().await;

    timeout(Duration::from_secs(5), server).await???;
    Ok(())
}

#[tokio::test]
async fn unreachable_endpoint_fails_to_open() -> Result<()> {
    // Bind then drop to obtain a port nobody listens on.
    let addr = TcpListener::bind("127.0.0.1:0").await?.local_addr()?;
    let mut source = WebSocketSource::new(&format!("ws://{}", addr))?;
    assert!(matches!(
        source.open().await,
        Err(StreamError::Connect(_))
    ));
    Ok(())
}

#[tokio::test]
async fn stream_records_feed_then_reconnects_when_server_leaves() -> Result<()> {
    let frames = vec![text(&sample(1, 100.0))?, text(&sample(2, 110.0))?];
    let (addr, server) = serve_once(frames).await?;

    let source = WebSocketSource::new(&format!("ws://{}", addr))?;
    let stream = TelemetryStream::builder(Box::new(source))
        .reconnect_policy(ReconnectPolicy::new(5, Duration::from_secs(60)))
        .spawn();
    stream.connect()?;

    let snapshot = timeout(
        Duration::from_secs(5),
        stream.wait_for(|s| s.state() == ConnectionState::Reconnecting),
    )
    .await??;
    assert_eq!(snapshot.history_len(), 2);
    assert_eq!(
        snapshot.current_sample().map(|s| s.metrics.current_usage),
        Some(110.0)
    );
    assert!(snapshot.last_error().is_some());

    stream.shutdown().await?;
    timeout(Duration::from_secs(5), server).await???;
    Ok(())
}
