//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Live feed watch subcommand."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::future::Future;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use enerpulse_common::{AppConfig, SimulatorConfig, StreamConfig, SystemClock, TransportConfig};
use enerpulse_metrics::{new_registry, spawn_http_server};
use enerpulse_sim::{forecast_load, ForecastError, TelemetrySample};
use enerpulse_stream::{
    ConnectionState, HistoryOrder, StreamMetrics, StreamSnapshot, TelemetryStream,
    TelemetryStreamBuilder,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use tracing::{info, warn};

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Stop after this many samples. Runs until Ctrl-C when omitted
    #[arg(long)]
    samples: Option<usize>,

    /// Consume a ws:// or wss:// feed instead of the local simulator
    #[arg(long)]
    url: Option<String>,

    /// Simulator tick interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Simulator random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Serve Prometheus metrics on this address while watching
    #[arg(long)]
    metrics_listen: Option<SocketAddr>,

    /// Skip the closing load forecast
    #[arg(long)]
    no_forecast: bool,
}

pub async fn run(config: &AppConfig, args: WatchArgs) -> Result<()> {
    let (stream_config, simulator) = resolve_config(config, &args)?;

    let registry = new_registry();
    let metrics_listen = args
        .metrics_listen
        .or(config.metrics.enabled.then_some(config.metrics.listen));
    let server = match metrics_listen {
        Some(addr) => Some(spawn_http_server(registry.clone(), addr)?),
        None => None,
    };

    let stream =
        TelemetryStreamBuilder::from_config(&stream_config, &simulator, SystemClock::shared())?
            .metrics(StreamMetrics::new(registry)?)
            .spawn();
    stream.connect()?;
    info!(transport = ?stream_config.transport, "watching telemetry feed");

    let mut stdout = io::stdout();
    let outcome =
        watch_stream(&stream, args.samples, tokio::signal::ctrl_c(), &mut stdout).await;

    if let Ok(snapshot) = &outcome {
        if !args.no_forecast {
            print_forecast(snapshot, simulator.seed, &mut stdout)?;
        }
    }

    stream.shutdown().await?;
    if let Some(server) = server {
        server.shutdown().await?;
    }
    outcome.map(|_| ())
}

fn resolve_config(
    config: &AppConfig,
    args: &WatchArgs,
) -> Result<(StreamConfig, SimulatorConfig)> {
    let mut stream = config.stream.clone();
    let mut simulator = config.simulator.clone();
    if let Some(url) = &args.url {
        stream.transport = TransportConfig::WebSocket { url: url.clone() };
    }
    if let Some(interval_ms) = args.interval_ms {
        stream.tick_interval = Duration::from_millis(interval_ms);
    }
    if args.seed.is_some() {
        simulator.seed = args.seed;
    }
    stream.validate()?;
    simulator.validate()?;
    Ok((stream, simulator))
}

/// Print every new sample as a JSON line until `limit` samples were printed,
/// `interrupt` resolves or the stream gives up. Returns the final snapshot.
async fn watch_stream<W, F>(
    stream: &TelemetryStream,
    limit: Option<usize>,
    interrupt: F,
    out: &mut W,
) -> Result<StreamSnapshot>
where
    W: Write,
    F: Future,
{
    let mut updates = stream.subscribe();
    let mut last_printed: Option<DateTime<Utc>> = None;
    let mut printed = 0usize;
    tokio::pin!(interrupt);

    loop {
        let snapshot = updates.borrow_and_update().clone();
        for sample in unseen_samples(&snapshot, last_printed) {
            serde_json::to_writer(&mut *out, sample)?;
            out.write_all(b"\n")?;
            last_printed = Some(sample.timestamp);
            printed += 1;
            if limit.is_some_and(|limit| printed >= limit) {
                out.flush()?;
                return Ok(snapshot.clone());
            }
        }
        out.flush()?;

        if snapshot.state() == ConnectionState::Disconnected {
            if let Some(error) = snapshot.last_error() {
                return Err(anyhow!("telemetry feed unavailable: {}", error));
            }
        }

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    return Ok(snapshot);
                }
            }
            _ = &mut interrupt => {
                info!(printed, "interrupted");
                return Ok(snapshot);
            }
        }
    }
}

/// History entries newer than `after`, oldest first.
fn unseen_samples(
    snapshot: &StreamSnapshot,
    after: Option<DateTime<Utc>>,
) -> Vec<&TelemetrySample> {
    snapshot
        .history(HistoryOrder::OldestFirst)
        .into_iter()
        .filter(|sample| after.map_or(true, |after| sample.timestamp > after))
        .collect()
}

fn print_forecast<W: Write>(
    snapshot: &StreamSnapshot,
    seed: Option<u64>,
    out: &mut W,
) -> Result<()> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    match forecast_load(&snapshot.usage_series(), &mut rng) {
        Ok(forecast) => {
            serde_json::to_writer(&mut *out, &json!({ "forecast": forecast }))?;
            out.write_all(b"\n")?;
            out.flush()?;
        }
        Err(err @ ForecastError::InsufficientData { .. }) => {
            warn!(error = %err, "not enough samples for a forecast");
        }
        Err(err) => return Err(err.into()),
    }
    Ok(())
}
