//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Telemetry stream handle and its driver task."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use enerpulse_common::{SharedClock, SimulatorConfig, StreamConfig};
use enerpulse_sim::TelemetrySample;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use crate::error::{Result, StreamError};
use crate::metrics::StreamMetrics;
use crate::reconnect::ReconnectPolicy;
use crate::snapshot::StreamSnapshot;
use crate::source::{source_from_config, TelemetrySource};
use crate::state::{ConnectionState, CoreAction, StreamCore};

pub const DEFAULT_HISTORY_CAPACITY: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Connect,
    Disconnect,
    Shutdown,
}

/// What the driver is currently waiting on.
#[derive(Debug, Clone, Copy)]
enum Phase {
    Idle,
    Opening,
    Streaming,
    Waiting(Instant),
}

enum Event {
    Command(Command),
    Opened,
    Sample(TelemetrySample),
    Failed(StreamError),
    RetryDue,
}

/// Builder for a [`TelemetryStream`].
pub struct TelemetryStreamBuilder {
    source: Box<dyn TelemetrySource>,
    history_capacity: usize,
    policy: ReconnectPolicy,
    metrics: Option<StreamMetrics>,
}

impl TelemetryStreamBuilder {
    pub fn new(source: Box<dyn TelemetrySource>) -> Self {
        Self {
            source,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            policy: ReconnectPolicy::default(),
            metrics: None,
        }
    }

    /// Builder with the source, capacity and reconnect policy taken from
    /// configuration.
    pub fn from_config(
        config: &StreamConfig,
        simulator: &SimulatorConfig,
        clock: SharedClock,
    ) -> Result<Self> {
        let source = source_from_config(config, simulator, clock)?;
        Ok(Self::new(source)
            .history_capacity(config.history_capacity)
            .reconnect_policy(ReconnectPolicy::from(&config.reconnect)))
    }

    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn metrics(mut self, metrics: StreamMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Spawn the driver task on the current tokio runtime. The stream starts
    /// disconnected.
    pub fn spawn(self) -> TelemetryStream {
        let core = StreamCore::new(self.history_capacity, self.policy);
        let (snapshot_tx, snapshot_rx) = watch::channel(core.snapshot());
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let driver = Driver {
            core,
            source_name: self.source.name(),
            source: Arc::new(Mutex::new(self.source)),
            metrics: self.metrics,
            snapshots: snapshot_tx,
        };
        let task = tokio::spawn(driver.run(command_rx));
        TelemetryStream {
            commands: command_tx,
            snapshots: snapshot_rx,
            task: Some(task),
        }
    }
}

/// Handle to a live telemetry feed.
///
/// `connect` and `disconnect` return immediately; their effects show up in
/// later snapshots. Dropping the handle aborts the driver task.
pub struct TelemetryStream {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<StreamSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl TelemetryStream {
    pub fn builder(source: Box<dyn TelemetrySource>) -> TelemetryStreamBuilder {
        TelemetryStreamBuilder::new(source)
    }

    pub fn connect(&self) -> Result<()> {
        self.send(Command::Connect)
    }

    pub fn disconnect(&self) -> Result<()> {
        self.send(Command::Disconnect)
    }

    /// Latest published state.
    pub fn snapshot(&self) -> StreamSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.snapshots.borrow().state()
    }

    pub fn is_connected(&self) -> bool {
        self.snapshots.borrow().is_connected()
    }

    /// Receiver notified on every state change, for reactive consumers.
    pub fn subscribe(&self) -> watch::Receiver<StreamSnapshot> {
        self.snapshots.clone()
    }

    /// Wait until a published snapshot satisfies `predicate` and return it.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<StreamSnapshot>
    where
        F: FnMut(&StreamSnapshot) -> bool,
    {
        let mut receiver = self.snapshots.clone();
        let snapshot = receiver
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .map_err(|_| StreamError::Closed)?;
        Ok(snapshot.clone())
    }

    /// Disconnect, stop the driver and wait for it to finish.
    pub async fn shutdown(mut self) -> Result<()> {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            task.await?;
        }
        Ok(())
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| StreamError::Closed)
    }
}

impl Drop for TelemetryStream {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Future for whatever the driver is waiting on. It holds the source lock
/// until it completes or is dropped.
type InFlight = Pin<Box<dyn Future<Output = Event> + Send>>;

struct Driver {
    core: StreamCore,
    source: Arc<Mutex<Box<dyn TelemetrySource>>>,
    source_name: &'static str,
    metrics: Option<StreamMetrics>,
    snapshots: watch::Sender<StreamSnapshot>,
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let source_name = self.source_name;
        let mut phase = Phase::Idle;
        // Session the in-flight phase belongs to.
        let mut epoch = self.core.epoch();
        let mut in_flight = self.start(phase);
        info!(source = source_name, "telemetry stream driver started");

        loop {
            let (event, finished) = tokio::select! {
                command = commands.recv() => {
                    (Event::Command(command.unwrap_or(Command::Shutdown)), false)
                }
                event = &mut in_flight => (event, true),
            };

            let action = match event {
                Event::Command(Command::Connect) => self.core.connect(),
                Event::Command(Command::Disconnect) => self.core.disconnect(),
                Event::Command(Command::Shutdown) => {
                    drop(in_flight);
                    self.core.disconnect();
                    close_source(&self.source).await;
                    self.publish();
                    break;
                }
                Event::Opened => self.core.on_opened(epoch),
                Event::Sample(sample) => {
                    let anomalous = sample.is_anomalous();
                    match (self.core.on_sample(epoch, sample), &self.metrics) {
                        (true, Some(metrics)) => metrics.record_sample(source_name, anomalous),
                        (false, Some(metrics)) => metrics.record_rejected(source_name),
                        _ => {}
                    }
                    CoreAction::None
                }
                Event::Failed(err) => {
                    debug!(source = source_name, error = %err, "telemetry source failed");
                    self.core.on_failure(epoch, err.to_string())
                }
                Event::RetryDue => self.core.on_retry_due(epoch),
            };

            // A command the core ignores leaves the pending open or read untouched.
            if matches!(action, CoreAction::None) {
                if finished {
                    in_flight = self.start(phase);
                }
                self.publish();
                continue;
            }

            // Release the source before closing it or starting the next phase.
            drop(in_flight);
            match action {
                CoreAction::None => {}
                CoreAction::Open { epoch: next } => {
                    epoch = next;
                    phase = Phase::Opening;
                }
                CoreAction::Stream { .. } => phase = Phase::Streaming,
                CoreAction::ScheduleRetry { delay, .. } => {
                    close_source(&self.source).await;
                    if let Some(metrics) = &self.metrics {
                        metrics.record_reconnect_attempt(source_name);
                    }
                    phase = Phase::Waiting(Instant::now() + delay);
                }
                CoreAction::Exhausted { .. } => {
                    close_source(&self.source).await;
                    if let Some(metrics) = &self.metrics {
                        metrics.record_exhausted(source_name);
                    }
                    phase = Phase::Idle;
                }
                CoreAction::Close => {
                    close_source(&self.source).await;
                    phase = Phase::Idle;
                }
            }
            in_flight = self.start(phase);

            self.publish();
        }

        info!(source = source_name, "telemetry stream driver stopped");
    }

    fn start(&self, phase: Phase) -> InFlight {
        let source = Arc::clone(&self.source);
        Box::pin(async move {
            let mut source = source.lock_owned().await;
            advance(&mut **source, phase).await
        })
    }

    fn publish(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.observe(self.source_name, self.core.state(), self.core.history_len());
        }
        self.snapshots.send_replace(self.core.snapshot());
    }
}

async fn close_source(source: &Mutex<Box<dyn TelemetrySource>>) {
    source.lock().await.close().await;
}

async fn advance(source: &mut dyn TelemetrySource, phase: Phase) -> Event {
    match phase {
        Phase::Idle => std::future::pending().await,
        Phase::Opening => match source.open().await {
            Ok(()) => Event::Opened,
            Err(err) => Event::Failed(err),
        },
        Phase::Streaming => match source.next_sample().await {
            Ok(sample) => Event::Sample(sample),
            Err(err) => Event::Failed(err),
        },
        Phase::Waiting(deadline) => {
            sleep_until(deadline).await;
            Event::RetryDue
        }
    }
}

impl std::fmt::Debug for TelemetryStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryStream")
            .field("state", &self.state())
            .field("running", &self.task.as_ref().map(|t| !t.is_finished()))
            .finish()
    }
}
