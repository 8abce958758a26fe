//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Connection state machine with epoch-guarded session handling."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! The state machine is synchronous. It decides what the driver should do
//! next; the driver performs the I/O and reports back, tagging every report
//! with the epoch it was started under so that late events from a cancelled
//! session are ignored.

use std::fmt;
use std::time::Duration;

use enerpulse_sim::TelemetrySample;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::history::{HistoryBuffer, HistoryOrder};
use crate::reconnect::ReconnectPolicy;
use crate::snapshot::StreamSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        }
    }

    /// Numeric encoding exported on the state gauge.
    pub fn as_gauge(&self) -> i64 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Reconnecting => 3,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Work requested from the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreAction {
    None,
    /// Open the source for session `epoch`.
    Open { epoch: u64 },
    /// The source is open; start pulling samples.
    Stream { epoch: u64 },
    /// Close the source and retry after `delay`.
    ScheduleRetry {
        epoch: u64,
        attempt: u32,
        delay: Duration,
    },
    /// Retries are used up; close the source and stay idle.
    Exhausted { attempts: u32 },
    /// User-initiated stop; close the source and stay idle.
    Close,
}

/// Connection state, rolling history and failure bookkeeping of one stream.
#[derive(Debug)]
pub struct StreamCore {
    state: ConnectionState,
    epoch: u64,
    failures: u32,
    policy: ReconnectPolicy,
    history: HistoryBuffer<TelemetrySample>,
    current: Option<TelemetrySample>,
    last_error: Option<String>,
}

impl StreamCore {
    pub fn new(history_capacity: usize, policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            epoch: 0,
            failures: 0,
            policy,
            history: HistoryBuffer::new(history_capacity),
            current: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn current_sample(&self) -> Option<&TelemetrySample> {
        self.current.as_ref()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Retries consumed by the current failure streak.
    pub fn retry_attempt(&self) -> u32 {
        self.failures
    }

    /// Start a session. A no-op while connected or connecting. From
    /// `reconnecting` the pending retry is abandoned and a fresh attempt starts
    /// at once, keeping history. From `disconnected` history is cleared.
    pub fn connect(&mut self) -> CoreAction {
        match self.state {
            ConnectionState::Connected | ConnectionState::Connecting => {
                debug!(state = %self.state, "connect ignored");
                CoreAction::None
            }
            ConnectionState::Reconnecting => {
                info!(attempt = self.failures, "manual connect cancels pending retry");
                self.failures = 0;
                self.begin_session()
            }
            ConnectionState::Disconnected => {
                self.history.clear();
                self.current = None;
                self.last_error = None;
                self.failures = 0;
                self.begin_session()
            }
        }
    }

    /// Stop the session. History and the last error stay readable.
    pub fn disconnect(&mut self) -> CoreAction {
        if self.state == ConnectionState::Disconnected {
            return CoreAction::None;
        }
        self.epoch += 1;
        self.failures = 0;
        self.transition(ConnectionState::Disconnected);
        CoreAction::Close
    }

    pub fn on_opened(&mut self, epoch: u64) -> CoreAction {
        if self.is_stale(epoch, "opened") || self.state != ConnectionState::Connecting {
            return CoreAction::None;
        }
        self.transition(ConnectionState::Connected);
        CoreAction::Stream { epoch }
    }

    /// Record a sample. Returns `false` when it was discarded because the
    /// session is stale or the timestamp does not advance.
    pub fn on_sample(&mut self, epoch: u64, sample: TelemetrySample) -> bool {
        if self.is_stale(epoch, "sample") || self.state != ConnectionState::Connected {
            return false;
        }
        if let Some(last) = self.history.latest() {
            if sample.timestamp <= last.timestamp {
                warn!(
                    timestamp = %sample.timestamp,
                    last = %last.timestamp,
                    "discarding out-of-order sample"
                );
                return false;
            }
        }
        self.failures = 0;
        self.last_error = None;
        self.history.push(sample.clone());
        self.current = Some(sample);
        true
    }

    pub fn on_failure(&mut self, epoch: u64, error: impl Into<String>) -> CoreAction {
        if self.is_stale(epoch, "failure") {
            return CoreAction::None;
        }
        if !matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            return CoreAction::None;
        }
        let error = error.into();
        let attempt = self.failures + 1;
        match self.policy.delay_for(attempt) {
            Some(delay) => {
                warn!(
                    error = %error,
                    attempt,
                    max_attempts = self.policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "telemetry feed failed; scheduling reconnect"
                );
                self.failures = attempt;
                self.last_error = Some(error);
                self.transition(ConnectionState::Reconnecting);
                CoreAction::ScheduleRetry {
                    epoch,
                    attempt,
                    delay,
                }
            }
            None => {
                let attempts = self.failures;
                warn!(error = %error, attempts, "reconnect attempts exhausted");
                self.last_error = Some(format!(
                    "{} (gave up after {} reconnect attempts)",
                    error, attempts
                ));
                self.failures = 0;
                self.epoch += 1;
                self.transition(ConnectionState::Disconnected);
                CoreAction::Exhausted { attempts }
            }
        }
    }

    pub fn on_retry_due(&mut self, epoch: u64) -> CoreAction {
        if self.is_stale(epoch, "retry") || self.state != ConnectionState::Reconnecting {
            return CoreAction::None;
        }
        info!(attempt = self.failures, "reconnecting telemetry feed");
        self.transition(ConnectionState::Connecting);
        CoreAction::Open { epoch }
    }

    pub fn snapshot(&self) -> StreamSnapshot {
        StreamSnapshot::new(
            self.state,
            self.current.clone(),
            self.history.to_vec(HistoryOrder::OldestFirst),
            self.last_error.clone(),
            self.failures,
        )
    }

    fn begin_session(&mut self) -> CoreAction {
        self.epoch += 1;
        self.transition(ConnectionState::Connecting);
        CoreAction::Open { epoch: self.epoch }
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            info!(from = %self.state, to = %next, epoch = self.epoch, "connection state changed");
            self.state = next;
        }
    }

    fn is_stale(&self, epoch: u64, event: &'static str) -> bool {
        let stale = epoch != self.epoch;
        if stale {
            debug!(event, epoch, current = self.epoch, "dropping stale event");
        }
        stale
    }
}
