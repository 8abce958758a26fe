//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Timer-driven local telemetry simulator."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::time::Duration;

use async_trait::async_trait;
use enerpulse_common::{SharedClock, SimulatorConfig};
use enerpulse_sim::{SampleSynthesizer, TelemetrySample};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::debug;

use crate::error::{Result, StreamError};
use crate::source::TelemetrySource;

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Emits one synthesized sample per period, the first one period after open.
#[derive(Debug)]
pub struct SimulatedSource {
    synthesizer: SampleSynthesizer,
    clock: SharedClock,
    period: Duration,
    drop_probability: f64,
    ticker: Option<Interval>,
}

impl SimulatedSource {
    pub fn new(config: &SimulatorConfig, period: Duration, clock: SharedClock) -> Self {
        Self::with_synthesizer(SampleSynthesizer::new(config), period, clock)
            .with_drop_probability(config.drop_probability)
    }

    pub fn with_synthesizer(
        synthesizer: SampleSynthesizer,
        period: Duration,
        clock: SharedClock,
    ) -> Self {
        Self {
            synthesizer,
            clock,
            period: period.max(MIN_PERIOD),
            drop_probability: 0.0,
            ticker: None,
        }
    }

    /// Chance per tick that the simulated connection drops instead of
    /// delivering a sample.
    pub fn with_drop_probability(mut self, probability: f64) -> Self {
        self.drop_probability = if probability.is_finite() {
            probability.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_open(&self) -> bool {
        self.ticker.is_some()
    }
}

#[async_trait]
impl TelemetrySource for SimulatedSource {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn open(&mut self) -> Result<()> {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
        debug!(period_ms = self.period.as_millis() as u64, "simulated feed opened");
        Ok(())
    }

    async fn next_sample(&mut self) -> Result<TelemetrySample> {
        let ticker = self.ticker.as_mut().ok_or(StreamError::NotOpen)?;
        ticker.tick().await;
        // Only draw when drops are enabled so the sample sequence for a seed
        // does not depend on this setting.
        if self.drop_probability > 0.0 && self.synthesizer.roll() < self.drop_probability {
            return Err(StreamError::SimulatedDrop);
        }
        Ok(self.synthesizer.next_sample(self.clock.now()))
    }

    async fn close(&mut self) {
        if self.ticker.take().is_some() {
            debug!("simulated feed closed");
        }
    }
}
