//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Correlated solar and carbon-intensity daily series synthesis."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! The daily series is a three-band piecewise model over an hour window:
//! solar ramps up while grid carbon intensity falls, plateaus around midday,
//! then declines while carbon intensity climbs into the evening. Bounded
//! uniform jitter is layered on top and both metrics are floored at zero.
use std::ops::RangeInclusive;

use enerpulse_common::config::SeriesConfig;
use enerpulse_common::{Clock, PollutionMetric};
use rand::Rng;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_START_HOUR: u32 = 6;
pub const DEFAULT_END_HOUR: u32 = 22;
const LAST_HOUR: u32 = 23;

const RISE_HOURS: u32 = 6;
const DECLINE_OFFSET: u32 = 11;
const PLATEAU_HOURS: f64 = 5.0;
const DECLINE_HOURS: f64 = 5.0;

const PEAK_SOLAR: f64 = 800.0;
const PLATEAU_SOLAR_DIP: f64 = 200.0;
const DECLINE_SOLAR_START: f64 = 600.0;

const DAWN_CARBON: f64 = 250.0;
const RISE_CARBON_DROP: f64 = 100.0;
const MIDDAY_CARBON: f64 = 150.0;
const PLATEAU_CARBON_RISE: f64 = 20.0;
const DECLINE_CARBON_START: f64 = 170.0;
const DECLINE_CARBON_RISE: f64 = 130.0;

const SOLAR_JITTER: f64 = 25.0;
const CARBON_JITTER: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SeriesError {
    #[error("invalid series window {start}..={end}: hours must satisfy start <= end <= 23")]
    InvalidWindow { start: u32, end: u32 },
}

/// Inclusive hour window covered by a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesWindow {
    start_hour: u32,
    end_hour: u32,
}

impl Default for SeriesWindow {
    fn default() -> Self {
        Self {
            start_hour: DEFAULT_START_HOUR,
            end_hour: DEFAULT_END_HOUR,
        }
    }
}

/// Segment of the piecewise daily model an hour falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    /// `hour <= start + 6`
    Rise,
    /// `start + 6 < hour < start + 11`
    Plateau,
    /// `hour >= start + 11`
    Decline,
}

/// Un-jittered model output for one hour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    pub solar_output: f64,
    pub carbon_intensity: f64,
}

impl SeriesWindow {
    pub fn new(start_hour: u32, end_hour: u32) -> Result<Self, SeriesError> {
        if start_hour > end_hour || end_hour > LAST_HOUR {
            return Err(SeriesError::InvalidWindow {
                start: start_hour,
                end: end_hour,
            });
        }
        Ok(Self {
            start_hour,
            end_hour,
        })
    }

    pub fn from_config(config: &SeriesConfig) -> Result<Self, SeriesError> {
        Self::new(config.start_hour, config.end_hour)
    }

    pub fn start_hour(&self) -> u32 {
        self.start_hour
    }

    pub fn end_hour(&self) -> u32 {
        self.end_hour
    }

    pub fn hours(&self) -> RangeInclusive<u32> {
        self.start_hour..=self.end_hour
    }

    pub fn len(&self) -> usize {
        (self.end_hour - self.start_hour + 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Assign an hour to exactly one band. Hours before the window start are
    /// treated as the start of the rise.
    pub fn classify(&self, hour: u32) -> Band {
        let offset = hour.saturating_sub(self.start_hour);
        if offset <= RISE_HOURS {
            Band::Rise
        } else if offset < DECLINE_OFFSET {
            Band::Plateau
        } else {
            Band::Decline
        }
    }

    /// Model values for `hour` before jitter.
    pub fn baseline(&self, hour: u32) -> Baseline {
        let offset = hour.saturating_sub(self.start_hour);
        match self.classify(hour) {
            Band::Rise => {
                let progress = f64::from(offset) / f64::from(RISE_HOURS);
                Baseline {
                    solar_output: round_half_up(progress * PEAK_SOLAR),
                    carbon_intensity: round_half_up(DAWN_CARBON - progress * RISE_CARBON_DROP),
                }
            }
            Band::Plateau => {
                let progress = f64::from(offset - RISE_HOURS) / PLATEAU_HOURS;
                Baseline {
                    solar_output: PEAK_SOLAR - round_half_up(progress * PLATEAU_SOLAR_DIP),
                    carbon_intensity: MIDDAY_CARBON
                        + round_half_up(progress * PLATEAU_CARBON_RISE),
                }
            }
            Band::Decline => {
                let progress = f64::from(offset - DECLINE_OFFSET) / DECLINE_HOURS;
                Baseline {
                    solar_output: round_half_up(
                        DECLINE_SOLAR_START - progress * DECLINE_SOLAR_START,
                    )
                    .max(0.0),
                    carbon_intensity: round_half_up(
                        DECLINE_CARBON_START + progress * DECLINE_CARBON_RISE,
                    ),
                }
            }
        }
    }

    /// Baseline solar output interpolated between whole hours. Zero outside
    /// the window.
    pub fn solar_at(&self, fractional_hour: f64) -> f64 {
        if !fractional_hour.is_finite()
            || fractional_hour < f64::from(self.start_hour)
            || fractional_hour > f64::from(self.end_hour) + 1.0
        {
            return 0.0;
        }
        let lower = fractional_hour.floor() as u32;
        let weight = fractional_hour - f64::from(lower);
        let left = self.baseline(lower).solar_output;
        let right = if lower + 1 > self.end_hour {
            0.0
        } else {
            self.baseline(lower + 1).solar_output
        };
        left + (right - left) * weight
    }
}

/// One point of the synthesized daily series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardDataPoint {
    pub hour: u32,
    /// `HH:00` label.
    pub timestamp: String,
    /// Carbon intensity, or AQI when the series uses [`PollutionMetric::AirQualityIndex`].
    pub carbon_intensity: u32,
    pub solar_output: u32,
    pub is_forecast: bool,
    pub metric: PollutionMetric,
}

impl Serialize for DashboardDataPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut record = serializer.serialize_struct("DashboardDataPoint", 4)?;
        record.serialize_field("timestamp", &self.timestamp)?;
        record.serialize_field(self.metric.field_name(), &self.carbon_intensity)?;
        record.serialize_field("solarOutput", &self.solar_output)?;
        record.serialize_field("isForecast", &self.is_forecast)?;
        record.end()
    }
}

/// Produces the chart series for a window.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeriesSynthesizer {
    window: SeriesWindow,
    metric: PollutionMetric,
}

impl SeriesSynthesizer {
    pub fn new(window: SeriesWindow) -> Self {
        Self {
            window,
            metric: PollutionMetric::default(),
        }
    }

    pub fn from_config(config: &SeriesConfig) -> Result<Self, SeriesError> {
        Ok(Self::new(SeriesWindow::from_config(config)?).with_metric(config.metric))
    }

    pub fn with_metric(mut self, metric: PollutionMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn window(&self) -> SeriesWindow {
        self.window
    }

    /// Generate one point per hour of the window. Hours after `current_hour`
    /// are flagged as forecast.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        current_hour: u32,
        rng: &mut R,
    ) -> Vec<DashboardDataPoint> {
        let points: Vec<DashboardDataPoint> = self
            .window
            .hours()
            .map(|hour| {
                let baseline = self.window.baseline(hour);
                let solar = baseline.solar_output + rng.gen_range(-SOLAR_JITTER..=SOLAR_JITTER);
                let carbon =
                    baseline.carbon_intensity + rng.gen_range(-CARBON_JITTER..=CARBON_JITTER);
                DashboardDataPoint {
                    hour,
                    timestamp: format!("{:02}:00", hour),
                    carbon_intensity: clamp_to_count(carbon),
                    solar_output: clamp_to_count(solar),
                    is_forecast: hour > current_hour,
                    metric: self.metric,
                }
            })
            .collect();
        debug!(
            start_hour = self.window.start_hour,
            end_hour = self.window.end_hour,
            current_hour,
            points = points.len(),
            "synthesized daily series"
        );
        points
    }

    /// Generate against the hour reported by `clock`.
    pub fn generate_now<R: Rng + ?Sized>(
        &self,
        clock: &dyn Clock,
        rng: &mut R,
    ) -> Vec<DashboardDataPoint> {
        self.generate(clock.current_hour(), rng)
    }
}

/// Half-up rounding, so `x.5` always moves toward positive infinity.
pub(crate) fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

fn clamp_to_count(value: f64) -> u32 {
    round_half_up(value.max(0.0)) as u32
}
