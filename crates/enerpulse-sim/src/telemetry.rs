//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Live telemetry sample model and generator."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Utc};
use enerpulse_common::config::SimulatorConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use crate::profile::{fractional_hour, LoadProfile};
use crate::series::SeriesWindow;

const USAGE_NOISE: f64 = 0.1;
const SPIKE_PROBABILITY: f64 = 0.02;
const SPIKE_MIN_FACTOR: f64 = 1.5;
const SPIKE_MAX_FACTOR: f64 = 2.0;
const SOLAR_NOISE: f64 = 25.0;
const SOLAR_MODEL_PEAK: f64 = 800.0;

/// One message of the live feed. The JSON shape is the contract consumed by
/// the live chart: `{timestamp, metrics: {...}, status: {anomaly_detected}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub timestamp: DateTime<Utc>,
    pub metrics: TelemetryMetrics,
    pub status: TelemetryStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryMetrics {
    pub current_usage: f64,
    pub solar_output: f64,
    pub grid_dependency: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryStatus {
    pub anomaly_detected: bool,
}

impl TelemetrySample {
    pub fn is_anomalous(&self) -> bool {
        self.status.anomaly_detected
    }
}

/// Generates plausible samples: usage follows [`LoadProfile`] with noise and
/// rare spikes, solar follows the daily series model scaled to the array
/// capacity, and the grid covers whatever solar does not.
#[derive(Debug)]
pub struct SampleSynthesizer {
    profile: LoadProfile,
    window: SeriesWindow,
    solar_capacity_kw: f64,
    anomaly_probability: f64,
    usage_noise: Uniform<f64>,
    spike_factor: Uniform<f64>,
    solar_noise: Uniform<f64>,
    rng: StdRng,
    last_timestamp: Option<DateTime<Utc>>,
}

impl SampleSynthesizer {
    pub fn new(config: &SimulatorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            profile: LoadProfile::new(config.base_load_kw),
            window: SeriesWindow::default(),
            solar_capacity_kw: config.solar_capacity_kw.max(0.0),
            anomaly_probability: probability(config.anomaly_probability),
            usage_noise: Uniform::new_inclusive(-USAGE_NOISE, USAGE_NOISE),
            spike_factor: Uniform::new_inclusive(SPIKE_MIN_FACTOR, SPIKE_MAX_FACTOR),
            solar_noise: Uniform::new_inclusive(-SOLAR_NOISE, SOLAR_NOISE),
            rng,
            last_timestamp: None,
        }
    }

    /// Re-seed for deterministic output.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn profile(&self) -> &LoadProfile {
        &self.profile
    }

    /// Draw a uniform value in `[0, 1)` from the synthesizer's generator.
    /// Used by simulated transports for drop decisions so a single seed
    /// reproduces a whole session.
    pub fn roll(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Produce the sample for wall-clock instant `now`. Timestamps are forced
    /// strictly increasing even if the clock stalls.
    pub fn next_sample(&mut self, now: DateTime<FixedOffset>) -> TelemetrySample {
        let hour = fractional_hour(&now);

        let mut usage = self.profile.expected_load_kw(&now);
        usage += usage * self.usage_noise.sample(&mut self.rng);
        if self.rng.gen_bool(SPIKE_PROBABILITY) {
            usage *= self.spike_factor.sample(&mut self.rng);
        }
        let usage = usage.max(0.0);

        let solar_model = self.window.solar_at(hour);
        let solar = if solar_model > 0.0 {
            let scale = self.solar_capacity_kw / SOLAR_MODEL_PEAK;
            ((solar_model + self.solar_noise.sample(&mut self.rng)) * scale).max(0.0)
        } else {
            0.0
        };

        let grid = (usage - solar).max(0.0);
        let anomaly_detected = self.rng.gen_bool(self.anomaly_probability)
            || usage > self.profile.spike_threshold_kw();

        TelemetrySample {
            timestamp: self.monotonic_timestamp(now.with_timezone(&Utc)),
            metrics: TelemetryMetrics {
                current_usage: round2(usage),
                solar_output: round2(solar),
                grid_dependency: round2(grid),
            },
            status: TelemetryStatus { anomaly_detected },
        }
    }

    fn monotonic_timestamp(&mut self, candidate: DateTime<Utc>) -> DateTime<Utc> {
        let timestamp = match self.last_timestamp {
            Some(last) if candidate <= last => last + ChronoDuration::milliseconds(1),
            _ => candidate,
        };
        self.last_timestamp = Some(timestamp);
        timestamp
    }
}

fn probability(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use enerpulse_common::{Clock, FixedClock};
    use serde_json::json;

    fn config(seed: u64) -> SimulatorConfig {
        SimulatorConfig {
            seed: Some(seed),
            ..SimulatorConfig::default()
        }
    }

    #[test]
    fn samples_are_non_negative_and_balanced() {
        let mut synth = SampleSynthesizer::new(&config(42));
        for hour in 0..24 {
            let now = FixedClock::at_hour(hour).now();
            let sample = synth.next_sample(now);
            let m = sample.metrics;
            assert!(m.current_usage >= 0.0);
            assert!(m.solar_output >= 0.0);
            assert!(m.grid_dependency >= 0.0);
            let expected_grid = (m.current_usage - m.solar_output).max(0.0);
            assert!((m.grid_dependency - expected_grid).abs() <= 0.011);
        }
    }

    #[test]
    fn no_solar_at_night() {
        let mut synth = SampleSynthesizer::new(&config(1));
        let sample = synth.next_sample(FixedClock::at_hour(2).now());
        assert_eq!(sample.metrics.solar_output, 0.0);
        assert_eq!(sample.metrics.grid_dependency, sample.metrics.current_usage);
    }

    #[test]
    fn midday_solar_approaches_capacity() {
        let mut synth = SampleSynthesizer::new(&config(9));
        let sample = synth.next_sample(FixedClock::at_hour(12).now());
        assert!(sample.metrics.solar_output > 100.0);
        assert!(sample.metrics.solar_output < 125.0);
    }

    #[test]
    fn timestamps_strictly_increase_on_a_frozen_clock() {
        let mut synth = SampleSynthesizer::new(&config(3));
        let now = FixedClock::at_hour(10).now();
        let first = synth.next_sample(now);
        let second = synth.next_sample(now);
        let third = synth.next_sample(now);
        assert!(first.timestamp < second.timestamp);
        assert!(second.timestamp < third.timestamp);
    }

    #[test]
    fn certain_anomaly_probability_flags_every_sample() {
        let mut synth = SampleSynthesizer::new(&SimulatorConfig {
            anomaly_probability: 1.0,
            seed: Some(5),
            ..SimulatorConfig::default()
        });
        let now = FixedClock::at_hour(8).now();
        assert!((0..10).all(|_| synth.next_sample(now).is_anomalous()));
    }

    #[test]
    fn zero_base_load_never_spikes() {
        let mut synth = SampleSynthesizer::new(&SimulatorConfig {
            base_load_kw: 0.0,
            anomaly_probability: 0.0,
            seed: Some(5),
            ..SimulatorConfig::default()
        });
        let now = FixedClock::at_hour(3).now();
        for _ in 0..100 {
            let sample = synth.next_sample(now);
            assert_eq!(sample.metrics.current_usage, 0.0);
            assert!(!sample.is_anomalous());
        }
    }

    #[test]
    fn seeded_synthesizers_agree() {
        let now = FixedClock::at_hour(15).now();
        let mut a = SampleSynthesizer::new(&config(77));
        let mut b = SampleSynthesizer::new(&config(1)).with_seed(77);
        assert_eq!(a.next_sample(now), b.next_sample(now));
    }

    #[test]
    fn wire_shape_matches_chart_contract() {
        let mut synth = SampleSynthesizer::new(&config(2));
        let sample = synth.next_sample(FixedClock::at_hour(13).now());
        let value = serde_json::to_value(&sample).unwrap();
        assert!(value["timestamp"].is_string());
        assert!(value["metrics"]["current_usage"].is_number());
        assert!(value["metrics"]["solar_output"].is_number());
        assert!(value["metrics"]["grid_dependency"].is_number());
        assert!(value["status"]["anomaly_detected"].is_boolean());

        let decoded: TelemetrySample = serde_json::from_value(json!({
            "timestamp": "2024-06-03T13:00:00Z",
            "metrics": {"current_usage": 210.5, "solar_output": 95.0, "grid_dependency": 115.5},
            "status": {"anomaly_detected": false}
        }))
        .unwrap();
        assert_eq!(decoded.metrics.grid_dependency, 115.5);
    }
}
