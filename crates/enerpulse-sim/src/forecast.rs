//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Next-step load forecast heuristic with anomaly grading."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use thiserror::Error;
use tracing::debug;

pub const MIN_POINTS: usize = 24;
const RECENT_WINDOW: usize = 6;
const TREND_WEIGHT: f64 = 0.5;
const FORECAST_NOISE: f64 = 0.03;
const ANOMALY_SIGMA: f64 = 2.0;
const MIN_CONFIDENCE: f64 = 0.5;
const MAX_CONFIDENCE: f64 = 0.98;

#[derive(Debug, Error, PartialEq)]
pub enum ForecastError {
    #[error("forecast needs at least {required} usage values, got {actual}")]
    InsufficientData { required: usize, actual: usize },
    #[error("usage value {value} at index {index} is negative")]
    NegativeUsage { index: usize, value: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySeverity {
    Low,
    Medium,
    High,
}

impl AnomalySeverity {
    /// Grade by how far the prediction overshoots the threshold, relative to it.
    pub fn from_deviation(deviation: f64) -> Self {
        if deviation < 0.1 {
            AnomalySeverity::Low
        } else if deviation < 0.25 {
            AnomalySeverity::Medium
        } else {
            AnomalySeverity::High
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadForecast {
    pub predicted_usage: f64,
    pub anomaly_detected: bool,
    pub anomaly_severity: Option<AnomalySeverity>,
    pub confidence_score: f64,
}

/// Forecast the next usage value from a history of readings (oldest first).
/// At least a day of hourly readings is required.
///
/// The last six readings set the level and trend; the whole history sets the
/// anomaly threshold at two population standard deviations above its mean.
pub fn forecast_load<R: Rng + ?Sized>(
    usage: &[f64],
    rng: &mut R,
) -> Result<LoadForecast, ForecastError> {
    if usage.len() < MIN_POINTS {
        return Err(ForecastError::InsufficientData {
            required: MIN_POINTS,
            actual: usage.len(),
        });
    }
    if let Some((index, &value)) = usage
        .iter()
        .enumerate()
        .find(|(_, v)| **v < 0.0 || !v.is_finite())
    {
        return Err(ForecastError::NegativeUsage { index, value });
    }

    let recent = &usage[usage.len() - RECENT_WINDOW..];
    let historical_avg = usage.iter().mean();
    let historical_std = usage.iter().population_std_dev();
    let recent_avg = recent.iter().mean();
    let recent_std = recent.iter().population_std_dev();

    let slope = trend_slope(recent);
    let trend_factor = 1.0 + (slope / recent_avg.max(1.0)) * TREND_WEIGHT;
    let noise = Uniform::new_inclusive(-FORECAST_NOISE, FORECAST_NOISE).sample(rng);
    let predicted = (recent_avg * trend_factor * (1.0 + noise)).max(0.0);

    let threshold = historical_avg + ANOMALY_SIGMA * historical_std;
    let anomaly_detected = predicted > threshold;
    let anomaly_severity = anomaly_detected.then(|| {
        AnomalySeverity::from_deviation((predicted - threshold) / threshold.max(f64::EPSILON))
    });

    let variation = recent_std / recent_avg.max(0.01);
    let confidence = (1.0 - variation).clamp(MIN_CONFIDENCE, MAX_CONFIDENCE);

    debug!(
        points = usage.len(),
        recent_avg,
        slope,
        threshold,
        predicted,
        "load forecast computed"
    );

    Ok(LoadForecast {
        predicted_usage: round_to(predicted, 2),
        anomaly_detected,
        anomaly_severity,
        confidence_score: round_to(confidence, 3),
    })
}

/// Least-squares slope of `values` against their index.
fn trend_slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = values.iter().mean();
    let (num, den) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, y)| {
            let dx = i as f64 - mean_x;
            (num + dx * (y - mean_y), den + dx * dx)
        });
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}
