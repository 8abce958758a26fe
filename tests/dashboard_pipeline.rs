//! ---
//! ems_section: "15-testing-qa-runbook"
//! ems_subsection: "integration-tests"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "End-to-end dashboard data flow from configuration to forecast."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::time::Duration;

use enerpulse_common::{AppConfig, FixedClock, PollutionMetric};
use enerpulse_sim::{forecast_load, SeriesSynthesizer};
use enerpulse_stream::{ConnectionState, TelemetryStreamBuilder};
use rand::rngs::StdRng;
use rand::SeedableRng;

const CONFIG: &str = r#"
[series]
start_hour = 6
end_hour = 22
metric = "aqi"
seed = 11

[stream]
tick_interval = 500
history_capacity = 24

[simulator]
seed = 11
"#;

#[test]
fn configured_series_splits_observed_and_forecast_hours() {
    let config: AppConfig = CONFIG.parse().unwrap();
    assert_eq!(config.series.metric, PollutionMetric::AirQualityIndex);

    let synthesizer = SeriesSynthesizer::from_config(&config.series).unwrap();
    let mut rng = StdRng::seed_from_u64(config.series.seed.unwrap());
    let points = synthesizer.generate(14, &mut rng);

    assert_eq!(points.len(), 17);
    assert!(points.windows(2).all(|pair| pair[0].hour < pair[1].hour));
    let observed = points.iter().filter(|point| !point.is_forecast).count();
    assert_eq!(observed, 9);

    let json = serde_json::to_value(&points[0]).unwrap();
    assert!(json.get("airQualityIndex").is_some());
    assert!(json.get("carbonIntensity").is_none());
}

#[tokio::test(start_paused = true)]
async fn configured_stream_feeds_the_forecast() {
    let config: AppConfig = CONFIG.parse().unwrap();
    let clock = FixedClock::at_hour(10).shared();
    let stream = TelemetryStreamBuilder::from_config(&config.stream, &config.simulator, clock)
        .unwrap()
        .spawn();
    stream.connect().unwrap();

    // Twenty-six ticks into a history of twenty-four.
    tokio::time::sleep(Duration::from_millis(13_250)).await;
    let snapshot = stream.snapshot();
    assert_eq!(snapshot.state(), ConnectionState::Connected);
    assert_eq!(snapshot.history_len(), 24);

    let chart = snapshot.chart_points();
    assert_eq!(chart.len(), 24);
    assert!(chart.iter().all(|point| point.time.starts_with("10:00:")));

    let usage = snapshot.usage_series();
    let mut rng = StdRng::seed_from_u64(1);
    let forecast = forecast_load(&usage, &mut rng).unwrap();
    assert!(forecast.predicted_usage > 0.0);
    assert!((0.5..=0.98).contains(&forecast.confidence_score));

    stream.disconnect().unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    let after = stream.snapshot();
    assert_eq!(after.state(), ConnectionState::Disconnected);
    assert_eq!(after.history_len(), 24);
    stream.shutdown().await.unwrap();
}
