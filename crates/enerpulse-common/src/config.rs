//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the telemetry core."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use tracing::debug;
use url::Url;

use crate::logging::LogFormat;

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_file_enabled() -> bool {
    true
}

fn default_start_hour() -> u32 {
    6
}

fn default_end_hour() -> u32 {
    22
}

fn default_tick_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_history_capacity() -> usize {
    60
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff() -> Duration {
    Duration::from_secs(3)
}

fn default_base_load_kw() -> f64 {
    150.0
}

fn default_solar_capacity_kw() -> f64 {
    120.0
}

fn default_anomaly_probability() -> f64 {
    0.02
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9898))
}

/// Primary configuration document for EnerPulse tooling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub series: SeriesConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "ENERPULSE_CONFIG";

    /// Load configuration from disk, respecting the `ENERPULSE_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Some(path) = Self::env_override() {
            let config = Self::from_path(&path)?;
            return Ok(LoadedAppConfig {
                config,
                source: path,
            });
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    /// Like [`AppConfig::load`] but falls back to defaults when neither the
    /// environment override nor any candidate exists.
    pub fn load_or_default<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        let any_present = Self::env_override().is_some()
            || candidates.iter().any(|candidate| candidate.as_ref().exists());
        if any_present {
            Self::load(candidates)
        } else {
            debug!("no configuration file present; using defaults");
            Ok(Self::default())
        }
    }

    fn env_override() -> Option<PathBuf> {
        std::env::var(Self::ENV_CONFIG_PATH)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<AppConfig>()
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.series.validate()?;
        self.stream.validate()?;
        self.simulator.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Where the console log layer writes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleTarget {
    #[default]
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
    #[serde(default = "default_file_enabled")]
    pub file_enabled: bool,
    #[serde(default)]
    pub console: ConsoleTarget,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
            file_enabled: default_file_enabled(),
            console: ConsoleTarget::default(),
        }
    }
}

/// Field name used for the pollution proxy in chart records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum PollutionMetric {
    #[default]
    CarbonIntensity,
    AirQualityIndex,
}

impl PollutionMetric {
    /// Key emitted in chart records.
    pub fn field_name(&self) -> &'static str {
        match self {
            PollutionMetric::CarbonIntensity => "carbonIntensity",
            PollutionMetric::AirQualityIndex => "airQualityIndex",
        }
    }
}

impl std::str::FromStr for PollutionMetric {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "carbon_intensity" | "carbon" | "carbonintensity" => Ok(Self::CarbonIntensity),
            "air_quality_index" | "aqi" | "airqualityindex" => Ok(Self::AirQualityIndex),
            other => Err(format!("unknown pollution metric: {}", other)),
        }
    }
}

/// Window and presentation settings for the synthesized daily series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesConfig {
    #[serde(default = "default_start_hour")]
    pub start_hour: u32,
    #[serde(default = "default_end_hour")]
    pub end_hour: u32,
    #[serde(default)]
    pub metric: PollutionMetric,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            start_hour: default_start_hour(),
            end_hour: default_end_hour(),
            metric: PollutionMetric::default(),
            seed: None,
        }
    }
}

impl SeriesConfig {
    pub fn validate(&self) -> Result<()> {
        if self.end_hour > 23 {
            return Err(anyhow!(
                "series end_hour {} must be within 0..=23",
                self.end_hour
            ));
        }
        if self.start_hour > self.end_hour {
            return Err(anyhow!(
                "series start_hour {} must not exceed end_hour {}",
                self.start_hour,
                self.end_hour
            ));
        }
        Ok(())
    }
}

#[serde_as]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconnectConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub backoff: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: default_backoff(),
        }
    }
}

/// Feed the stream consumes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    #[default]
    Simulated,
    WebSocket {
        url: String,
    },
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_tick_interval")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub tick_interval: Duration,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub transport: TransportConfig,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            tick_interval: default_tick_interval(),
            history_capacity: default_history_capacity(),
            reconnect: ReconnectConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl StreamConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(anyhow!("stream tick_interval must be greater than zero"));
        }
        if self.history_capacity == 0 {
            return Err(anyhow!("stream history_capacity must be greater than zero"));
        }
        if let TransportConfig::WebSocket { url } = &self.transport {
            let parsed =
                Url::parse(url).with_context(|| format!("invalid websocket url {}", url))?;
            if !matches!(parsed.scheme(), "ws" | "wss") {
                return Err(anyhow!(
                    "websocket url {} must use the ws or wss scheme",
                    url
                ));
            }
        }
        Ok(())
    }
}

/// Parameters of the local telemetry simulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default = "default_base_load_kw")]
    pub base_load_kw: f64,
    #[serde(default = "default_solar_capacity_kw")]
    pub solar_capacity_kw: f64,
    #[serde(default = "default_anomaly_probability")]
    pub anomaly_probability: f64,
    /// Per-tick chance of a simulated connection drop.
    #[serde(default)]
    pub drop_probability: f64,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            base_load_kw: default_base_load_kw(),
            solar_capacity_kw: default_solar_capacity_kw(),
            anomaly_probability: default_anomaly_probability(),
            drop_probability: 0.0,
            seed: None,
        }
    }
}

impl SimulatorConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.base_load_kw.is_finite() && self.base_load_kw >= 0.0) {
            return Err(anyhow!("simulator base_load_kw must be a non-negative number"));
        }
        if !(self.solar_capacity_kw.is_finite() && self.solar_capacity_kw >= 0.0) {
            return Err(anyhow!(
                "simulator solar_capacity_kw must be a non-negative number"
            ));
        }
        for (name, value) in [
            ("anomaly_probability", self.anomaly_probability),
            ("drop_probability", self.drop_probability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("simulator {} must be within 0..=1", name));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn empty_document_yields_defaults() {
        let config: AppConfig = "".parse().unwrap();
        assert_eq!(config.series.start_hour, 6);
        assert_eq!(config.series.end_hour, 22);
        assert_eq!(config.stream.history_capacity, 60);
        assert_eq!(config.stream.tick_interval, Duration::from_secs(1));
        assert_eq!(config.stream.reconnect.max_attempts, 5);
        assert_eq!(config.stream.reconnect.backoff, Duration::from_secs(3));
        assert_eq!(config.stream.transport, TransportConfig::Simulated);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn parses_full_document() {
        let config: AppConfig = r#"
            [logging]
            format = "pretty"
            console = "stderr"
            file_enabled = false

            [series]
            start_hour = 5
            end_hour = 20
            metric = "air_quality_index"
            seed = 7

            [stream]
            tick_interval = 250
            history_capacity = 30

            [stream.reconnect]
            max_attempts = 2
            backoff = 1

            [stream.transport]
            kind = "web_socket"
            url = "ws://127.0.0.1:9000/ws"

            [simulator]
            base_load_kw = 90.0
            drop_probability = 0.1
        "#
        .parse()
        .unwrap();
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.logging.console, ConsoleTarget::Stderr);
        assert!(!config.logging.file_enabled);
        assert_eq!(config.series.metric, PollutionMetric::AirQualityIndex);
        assert_eq!(config.series.seed, Some(7));
        assert_eq!(config.stream.tick_interval, Duration::from_millis(250));
        assert_eq!(config.stream.reconnect.max_attempts, 2);
        assert_eq!(config.stream.reconnect.backoff, Duration::from_secs(1));
        assert_eq!(
            config.stream.transport,
            TransportConfig::WebSocket {
                url: "ws://127.0.0.1:9000/ws".into()
            }
        );
        assert_eq!(config.simulator.base_load_kw, 90.0);
        assert_eq!(config.simulator.solar_capacity_kw, 120.0);
    }

    #[test]
    fn rejects_inverted_window() {
        let err = "[series]\nstart_hour = 20\nend_hour = 10\n"
            .parse::<AppConfig>()
            .unwrap_err();
        assert!(err.to_string().contains("start_hour"));
    }

    #[test]
    fn rejects_zero_capacity_and_interval() {
        assert!("[stream]\nhistory_capacity = 0\n".parse::<AppConfig>().is_err());
        assert!("[stream]\ntick_interval = 0\n".parse::<AppConfig>().is_err());
    }

    #[test]
    fn rejects_non_websocket_url() {
        let doc = "[stream.transport]\nkind = \"web_socket\"\nurl = \"http://localhost\"\n";
        assert!(doc.parse::<AppConfig>().is_err());
    }

    #[test]
    fn rejects_out_of_range_probability() {
        assert!("[simulator]\nanomaly_probability = 1.5\n"
            .parse::<AppConfig>()
            .is_err());
    }

    #[test]
    fn metric_parses_aliases() {
        assert_eq!(
            "aqi".parse::<PollutionMetric>().unwrap(),
            PollutionMetric::AirQualityIndex
        );
        assert_eq!(
            "carbon-intensity".parse::<PollutionMetric>().unwrap(),
            PollutionMetric::CarbonIntensity
        );
        assert!("ozone".parse::<PollutionMetric>().is_err());
    }

    #[test]
    fn loads_first_existing_candidate() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "[stream]\nhistory_capacity = 12")?;
        file.flush()?;
        let loaded = AppConfig::load_with_source(&[
            PathBuf::from("/nonexistent/enerpulse.toml"),
            file.path().to_path_buf(),
        ])?;
        assert_eq!(loaded.source, file.path());
        assert_eq!(loaded.config.stream.history_capacity, 12);
        Ok(())
    }

    #[test]
    fn missing_candidates_fall_back_to_defaults() -> Result<()> {
        let config = AppConfig::load_or_default(&["/nonexistent/enerpulse.toml"])?;
        assert_eq!(config.stream.history_capacity, 60);
        Ok(())
    }
}
