//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Series export subcommand."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use enerpulse_common::{AppConfig, PollutionMetric, SeriesConfig, SystemClock};
use enerpulse_sim::{DashboardDataPoint, SeriesSynthesizer};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Csv,
    Json,
}

#[derive(Debug, Args)]
pub struct SeriesArgs {
    /// First hour of the window (0-23)
    #[arg(long)]
    start_hour: Option<u32>,

    /// Last hour of the window, inclusive (0-23)
    #[arg(long)]
    end_hour: Option<u32>,

    /// Pollution proxy: carbon-intensity or aqi
    #[arg(long)]
    metric: Option<PollutionMetric>,

    /// Random seed for reproducible jitter
    #[arg(long)]
    seed: Option<u64>,

    /// Treat this as the current hour instead of reading the wall clock
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..24))]
    hour: Option<u32>,

    /// Output format. Inferred from the output extension, JSON for stdout
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Output file path. Use '-' for stdout.
    #[arg(long, default_value = "-")]
    output: PathBuf,
}

pub fn run(config: &AppConfig, args: SeriesArgs) -> Result<()> {
    let series = resolve_config(&config.series, &args);
    series.validate()?;
    let synthesizer = SeriesSynthesizer::from_config(&series)?;

    let mut rng = match series.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let points = match args.hour {
        Some(hour) => synthesizer.generate(hour, &mut rng),
        None => synthesizer.generate_now(&SystemClock, &mut rng),
    };

    let format = determine_format(&args.output, args.format);
    if args.output.as_os_str() == "-" {
        let mut stdout = io::stdout().lock();
        write_points(&points, format, &mut stdout)?;
    } else {
        let file = File::create(&args.output)
            .with_context(|| format!("failed to create output file {}", args.output.display()))?;
        write_points(&points, format, file)?;
        info!(
            points = points.len(),
            output = %args.output.display(),
            format = ?format,
            "series written"
        );
    }
    Ok(())
}

fn resolve_config(base: &SeriesConfig, args: &SeriesArgs) -> SeriesConfig {
    SeriesConfig {
        start_hour: args.start_hour.unwrap_or(base.start_hour),
        end_hour: args.end_hour.unwrap_or(base.end_hour),
        metric: args.metric.unwrap_or(base.metric),
        seed: args.seed.or(base.seed),
    }
}

fn determine_format(path: &Path, override_format: Option<OutputFormat>) -> OutputFormat {
    if let Some(format) = override_format {
        return format;
    }
    if path.as_os_str() == "-" {
        return OutputFormat::Json;
    }
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("csv") => OutputFormat::Csv,
        _ => OutputFormat::Json,
    }
}

fn write_points<W: Write>(
    points: &[DashboardDataPoint],
    format: OutputFormat,
    mut writer: W,
) -> Result<()> {
    match format {
        OutputFormat::Csv => {
            let mut csv = csv::Writer::from_writer(writer);
            for point in points {
                csv.serialize(point)?;
            }
            csv.flush()?;
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, points)?;
            writer.write_all(b"\n")?;
        }
    }
    Ok(())
}
