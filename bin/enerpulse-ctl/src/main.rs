//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Command line entry point for series export and live feed watching."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use enerpulse_common::{init_tracing, AppConfig, ConsoleTarget};

mod series;
mod watch;

const SERVICE_NAME: &str = "enerpulse-ctl";
const DEFAULT_CONFIG_PATH: &str = "enerpulse.toml";

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "EnerPulse telemetry tooling",
    long_about = None
)]
struct Cli {
    /// Configuration file. Defaults to $ENERPULSE_CONFIG, then ./enerpulse.toml
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write the solar versus pollution series for the dashboard chart
    Series(series::SeriesArgs),
    /// Connect to a telemetry feed and print samples as JSON lines
    Watch(watch::WatchArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    // stdout carries data; logs go to stderr.
    let mut logging = config.logging.clone();
    logging.console = ConsoleTarget::Stderr;
    init_tracing(SERVICE_NAME, &logging)?;

    match cli.command {
        Commands::Series(args) => series::run(&config, args),
        Commands::Watch(args) => watch::run(&config, args).await,
    }
}

fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    match explicit {
        Some(path) => AppConfig::from_path(path),
        None => AppConfig::load_or_default(&[PathBuf::from(DEFAULT_CONFIG_PATH)]),
    }
}
