//! WIFITRACK SIM: simulations for the WiFi RSSI tracking filters.
//!
//! Each command runs one scenario against a known ground truth and writes the estimate next to
//! the truth as CSV:
//!
//! - `kf1d`: 1D constant-velocity filter with noisy position measurements.
//! - `kf2d`: 2D constant-velocity filter with correlated position noise.
//! - `wifi`: full pipeline from simulated RSSI readings through multilateration to the 2D filter.
//! - `config`: write a template tracker configuration.

mod common;

use clap::{Args, Parser, Subcommand};
use common::{init_logger, validate_output_path};
use log::{error, info};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::error::Error;
use std::path::{Path, PathBuf};
use wifitrack::config::TrackerConfig;
use wifitrack::sim::{SimulationParams, TrackingResult, simulate_1d, simulate_2d, simulate_wifi_2d};

const LONG_ABOUT: &str = "WIFITRACK SIM: simulations for the WiFi RSSI tracking filters.

Each scenario moves a device along a known trajectory, feeds noisy observations to the
Kalman filter and writes truth and estimate side by side to a CSV file.

- kf1d: 1D constant-velocity filter with noisy position measurements.
- kf2d: 2D constant-velocity filter with correlated position noise.
- wifi: simulated RSSI from three access points, multilaterated and filtered.

Tracker parameters for the wifi scenario are read from a configuration file
(TOML/JSON/YAML); use the config command to generate a template.";

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about = "Simulations for the WiFi RSSI tracking filters.", long_about = LONG_ABOUT)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Log file path (if not specified, logs to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

/// Top-level commands
#[derive(Subcommand, Clone)]
enum Command {
    #[command(name = "kf1d", about = "Simulate the 1D constant-velocity filter")]
    KalmanFilter1D(RunArgs),
    #[command(name = "kf2d", about = "Simulate the 2D constant-velocity filter")]
    KalmanFilter2D(RunArgs),
    #[command(
        name = "wifi",
        about = "Simulate tracking from WiFi signal strength",
        long_about = "Simulate a device moving among three access points. Ranges are corrupted with unit Gaussian noise, converted to RSSI through the configured path-loss model, multilaterated and fed to the 2D filter."
    )]
    Wifi(WifiArgs),
    #[command(name = "config", about = "Generate a template configuration file")]
    CreateConfig(ConfigArgs),
}

/// Common simulation arguments
#[derive(Args, Clone, Debug)]
struct RunArgs {
    /// Output CSV file path
    #[arg(short, long, value_parser)]
    output: PathBuf,

    /// Number of simulation steps
    #[arg(long, default_value_t = 1000)]
    steps: usize,

    /// Step length in seconds
    #[arg(long, default_value_t = 0.1)]
    dt: f64,

    /// Take a measurement every N steps
    #[arg(long, default_value_t = 10)]
    measure_every: usize,

    /// Random seed
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

#[derive(Args, Clone, Debug)]
struct WifiArgs {
    #[command(flatten)]
    run: RunArgs,

    /// Tracker configuration file (TOML/JSON/YAML); defaults apply if omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Args, Clone, Debug)]
struct ConfigArgs {
    /// Destination of the template (.toml, .json, .yaml or .yml)
    #[arg(short, long, default_value = "wifitrack.toml")]
    output: PathBuf,
}

impl RunArgs {
    fn params(&self) -> SimulationParams {
        SimulationParams {
            dt: self.dt,
            steps: self.steps,
            measure_every: self.measure_every,
        }
    }
}

fn write_result(result: &TrackingResult, output: &Path) -> Result<(), Box<dyn Error>> {
    validate_output_path(output)?;
    result.to_csv(output)?;
    match result.rms_position_error() {
        Some(rms) => info!(
            "{}: wrote {} records to {} (RMS position error {:.3})",
            result.name,
            result.records.len(),
            output.display(),
            rms
        ),
        None => info!("{}: no records written to {}", result.name, output.display()),
    }
    Ok(())
}

fn run_kf1d(args: &RunArgs) -> Result<(), Box<dyn Error>> {
    let mut rng = StdRng::seed_from_u64(args.seed);
    let result = simulate_1d(&args.params(), &mut rng)?;
    write_result(&result, &args.output)
}

fn run_kf2d(args: &RunArgs) -> Result<(), Box<dyn Error>> {
    let mut rng = StdRng::seed_from_u64(args.seed);
    let result = simulate_2d(&args.params(), &mut rng)?;
    write_result(&result, &args.output)
}

fn run_wifi(args: &WifiArgs) -> Result<(), Box<dyn Error>> {
    let config = match &args.config {
        Some(path) => {
            info!("Loading tracker configuration from {}", path.display());
            TrackerConfig::from_file(path)?
        }
        None => TrackerConfig::default(),
    };
    config.validate()?;
    let mut rng = StdRng::seed_from_u64(args.run.seed);
    let result = simulate_wifi_2d(&config, &args.run.params(), &mut rng)?;
    write_result(&result, &args.run.output)
}

fn create_config_file(args: &ConfigArgs) -> Result<(), Box<dyn Error>> {
    validate_output_path(&args.output)?;
    TrackerConfig::default().to_file(&args.output)?;
    info!("Wrote template configuration to {}", args.output.display());
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logger(&cli.log_level, cli.log_file.as_ref())?;

    let outcome = match &cli.command {
        Command::KalmanFilter1D(args) => run_kf1d(args),
        Command::KalmanFilter2D(args) => run_kf2d(args),
        Command::Wifi(args) => run_wifi(args),
        Command::CreateConfig(args) => create_config_file(args),
    };
    if let Err(e) = &outcome {
        error!("{}", e);
    }
    outcome
}
