//! Vehicle Telemetry CLI Application
//!
//! Command-line front end for the vehicle-telemetry library:
//! - `run` starts the telemetry service against replayed bus traffic and
//!   file-backed battery readings, printing every change event
//! - `decode` decodes a candump log offline

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use vehicle_telemetry::{
    CandumpDirectoryOpener, CandumpParser, DecodedEvent, FrameDecoder, TelemetryService,
};

mod config;
mod output;
mod sensor;

use config::{AppConfig, OutputFormat, CAN_IFACE_ENV};
use output::StdoutPublisher;
use sensor::FileBatterySensor;

/// Vehicle Telemetry - speed, gear and battery state from a CAN bus
#[derive(Parser, Debug)]
#[command(name = "vtelemetry")]
#[command(about = "Vehicle telemetry core: CAN speed/gear decoding and battery estimation", long_about = None)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the telemetry service and print change events
    Run {
        /// Bus channel to try first (after $CAN_IFACE)
        #[arg(long, value_name = "CHANNEL")]
        can: Option<String>,

        /// Directory holding <channel>.log candump files
        #[arg(long, value_name = "DIR")]
        replay_dir: Option<PathBuf>,

        /// Replay as fast as possible instead of at logged speed
        #[arg(long)]
        fast: bool,

        /// Battery voltage file (sysfs-style, µV by default)
        #[arg(long, value_name = "FILE")]
        voltage_file: Option<PathBuf>,

        /// Stop after this many seconds (default: run until killed)
        #[arg(short, long, value_name = "SECS")]
        duration: Option<u64>,

        /// Output format for events
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Decode a candump log file offline
    Decode {
        /// Path to candump log file
        #[arg(value_name = "FILE")]
        log: PathBuf,

        /// Maximum number of events to print
        #[arg(long, value_name = "COUNT")]
        max_events: Option<usize>,
    },
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("Vehicle Telemetry CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using telemetry library v{}", vehicle_telemetry::VERSION);

    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };

    match args.command {
        Command::Run {
            can,
            replay_dir,
            fast,
            voltage_file,
            duration,
            format,
        } => {
            if let Some(dir) = replay_dir {
                config.replay.dir = dir;
            }
            if fast {
                config.replay.realtime = false;
            }
            if let Some(path) = voltage_file {
                config.sensor.voltage_path = Some(path);
            }
            if let Some(format) = format {
                config.output.format = format;
            }
            let env_iface = std::env::var(CAN_IFACE_ENV).ok();
            run_mode(&config, env_iface, can, duration.map(Duration::from_secs))
        }
        Command::Decode { log, max_events } => decode_mode(&config, &log, max_events),
    }
}

/// Run mode - start the service, stream events, shut down cleanly
fn run_mode(
    config: &AppConfig,
    env_iface: Option<String>,
    can: Option<String>,
    duration: Option<Duration>,
) -> Result<()> {
    let format = config.output.format;
    let opener = CandumpDirectoryOpener::new(&config.replay.dir, config.replay.realtime);

    let mut builder = TelemetryService::builder(config.telemetry.clone())
        .with_acquisition(config.acquisition(env_iface, can))
        .with_publisher(Arc::new(StdoutPublisher::new(format)));

    match FileBatterySensor::from_config(&config.sensor) {
        Some(sensor) => builder = builder.with_battery_sensor(Box::new(sensor)),
        None => log::info!("No battery voltage file configured"),
    }

    let mut service = builder
        .start(&opener)
        .context("Failed to start telemetry service")?;

    log::info!("Connected on {}", service.channel());

    let started = Instant::now();
    while service.is_connected() {
        if duration.is_some_and(|d| started.elapsed() >= d) {
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }

    service.shutdown();
    print_summary(&service, format);
    Ok(())
}

fn print_summary(service: &TelemetryService, format: OutputFormat) {
    let state = service.snapshot();
    log::info!(
        "Final state: speed {:.1}, battery {:.1}%, gear {}, turn signal {}",
        state.speed,
        state.battery_percent,
        state.gear,
        state.turn_signal
    );
    if let Some(reading) = service.latest_battery() {
        log::info!(
            "Last battery reading: {:.2}V ({:?}, trend {:?}, {:?})",
            reading.voltage_raw,
            reading.status,
            reading.trend,
            reading.stability
        );
    }
    output::print_stats(&service.stats(), format);
}

/// Decode mode - parse a candump log and print recognized measurements
fn decode_mode(config: &AppConfig, path: &Path, max_events: Option<usize>) -> Result<()> {
    let frames = CandumpParser::parse(path).with_context(|| format!("Failed to open log: {:?}", path))?;
    let decoder = FrameDecoder::new();
    let speed = &config.telemetry.speed;
    let limit = max_events.unwrap_or(usize::MAX);

    let mut printed = 0;
    let mut errors = 0;
    for result in decoder.decode_frames(frames) {
        if printed >= limit {
            break;
        }
        match result {
            Ok(DecodedEvent::Speed(m)) => {
                println!("speed  {:>8.2} {} (raw {})", m.value / speed.scale_divisor, speed.units, m.value);
                printed += 1;
            }
            Ok(DecodedEvent::Gear(m)) => {
                println!("gear   {:?}", m.code);
                printed += 1;
            }
            Err(e) => {
                log::warn!("Skipping bad frame: {}", e);
                errors += 1;
            }
        }
    }

    log::info!("Decoded {} events ({} bad lines) from {:?}", printed, errors, path);
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr)
        .init();
}
