//! looppace entry point.
//!
//! Paces a demonstration control loop at a fixed frequency while a
//! background recorder samples its signals to disk. Real-time scheduling,
//! pacing, and recording are all driven from the loaded configuration.

mod signals;

use anyhow::{Context, Result};
use clap::Parser;
use pace_common::config::AppConfig;
use pace_runtime::realtime::init_realtime;
use pace_runtime::{ChannelSlot, LoopPacer, SignalRecorder};
use std::f64::consts::TAU;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::signals::SignalHandler;

/// looppace command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "looppace",
    about = "Fixed-frequency loop pacing with background signal recording",
    version,
    long_about = None
)]
struct Args {
    /// Path to a configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Recording destination (overrides config file).
    #[arg(long, short = 'o', value_name = "FILE")]
    destination: Option<PathBuf>,

    /// Loop frequency in Hz (overrides config file).
    #[arg(long, short = 'f')]
    frequency: Option<f64>,

    /// Recording cadence in Hz (overrides config file).
    #[arg(long)]
    cadence: Option<f64>,

    /// Maximum cycles to run (0 = until shutdown).
    #[arg(long, default_value = "0")]
    max_cycles: u64,

    /// Wall-clock run limit, e.g. "30s" or "5m" (unset = until shutdown).
    #[arg(long, value_parser = humantime::parse_duration)]
    duration: Option<Duration>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting looppace");

    let mut config = load_config(&args)?;

    // Override with command-line arguments
    if let Some(destination) = &args.destination {
        config.recorder.destination = destination.clone();
    }
    if let Some(frequency) = args.frequency {
        config.pacer.frequency_hz = frequency;
    }
    if let Some(cadence) = args.cadence {
        config.recorder.cadence_hz = cadence;
    }

    info!(
        frequency_hz = config.pacer.frequency_hz,
        cadence_hz = config.recorder.cadence_hz,
        destination = %config.recorder.destination.display(),
        "Configuration loaded"
    );

    let signal_handler = SignalHandler::install();

    init_realtime(&config.realtime).context("Failed to apply real-time configuration")?;

    run_demo(&config, signal_handler, args.max_cycles, args.duration)
}

/// Initialize logging with the specified log level.
fn init_logging(level: &str) {
    let filter = format!("looppace={level},pace_runtime={level},pace_common={level}");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `LOOPPACE_CONFIG_PATH` environment variable
/// 3. `config/default.toml` (local development)
/// 4. Built-in defaults
fn load_config(args: &Args) -> Result<AppConfig> {
    if let Some(config_path) = &args.config {
        info!(?config_path, "Loading config from command-line argument");
        return AppConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {config_path:?}"));
    }

    if let Ok(env_path) = std::env::var("LOOPPACE_CONFIG_PATH") {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "Loading config from LOOPPACE_CONFIG_PATH");
            return AppConfig::from_file(&config_path).with_context(|| {
                format!("Failed to load config from LOOPPACE_CONFIG_PATH={env_path:?}")
            });
        }
        warn!(
            path = %env_path,
            "LOOPPACE_CONFIG_PATH set but file does not exist, checking other locations"
        );
    }

    let local_path = PathBuf::from("config/default.toml");
    if local_path.exists() {
        info!(?local_path, "Loading config from local path");
        return AppConfig::from_file(&local_path)
            .with_context(|| format!("Failed to load config from {local_path:?}"));
    }

    info!("No config file found, using built-in defaults");
    Ok(AppConfig::default())
}

/// Paces a small synthetic plant and records its signals until shutdown,
/// the cycle limit, or the run-duration limit.
fn run_demo(
    config: &AppConfig,
    signal_handler: SignalHandler,
    max_cycles: u64,
    duration: Option<Duration>,
) -> Result<()> {
    // Recorded variables. Declared before the recorder so their addresses
    // outlive its worker thread.
    let mut wave = [0.0f64; 3];
    let mut setpoint = 0.0f64;
    let mut iterations = 0i64;
    let mut saturated = false;

    let mut recorder = SignalRecorder::with_config(&config.recorder);
    // SAFETY: the variables above are dropped after `recorder`, whose drop
    // joins the worker thread sampling them.
    unsafe {
        recorder.add_channel(ChannelSlot::vector(&wave), "wave");
        recorder.add_channel(ChannelSlot::real(&setpoint), "setpoint");
        recorder.add_channel(ChannelSlot::int(&iterations), "iterations");
        recorder.add_channel(ChannelSlot::boolean(&saturated), "saturated");
    }
    recorder.start(config.recorder.cadence_hz)?;

    let mut pacer = LoopPacer::from_config(&config.pacer)?;
    info!(
        frequency_hz = pacer.frequency_hz(),
        interval_us = pacer.interval().as_micros(),
        "Entering paced loop"
    );

    let mut flagged_cycles = 0u64;
    loop {
        if !pacer.wait_for_next_tick() {
            flagged_cycles += 1;
        }

        // Synthetic plant: three phase-shifted waves riding a slow setpoint.
        let t = pacer.elapsed_sim_time().as_secs_f64();
        setpoint = (0.5 * t).sin();
        wave[0] = setpoint + (TAU * t).sin();
        wave[1] = setpoint + (TAU * t + TAU / 3.0).sin();
        wave[2] = setpoint + (TAU * t + 2.0 * TAU / 3.0).sin();
        saturated = wave[0].abs() > 1.8;
        iterations += 1;

        if signal_handler.shutdown_requested() {
            info!("Shutdown signal received, leaving paced loop");
            break;
        }
        if max_cycles > 0 && pacer.elapsed_cycles() >= max_cycles {
            info!(cycles = pacer.elapsed_cycles(), "Maximum cycle count reached");
            break;
        }
        if let Some(limit) = duration {
            if pacer.elapsed_time() >= limit {
                info!(
                    elapsed_secs = pacer.elapsed_time().as_secs_f64(),
                    "Run duration reached"
                );
                break;
            }
        }

        // Periodic status logging (every 10000 cycles)
        if pacer.elapsed_cycles() % 10_000 == 0 {
            let overtime = pacer.overtime();
            info!(
                cycles = pacer.elapsed_cycles(),
                late = overtime.as_ref().map_or(0, |o| o.late_cycles),
                max_overtime_us = overtime.as_ref().map_or(0, |o| o.max_overtime_ns / 1_000),
                "Periodic status"
            );
        }
    }

    recorder.stop();
    pacer.stop();

    let summary = pacer.summary();
    info!(
        cycles = summary.cycles,
        achieved_hz = summary.achieved_hz,
        flagged_cycles,
        "Paced loop finished"
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("Failed to render run summary")?
    );

    Ok(())
}
