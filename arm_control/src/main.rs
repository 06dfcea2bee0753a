//! # Arm Control Binary
//!
//! Opens the configured CAN transport, runs the position control loop and
//! optionally homes every axis, then reports per-axis telemetry once per
//! second until interrupted.
//!
//! # Usage
//!
//! ```bash
//! # Simulated bus, home everything, then hold position
//! arm_control --config config/arm.toml --home-all --enable-all
//!
//! # Run for ten seconds with debug logs in JSON
//! arm_control --run-for 10 -v --json
//! ```

#![deny(warnings)]

use arm_common::config::{ArmConfig, LogLevel};
use arm_common::units::GaugeRange;
use arm_control::ArmController;
use arm_control::command::homing::HomingOutcome;
use arm_control::state::telemetry::AxisTelemetry;
use arm_hal::TransportRegistry;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Status bar ranges for the periodic report.
const TEMPERATURE_GAUGE: GaugeRange = GaugeRange::new(0.0, 100.0);
const INPUT_CURRENT_GAUGE: GaugeRange = GaugeRange::new(-10.0, 10.0);
const MOTOR_CURRENT_GAUGE: GaugeRange = GaugeRange::new(-50.0, 50.0);

/// FET or motor temperature that triggers a warning [°C].
const TEMPERATURE_WARNING_C: f64 = 60.0;

/// Arm Control - VESC CAN multi-axis arm controller
#[derive(Parser, Debug)]
#[command(name = "arm_control")]
#[command(version)]
#[command(about = "Multi-axis arm controller over VESC CAN with hard-stop homing")]
#[command(long_about = None)]
struct Args {
    /// Path to the arm configuration file.
    #[arg(short, long, default_value = "config/arm.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,

    /// Home every axis after start-up
    #[arg(long)]
    home_all: bool,

    /// Enable position control on every axis
    #[arg(long)]
    enable_all: bool,

    /// Exit after this many seconds instead of waiting for Ctrl-C
    #[arg(long, value_name = "SECS")]
    run_for: Option<f64>,
}

fn main() {
    if let Err(e) = run() {
        // No-op if tracing is already installed.
        let _ = tracing_subscriber::fmt().try_init();
        error!("Arm control failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = ArmConfig::load_validated(&args.config)?;

    setup_tracing(&args, config.shared.log_level);
    info!(
        "Arm control v{} starting: service '{}', config {}",
        env!("CARGO_PKG_VERSION"),
        config.shared.service_name,
        args.config.display()
    );

    let registry = TransportRegistry::with_builtin();
    info!("Available transports: {:?}", registry.list_drivers());
    let mut transport = registry.create_transport(&config.bus.driver)?;
    transport.open(&config.bus, &config.axes)?;
    let transport: Arc<dyn arm_common::can::transport::CanTransport> = Arc::from(transport);

    let controller = Arc::new(ArmController::new(&config, Arc::clone(&transport)));
    transport.set_receiver(controller.frame_handler());

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        let controller = Arc::clone(&controller);
        ctrlc::set_handler(move || {
            info!("Received shutdown signal");
            running.store(false, Ordering::SeqCst);
            controller.cancel_homing();
        })?;
    }

    controller.start()?;

    if args.home_all {
        for (node_id, result) in controller.home_all(None) {
            match result {
                Ok(HomingOutcome::Homed { .. }) => {}
                Ok(other) => warn!("Axis {} not homed: {:?}", node_id, other),
                Err(e) => warn!("Axis {} not homed: {}", node_id, e),
            }
        }
    }

    if args.enable_all {
        for node_id in controller.node_ids() {
            controller.set_enabled(node_id, true)?;
        }
        info!("Position control enabled on all axes");
    }

    let deadline = args
        .run_for
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
        .map(|d| Instant::now() + d);
    while running.load(Ordering::SeqCst) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            info!("Run time elapsed");
            break;
        }
        report(&controller);
        std::thread::sleep(Duration::from_secs(1));
    }

    controller.stop();
    if let Err(e) = transport.close() {
        warn!("Transport close failed: {}", e);
    }
    if let Some(stats) = transport.stats() {
        info!(
            "Bus stats: {} sent, {} received, {} send errors",
            stats.frames_sent, stats.frames_received, stats.send_errors
        );
    }
    info!("Arm control shutdown complete");
    Ok(())
}

/// One status line per axis.
fn report(controller: &ArmController) {
    for node_id in controller.node_ids() {
        let Some(t) = controller.get_telemetry(node_id) else {
            info!("Axis {}: no telemetry yet", node_id);
            continue;
        };
        if t.offline {
            info!("Axis {}: offline", node_id);
            continue;
        }
        let homed = controller
            .axis_status(node_id)
            .is_some_and(|s| s.homed);
        info!(
            "Axis {}: pos {} deg ({:+.3} turns), {} rpm, I_motor {} A ({}), I_in {} A ({}), FET {} C ({}), {} V, homed={}",
            node_id,
            fmt_opt(t.pos_deg, 2),
            t.pos_unwrapped_turns,
            fmt_opt(t.rpm, 2),
            fmt_opt(t.current_motor, 3),
            gauge(MOTOR_CURRENT_GAUGE, t.current_motor),
            fmt_opt(t.current_in, 3),
            gauge(INPUT_CURRENT_GAUGE, t.current_in),
            fmt_opt(t.temp_fet, 1),
            gauge(TEMPERATURE_GAUGE, t.temp_fet),
            fmt_opt(t.voltage_in, 1),
            homed
        );
        check_temperatures(&t);
    }
}

fn check_temperatures(t: &AxisTelemetry) {
    for (name, value) in [("FET", t.temp_fet), ("motor", t.temp_motor)] {
        if let Some(c) = value.filter(|c| *c >= TEMPERATURE_WARNING_C) {
            warn!("Axis {}: {} temperature {:.1} C", t.node_id, name, c);
        }
    }
}

fn fmt_opt(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) => format!("{v:.precision$}"),
        None => "-".to_string(),
    }
}

fn gauge(range: GaugeRange, value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.0}%", range.fraction(v) * 100.0),
        None => "-".to_string(),
    }
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, configured: LogLevel) {
    let mut filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(configured.as_directive()));
    if args.verbose {
        filter = filter.add_directive(Level::DEBUG.into());
    }

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
