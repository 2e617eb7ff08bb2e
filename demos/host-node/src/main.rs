//! A reservoir fill-level node running on an operating system.
//!
//! The level comes from a simulated reservoir. Firmware updates are
//! simulated by typing `update-start`, `update-ok` or `update-fail` on the
//! standard input.
//!
//! A controlled restart terminates the process with exit status 3, so that
//! a service manager can start it again.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use clap::Parser;

use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use reservoir::failsafe::RestartCause;
use reservoir::node::{Node, Peripherals, TickOutcome};

use reservoir_os::boot;
use reservoir_os::clock::{LocalWallClock, SystemClock, ThreadDelay};
use reservoir_os::config::HostConfig;
use reservoir_os::error::Result;
use reservoir_os::mqtt::MqttSession;
use reservoir_os::network::RouteProbe;
use reservoir_os::sensor::SimulatedSensor;
use reservoir_os::store::FileStore;
use reservoir_os::update::{self, UpdateNotifier};

// Exit status asking the service manager for a restart.
const RESTART_EXIT_CODE: u8 = 3;

// Time given to queued messages to reach the broker before exiting.
const FLUSH_TIME: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file.
    #[arg(short, long, default_value = "node.toml")]
    config: PathBuf,

    /// File storing the persistent state of the node.
    #[arg(short, long, default_value = "node-state.json")]
    state: PathBuf,

    /// Scheduling tick, in milliseconds.
    #[arg(long, default_value_t = 100)]
    tick_ms: u64,

    /// Level change of the simulated reservoir, in millimeters per second.
    #[arg(long, default_value_t = 2.)]
    simulate_rate: f32,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(true))
        .init();

    let cli = Cli::parse();

    match run(&cli) {
        Ok(cause) => {
            info!("Exiting for a controlled restart: {cause}");
            ExitCode::from(RESTART_EXIT_CODE)
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<RestartCause> {
    let config = HostConfig::load(&cli.config)?;

    let mut store = FileStore::open(&cli.state)?;
    info!("Persistent state kept in {}", store.path().display());
    let reset_reason = boot::boot(&mut store);

    let (notifier, updates) = update::channel();
    spawn_update_console(notifier);

    let clock = SystemClock::new();
    let peripherals = Peripherals {
        network: RouteProbe::new(&config.broker.host, config.broker.port),
        bus: MqttSession::new(config.broker.clone()),
        sensor: SimulatedSensor::new(config.node.calibration, clock, cli.simulate_rate),
        store,
        clock,
        wall_clock: LocalWallClock,
        updates,
    };

    let mut node = Node::new(
        &config.node,
        config.broker.credentials(),
        reset_reason,
        peripherals,
    )?;

    node.start(&mut ThreadDelay);

    let tick = Duration::from_millis(cli.tick_ms);
    loop {
        if let TickOutcome::Restart(cause) = node.tick() {
            if let Some(entry) = node.fault_log().last() {
                info!("Last fault: {entry}");
            }
            let peripherals = node.peripherals_mut();
            peripherals.bus.flush(FLUSH_TIME);
            boot::mark_restart(&mut peripherals.store, cause)?;
            return Ok(cause);
        }
        thread::sleep(tick);
    }
}

fn spawn_update_console(notifier: UpdateNotifier) {
    let _ = thread::spawn(move || {
        for line in io::stdin().lines() {
            let Ok(line) = line else {
                break;
            };

            match line.trim() {
                "update-start" => notifier.started(),
                "update-ok" => notifier.ended(true),
                "update-fail" => notifier.ended(false),
                "" => {}
                command => warn!("Unknown command `{command}`"),
            }
        }
    });
}
