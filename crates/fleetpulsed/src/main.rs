//! fleetpulsed — the fleetpulse daemon.
//!
//! Single binary that wires the health-check subsystem together:
//! - State store (redb) holding devices and check history
//! - HTTP probe + device checker
//! - Check-cycle runner
//! - Health scheduler driving the cycle on a fixed interval
//!
//! # Usage
//!
//! ```text
//! fleetpulsed --config /etc/fleetpulse.toml init
//! fleetpulsed --config /etc/fleetpulse.toml run
//! fleetpulsed device add rpi-kitchen --ip 192.168.1.20 --port 8000
//! fleetpulsed --data-dir ./data status --limit 5
//! fleetpulsed check-once
//! ```
//!
//! `device`, `status` and `check-once` may run while a `run` daemon is
//! using the same store file.

mod devices;
mod inspect;
mod registry;
mod run_mode;
mod settings;

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use settings::Settings;

#[derive(Parser)]
#[command(name = "fleetpulsed", about = "fleetpulse device health daemon")]
struct Cli {
    /// Path to fleetpulse.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Command,
}

/// Flags that take precedence over the config file.
#[derive(Args, Debug, Default, Clone)]
struct Overrides {
    /// Data directory; the store lives at `<dir>/fleetpulse.redb`.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Time between check cycles ("60s", "500ms", "2m").
    #[arg(long, global = true, value_parser = parse_duration_arg)]
    interval: Option<Duration>,

    /// Cap for a single probe attempt.
    #[arg(long, global = true, value_parser = parse_duration_arg)]
    timeout: Option<Duration>,

    /// Probe attempts per device per cycle.
    #[arg(long, global = true)]
    max_attempts: Option<u32>,
}

#[derive(Subcommand)]
enum Command {
    /// Run health checks on the configured interval until Ctrl-C.
    Run,

    /// Print every device with its status and recent checks.
    Status {
        /// Check records shown per device.
        #[arg(long, default_value = "5")]
        limit: usize,

        /// Print records as JSON lines.
        #[arg(long)]
        json: bool,
    },

    /// Run a single check cycle and print the report.
    CheckOnce,

    /// Manage the device registry.
    Device {
        #[command(subcommand)]
        action: DeviceAction,
    },

    /// Write a fleetpulse.toml with every default spelled out.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum DeviceAction {
    /// Register a device (or update its address).
    Add {
        id: String,

        #[arg(long)]
        ip: IpAddr,

        #[arg(long, default_value = "80")]
        port: u16,

        /// Display name; defaults to the id.
        #[arg(long)]
        name: Option<String>,

        #[arg(long, default_value = "0")]
        owner_id: u64,
    },

    /// Remove a device. Its check history is kept.
    Remove { id: String },

    /// List registered devices.
    List,
}

const DEFAULT_CONFIG_FILE: &str = "fleetpulse.toml";

fn parse_duration_arg(s: &str) -> Result<Duration, String> {
    fleetpulse_core::parse_duration(s).ok_or_else(|| format!("invalid duration: {s:?}"))
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(settings::DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    // `init` creates the config file, so it runs before one is loaded.
    if let Command::Init { force } = cli.command {
        let path = cli
            .config
            .as_deref()
            .unwrap_or(Path::new(DEFAULT_CONFIG_FILE));
        return settings::write_scaffold(path, &cli.overrides, force);
    }

    let settings = Settings::load(cli.config.as_deref(), &cli.overrides)?;

    match cli.command {
        Command::Run => run_mode::run_daemon(settings).await,
        Command::Status { limit, json } => inspect::print_status(&settings, limit, json).await,
        Command::CheckOnce => inspect::check_once(&settings).await,
        Command::Device { action } => run_device(&settings, action).await,
        Command::Init { .. } => Ok(()),
    }
}

async fn run_device(settings: &Settings, action: DeviceAction) -> anyhow::Result<()> {
    let shared = inspect::shared_store(settings).await?;
    match action {
        DeviceAction::Add {
            id,
            ip,
            port,
            name,
            owner_id,
        } => {
            let device = devices::add_device(
                &shared,
                devices::NewDevice {
                    id,
                    name,
                    ip,
                    port,
                    owner_id,
                },
            )
            .await?;
            println!("{}  {}  {}", device.id, device.address(), device.status);
        }
        DeviceAction::Remove { id } => {
            if !devices::remove_device(&shared, &id).await? {
                anyhow::bail!("device {id} not found");
            }
        }
        DeviceAction::List => {
            for device in devices::list_devices(&shared).await? {
                println!(
                    "{}  {}  {}  {}",
                    device.id,
                    device.name,
                    device.address(),
                    device.status
                );
            }
        }
    }
    Ok(())
}
