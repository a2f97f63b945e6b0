//! vlink - Command-line tool for connected-vehicle accounts
//!
//! Shows vehicle status and sends remote commands through the vlink client,
//! waiting until the vehicle reports each command's effect.

mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vlink_client::{FileStore, VehicleClient};
use vlink_core::{Brand, ClimateOptions, Command, VerificationMethod};

use crate::config::{AccountArgs, Config};
use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "vlink")]
#[command(author, version, about = "Connected vehicle CLI")]
#[command(propagate_version = true)]
struct Cli {
    /// Vendor gateway URL
    #[arg(short, long, env = "VLINK_SERVER")]
    server: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "VLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Account username
    #[arg(short, long, env = "VLINK_USERNAME")]
    username: Option<String>,

    /// Account password
    #[arg(long, env = "VLINK_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Remote command PIN
    #[arg(long, env = "VLINK_PIN", hide_env_values = true)]
    pin: Option<String>,

    /// Vehicle brand
    #[arg(short, long, value_enum)]
    brand: Option<BrandArg>,

    /// Vendor region
    #[arg(long)]
    region: Option<String>,

    /// Directory for tokens and vehicle records
    #[arg(long, env = "VLINK_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Verification channel if the vendor asks to verify this device
    #[arg(long, value_enum)]
    verify_by: Option<MethodArg>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print cache statistics when done
    #[arg(long)]
    stats: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in, verifying this device if required
    Login,

    /// Forget the session and device verification
    Logout,

    /// List vehicles on the account
    Vehicles,

    /// Show current vehicle status
    Status {
        /// Vehicle VIN or nickname
        #[arg(long)]
        vehicle: Option<String>,
    },

    /// Lock the doors
    Lock {
        #[command(flatten)]
        target: Target,
    },

    /// Unlock the doors
    Unlock {
        #[command(flatten)]
        target: Target,
    },

    /// Start or stop climate control
    Climate {
        #[command(subcommand)]
        action: ClimateAction,
    },

    /// Start or stop charging, or set charge limits
    Charge {
        #[command(subcommand)]
        action: ChargeAction,
    },

    /// Show recent trips
    Trips {
        /// Vehicle VIN or nickname
        #[arg(long)]
        vehicle: Option<String>,
    },
}

/// Vehicle selection and wait behavior shared by remote commands
#[derive(clap::Args)]
struct Target {
    /// Vehicle VIN or nickname
    #[arg(long)]
    vehicle: Option<String>,

    /// Return once the command is accepted, without waiting for the vehicle
    #[arg(long)]
    no_wait: bool,
}

#[derive(Subcommand)]
enum ClimateAction {
    /// Start climate control
    Start {
        #[command(flatten)]
        target: Target,

        /// Target cabin temperature in °C
        #[arg(long, default_value = "21")]
        temp: f32,

        /// Enable defrost
        #[arg(long)]
        defrost: bool,

        /// Run time in minutes
        #[arg(long, default_value = "10")]
        minutes: u8,
    },

    /// Stop climate control
    Stop {
        #[command(flatten)]
        target: Target,
    },
}

#[derive(Subcommand)]
enum ChargeAction {
    /// Start charging
    Start {
        #[command(flatten)]
        target: Target,
    },

    /// Stop charging
    Stop {
        #[command(flatten)]
        target: Target,
    },

    /// Set AC and DC charge limits
    Limits {
        #[command(flatten)]
        target: Target,

        /// AC limit in percent
        #[arg(long, value_parser = clap::value_parser!(u8).range(50..=100))]
        ac: u8,

        /// DC limit in percent
        #[arg(long, value_parser = clap::value_parser!(u8).range(50..=100))]
        dc: u8,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BrandArg {
    Hyundai,
    Kia,
    Genesis,
}

impl From<BrandArg> for Brand {
    fn from(brand: BrandArg) -> Self {
        match brand {
            BrandArg::Hyundai => Brand::Hyundai,
            BrandArg::Kia => Brand::Kia,
            BrandArg::Genesis => Brand::Genesis,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MethodArg {
    Sms,
    Email,
}

impl From<MethodArg> for VerificationMethod {
    fn from(method: MethodArg) -> Self {
        match method {
            MethodArg::Sms => VerificationMethod::Sms,
            MethodArg::Email => VerificationMethod::Email,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load config file
    let config = if let Some(config_path) = &cli.config {
        Config::load_from(config_path)?
    } else {
        Config::load().unwrap_or_default()
    };

    // Merge CLI args with config
    let args = AccountArgs {
        server: cli.server.clone(),
        username: cli.username.clone(),
        password: cli.password.clone(),
        pin: cli.pin.clone(),
        brand: cli.brand.map(Brand::from),
        region: cli.region.clone(),
        data_dir: cli.data_dir.clone(),
    };
    let merged = config.merge_with_args(args, cli.no_color)?;

    // Create output context
    let ctx = OutputContext::new(cli.output, merged.no_color, cli.quiet);

    // First Ctrl+C stops a running wait, a second one exits
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    ctrlc::set_handler(move || {
        if on_interrupt.is_cancelled() {
            std::process::exit(130);
        }
        on_interrupt.cancel();
    })
    .context("Failed to install Ctrl+C handler")?;

    let store = FileStore::open(merged.data_dir.clone())
        .await
        .with_context(|| format!("Failed to open data directory: {}", merged.data_dir.display()))?;
    debug!(data_dir = %merged.data_dir.display(), brand = %merged.client.account.brand, "Account store opened");
    let client = VehicleClient::with_http(&merged.client, Arc::new(store));

    if matches!(cli.command, Commands::Logout) {
        return commands::sign_out(&client, &ctx).await;
    }

    commands::login(&client, cli.verify_by.map(VerificationMethod::from), &ctx).await?;

    // Execute command
    match &cli.command {
        Commands::Login => ctx.success("Logged in"),

        Commands::Logout => {}

        Commands::Vehicles => commands::vehicles(&client, &ctx).await?,

        Commands::Status { vehicle } => {
            let vehicle = commands::resolve_vehicle(&client, vehicle.as_deref()).await?;
            commands::status(&client, &vehicle, &ctx).await?;
        }

        Commands::Trips { vehicle } => {
            let vehicle = commands::resolve_vehicle(&client, vehicle.as_deref()).await?;
            commands::trips(&client, &vehicle, &ctx).await?;
        }

        Commands::Lock { target } => {
            run_command(&client, target, Command::Lock, &cancel, &ctx).await?;
        }

        Commands::Unlock { target } => {
            run_command(&client, target, Command::Unlock, &cancel, &ctx).await?;
        }

        Commands::Climate { action } => {
            let (target, command) = match action {
                ClimateAction::Start {
                    target,
                    temp,
                    defrost,
                    minutes,
                } => (
                    target,
                    Command::StartClimate(ClimateOptions {
                        target_temp_c: *temp,
                        defrost: *defrost,
                        duration_minutes: *minutes,
                    }),
                ),
                ClimateAction::Stop { target } => (target, Command::StopClimate),
            };
            run_command(&client, target, command, &cancel, &ctx).await?;
        }

        Commands::Charge { action } => {
            let (target, command) = match action {
                ChargeAction::Start { target } => (target, Command::StartCharge),
                ChargeAction::Stop { target } => (target, Command::StopCharge),
                ChargeAction::Limits { target, ac, dc } => (
                    target,
                    Command::SetChargeLimits {
                        ac_percent: *ac,
                        dc_percent: *dc,
                    },
                ),
            };
            run_command(&client, target, command, &cancel, &ctx).await?;
        }
    }

    if cli.stats {
        let stats = client.cache_stats();
        eprintln!(
            "cache: {} entries ({} valid, {} expired), {} in flight",
            stats.total_entries, stats.valid_entries, stats.expired_entries, stats.in_flight
        );
    }

    Ok(())
}

async fn run_command(
    client: &VehicleClient,
    target: &Target,
    command: Command,
    cancel: &CancellationToken,
    ctx: &OutputContext,
) -> Result<()> {
    let vehicle = commands::resolve_vehicle(client, target.vehicle.as_deref()).await?;
    commands::control(client, &vehicle, &command, target.no_wait, cancel, ctx).await
}
