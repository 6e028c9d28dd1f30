//! Reprise CLI - Playback resilience decision explorer
//!
//! Features:
//! - Quality selection and entitlement checks
//! - Recovery decisions for player error codes
//! - Buffer profiles per network class
//! - Cooldown scenario replay
//! - Configuration inspection

use clap::{Args, Parser, Subcommand, ValueEnum};
use reprise_core::{Entitlement, NetworkClass, QualityId, RecoveryBudget, RecoveryConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use output::OutputFormat;

/// Reprise CLI - Playback resilience toolkit
#[derive(Parser)]
#[command(name = "reprise")]
#[command(version)]
#[command(about = "Inspect quality, recovery, cooldown and buffer decisions", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json, table)
    #[arg(short, long, default_value = "text", global = true)]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct EntitlementArgs {
    /// User is logged in
    #[arg(long)]
    logged_in: bool,

    /// User has a VIP subscription (implies logged in)
    #[arg(long)]
    vip: bool,
}

impl From<EntitlementArgs> for Entitlement {
    fn from(args: EntitlementArgs) -> Self {
        Entitlement {
            logged_in: args.logged_in || args.vip,
            vip: args.vip,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum NetworkArg {
    /// Wi-Fi or Ethernet
    Unmetered,
    /// Cellular
    Metered,
}

impl From<NetworkArg> for NetworkClass {
    fn from(arg: NetworkArg) -> Self {
        match arg {
            NetworkArg::Unmetered => NetworkClass::Unmetered,
            NetworkArg::Metered => NetworkClass::Metered,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a target quality against available quality ids
    Select {
        /// Requested quality id
        target: QualityId,

        /// Available quality ids (comma separated)
        #[arg(short, long, value_delimiter = ',', required = true)]
        available: Vec<QualityId>,
    },

    /// Check whether a quality tier is permitted
    Permission {
        /// Quality id
        quality: QualityId,

        #[command(flatten)]
        entitlement: EntitlementArgs,
    },

    /// Highest available quality the user may play
    MaxQuality {
        /// Available quality ids (comma separated)
        #[arg(short, long, value_delimiter = ',')]
        available: Vec<QualityId>,

        #[command(flatten)]
        entitlement: EntitlementArgs,
    },

    /// Decide the recovery action for a player error
    Recover {
        /// Player error code (e.g. 2001)
        code: i32,

        /// Error message
        #[arg(short, long)]
        message: Option<String>,

        /// Cause type name
        #[arg(long)]
        cause: Option<String>,

        /// Alternate CDN endpoints are available
        #[arg(long)]
        cdn_alternatives: bool,

        /// Retries already issued
        #[arg(long, default_value = "0")]
        retries: u32,

        /// CDN switches already issued
        #[arg(long, default_value = "0")]
        cdn_switches: u32,

        /// Retry budget
        #[arg(long)]
        max_retries: Option<u32>,

        /// CDN switch budget
        #[arg(long)]
        max_cdn_switches: Option<u32>,
    },

    /// Show buffer profiles
    Buffer {
        /// Network class (both when omitted)
        #[arg(short, long, value_enum)]
        network: Option<NetworkArg>,

        /// Engine configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Replay a cooldown scenario file
    Simulate {
        /// Scenario JSON file
        scenario: PathBuf,
    },

    /// Print the default or a loaded engine configuration
    Config {
        /// Engine configuration file
        path: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    reprise_core::init();
    let format = OutputFormat::from(cli.format.as_str());

    match cli.command {
        Commands::Select { target, available } => {
            commands::select(target, &available, format)?;
        }
        Commands::Permission { quality, entitlement } => {
            commands::permission(quality, entitlement.into(), format)?;
        }
        Commands::MaxQuality { available, entitlement } => {
            commands::max_quality(available, entitlement.into(), format)?;
        }
        Commands::Recover {
            code,
            message,
            cause,
            cdn_alternatives,
            retries,
            cdn_switches,
            max_retries,
            max_cdn_switches,
        } => {
            let defaults = RecoveryConfig::default();
            let budget = RecoveryBudget {
                retry_count: retries,
                max_retries: max_retries.unwrap_or(defaults.max_retries),
                cdn_switch_count: cdn_switches,
                max_cdn_switches: max_cdn_switches.unwrap_or(defaults.max_cdn_switches),
            };
            commands::recover(
                commands::RecoverRequest {
                    code,
                    message,
                    cause_type: cause,
                    has_cdn_alternatives: cdn_alternatives,
                    budget,
                },
                format,
            )?;
        }
        Commands::Buffer { network, config } => {
            commands::buffer(network.map(Into::into), config.as_deref(), format)?;
        }
        Commands::Simulate { scenario } => {
            commands::simulate(&scenario, format)?;
        }
        Commands::Config { path } => {
            commands::config(path.as_deref(), format)?;
        }
    }

    Ok(())
}
