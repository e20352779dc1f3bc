//! harbor CLI
//!
//! Single binary for the orchestrator and its management commands:
//! - `start` runs the orchestrator in the foreground
//! - `status`, `restart`, `stop` talk to it over localhost IPC
//! - `test` runs the built-in scenarios and writes a report
//! - `classify` and `config` work without a running orchestrator

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use harbor::commands::{self, ipc_address, resolve_config_path};
use harbor::ipc::HarborClient;
use harbor::output::print_error;
use hb_core::pidfile;

#[derive(Parser)]
#[command(name = "harbor")]
#[command(author, version, about = "Single-host service orchestrator")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "HARBOR_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reclaim ports, start services in dependency order and serve
    Start {
        /// PID file location
        #[arg(long)]
        pid_file: Option<PathBuf>,
    },

    /// Show the state of every managed service
    Status {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Stop all services and the orchestrator
    Stop {
        /// PID file location
        #[arg(long)]
        pid_file: Option<PathBuf>,
    },

    /// Restart one service
    Restart {
        /// Service name
        name: String,
    },

    /// Run the built-in test scenarios and write a report
    Test {
        /// Report file (defaults to harness.reportPath)
        #[arg(short, long)]
        report: Option<PathBuf>,
    },

    /// Classify an outbound destination against the connection policy
    Classify {
        /// Host, host:port, IP address or URL
        destination: String,

        /// Ask the running orchestrator instead of reading the config file
        #[arg(long)]
        daemon: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Serve 200 OK on a health path
    #[command(hide = true)]
    StubService {
        #[arg(long)]
        port: u16,

        #[arg(long, default_value = "/health")]
        path: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Validate configuration and print the start order
    Check,
    /// Write a sample configuration
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            print_error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = resolve_config_path(cli.config.as_ref());

    match cli.command {
        Commands::Start { pid_file } => {
            let pid_path = pid_file.unwrap_or_else(pidfile::default_pid_path);
            commands::start_command(&config_path, &pid_path).await?;
        }

        Commands::Status { json } => {
            let mut client = HarborClient::new(ipc_address(&config_path));
            commands::status_command(&mut client, json).await?;
        }

        Commands::Stop { pid_file } => {
            let pid_path = pid_file.unwrap_or_else(pidfile::default_pid_path);
            let mut client = HarborClient::new(ipc_address(&config_path));
            commands::stop_command(&mut client, &pid_path).await?;
        }

        Commands::Restart { name } => {
            let mut client = HarborClient::new(ipc_address(&config_path));
            commands::restart_command(&mut client, &name).await?;
        }

        Commands::Test { report } => {
            if !commands::test_command(&config_path, report).await? {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Classify {
            destination,
            daemon,
        } => {
            commands::classify_command(&config_path, &destination, daemon).await?;
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show(&config_path)?,
            ConfigAction::Check => commands::config_check(&config_path)?,
            ConfigAction::Init { force } => commands::config_init(&config_path, force)?,
            ConfigAction::Path => commands::config_path(&config_path),
        },

        Commands::StubService { port, path } => {
            commands::stub_service_command(port, &path).await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
