//! Command-line interface for the device bridge.

mod bridge;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rrbridge_core::config::json_logging_requested;
use rrbridge_core::BridgeConfig;
use rrbridge_devices::{BridgeService, MqttConnector, V1Codec};

/// rrbridge - multi-tenant bridge between HTTP callers and cloud-connected vacuums.
#[derive(Parser, Debug)]
#[command(name = "rrbridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Start the control surface and keep sessions alive between calls.
    Serve {
        /// Host to bind to (overrides config and environment).
        #[arg(long)]
        host: Option<String>,
        /// Port to bind to (overrides config and environment).
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run one request read from stdin and print one JSON object.
    ///
    /// Actions: `command`, `get_status`.
    Bridge {
        /// The action to run.
        action: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = BridgeConfig::load(args.config.as_deref())?;

    match args.command {
        Command::Serve { host, port } => {
            let config = apply_overrides(config, host, port)?;
            run_server(config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Bridge { action } => bridge::run(action.as_deref(), &config).await,
    }
}

/// Logs always go to stderr: the one-shot bridge owns stdout.
fn init_logging(verbose: bool) {
    let default_filter = if verbose { "rrbridge=debug" } else { "rrbridge=info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    if json_logging_requested() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }
}

fn apply_overrides(
    mut config: BridgeConfig,
    host: Option<String>,
    port: Option<u16>,
) -> Result<BridgeConfig> {
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    config.validate()?;
    Ok(config)
}

pub(crate) fn build_service(config: &BridgeConfig) -> BridgeService {
    BridgeService::new(
        Arc::new(MqttConnector::new(config.mqtt.clone())),
        Arc::new(V1Codec::new()),
        config,
    )
}

async fn run_server(config: BridgeConfig) -> Result<()> {
    tracing::info!(
        "Starting rrbridge {} (command timeout {}s, status timeout {}s)",
        rrbridge_devices::VERSION,
        config.command_timeout_secs,
        config.status_timeout_secs
    );
    let service = Arc::new(build_service(&config));
    rrbridge_api::run(&config, service).await
}
