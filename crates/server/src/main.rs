//! `reefd`, the Reef storage daemon.

use clap::Parser;
use reef_core::Configuration;
use reef_server::{Server, ServerBackends};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "reefd", about = "Reef storage server")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:4711")]
    listen: String,

    /// Configuration file; defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match Configuration::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!("failed to load {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => Configuration::default(),
    };

    let port = args
        .listen
        .rsplit_once(':')
        .and_then(|(_, port)| port.parse::<u16>().ok())
        .unwrap_or(0);

    let backends = match ServerBackends::from_config(&config, port) {
        Ok(backends) => backends,
        Err(e) => {
            error!("failed to open backends: {e}");
            return ExitCode::FAILURE;
        }
    };

    let server = match Server::bind(&args.listen, backends) {
        Ok(server) => server,
        Err(e) => {
            error!("failed to bind {}: {e}", args.listen);
            return ExitCode::FAILURE;
        }
    };

    match server.local_addr() {
        Ok(addr) => info!("listening on {addr}"),
        Err(_) => info!("listening"),
    }
    if let Err(e) = server.run() {
        error!("server failed: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
