use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use solarstream::config::ServerConfig;
use solarstream::logging;
use solarstream::service::TelemetryServer;

/// Solar car telemetry server
#[derive(Parser, Debug)]
#[command(name = "solarstream", version, about, long_about = None)]
struct Cli {
    /// JSON server configuration; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    logging::init(&config.log_level);

    let mut server = TelemetryServer::start(config).await?;

    let result = tokio::select! {
        r = server.wait() => r,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
            Ok(())
        }
    };
    if let Err(e) = &result {
        error!(error = %format!("{:#}", e), "listener failed, exiting");
    }

    info!("{}", server.engine_report());
    server.shutdown().await;
    result
}
