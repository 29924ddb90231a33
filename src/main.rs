use std::path::PathBuf;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use snowflake::config::DaemonConfig;
use snowflake::daemon::Daemon;
use snowflake::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "snowflake")]
#[command(version)]
#[command(about = "A job daemon that keeps managed processes running inside their schedule")]
struct Args {
    /// JSON config file (host, port, tick interval, services, ...)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Address to listen on for control requests
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on for control requests
    #[arg(long, short = 'p')]
    port: Option<u16>,

    /// Scheduler tick interval in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,
}

fn build_config(args: Args) -> Result<DaemonConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => DaemonConfig::load(path)?,
        None => DaemonConfig::default(),
    };

    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(tick_ms) = args.tick_ms {
        config.tick_interval_ms = tick_ms;
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = build_config(Args::parse())?;

    tracing::info!(
        host = %config.host,
        port = config.port,
        tick_ms = config.tick_interval_ms,
        services = config.services.len(),
        "Starting snowflake daemon"
    );

    let shutdown = CancellationToken::new();
    install_shutdown_handler(shutdown.clone());

    if let Err(e) = Daemon::new(config).run(shutdown).await {
        tracing::error!(code = e.code(), error = %e, "Daemon failed");
        return Err(e.into());
    }

    Ok(())
}
