//! sigcast - Entry Point

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Real-time signal telemetry fan-out server
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via SIGCAST_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the number of simulated signals
    #[arg(short, long)]
    tickers: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    sigcast_telemetry::init_logging()?;

    info!("Starting sigcast v{}", env!("CARGO_PKG_VERSION"));

    // Config path: CLI arg > SIGCAST_CONFIG env var > default
    let explicit = args
        .config
        .or_else(|| std::env::var("SIGCAST_CONFIG").ok());
    let config_path = explicit
        .clone()
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");

    let mut config = sigcast_server::AppConfig::load(&config_path, explicit.is_some())?;
    if let Some(port) = args.port {
        config.gateway.port = port;
    }
    if let Some(tickers) = args.tickers {
        config.feed.ticker_count = tickers;
    }
    info!(
        tickers = config.feed.ticker_count,
        port = config.gateway.port,
        persistence = config.persistence.enabled,
        "Configuration loaded"
    );

    let app = sigcast_server::Application::new(config)?;
    app.run().await?;

    Ok(())
}
