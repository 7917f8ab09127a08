//! KIS real-time relay - Entry Point

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// KIS real-time market data relay
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via KIS_RELAY_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize TLS crypto provider (must be before any WS or HTTPS connections)
    kis_ws::init_crypto();

    let args = Args::parse();

    // Determine config path: CLI arg > KIS_RELAY_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("KIS_RELAY_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    let config = kis_relay::RelayConfig::from_file(&config_path)?;

    kis_telemetry::init_logging_with_default(&config.telemetry.log_level)?;

    info!("Starting KIS relay v{}", env!("CARGO_PKG_VERSION"));
    info!(
        config_path = %config_path,
        environment = %config.environment,
        initial_symbols = ?config.initial_symbols,
        "Configuration loaded"
    );

    let app = kis_relay::Application::new(config)?;
    app.run().await?;

    Ok(())
}
