use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use tracing::info;

use gorogrid_predictor::cli::{self, Cli};
use gorogrid_predictor::config::Settings;
use gorogrid_predictor::log_error;
use gorogrid_predictor::monitoring::{self, TelemetryConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenv().ok();

    let cli = Cli::parse();

    // Load configuration
    let settings = Settings::load(cli.config.as_deref())?;

    // Initialize logging
    monitoring::init_telemetry(&TelemetryConfig {
        log_level: settings.log_level,
        ..TelemetryConfig::default()
    });

    info!("GoroGrid predictor starting up...");

    if let Err(err) = cli::run(cli, settings).await {
        log_error!(&*err, "Command failed");
        return Err(err);
    }

    Ok(())
}
