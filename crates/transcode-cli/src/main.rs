//! Composition root for the `transcode` binary.

mod commands;
mod engine;
mod local_worker;

use clap::Parser;
use transcode_core::telemetry::{init_telemetry, TelemetryConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = commands::Cli::parse();

    if let Err(err) = init_telemetry(&TelemetryConfig::default()) {
        eprintln!("telemetry init failed (continuing without it): {err}");
    }

    if let Err(err) = commands::execute(cli).await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }

    Ok(())
}
