use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use presteps::config::load_json;
use presteps::{ExtractionSettings, ServerSettings};
use presteps_api::app_with_settings;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "presteps-api", about = "HTTP extraction service for presteps", version)]
struct Args {
    #[arg(long, env = "PRESTEPS_HOST")]
    host: Option<String>,

    #[arg(long, env = "PRESTEPS_PORT")]
    port: Option<u16>,

    /// Default filter when RUST_LOG is unset
    #[arg(long, env = "PRESTEPS_LOG_LEVEL")]
    log_level: Option<String>,

    /// JSON file with the extraction settings used for uploads
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Args {
    fn server_settings(&self) -> ServerSettings {
        let defaults = ServerSettings::default();
        ServerSettings {
            host: self.host.clone().unwrap_or(defaults.host),
            port: self.port.unwrap_or(defaults.port),
            log_level: self.log_level.clone().unwrap_or(defaults.log_level),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let server = args.server_settings();

    let level = &server.log_level;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("presteps_api={level},presteps={level},tower_http={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let extraction: ExtractionSettings = match &args.config {
        Some(path) => load_json(path).context("Failed to load extraction settings")?,
        None => ExtractionSettings::default(),
    };
    extraction.validate().context("Invalid extraction settings")?;

    let address = server.address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;

    info!("presteps API listening on http://{address}");

    axum::serve(listener, app_with_settings(extraction))
        .await
        .context("Server error")?;
    Ok(())
}
