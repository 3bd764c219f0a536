//! Prediction service entry point

use anyhow::{Context, Result};
use clap::Parser;
use keelson_ai_core::gbdt::BoosterModel;
use keelson_ai_core::{init_logging, KeelsonConfig};
use keelson_ai_service::PredictionService;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "ai-service")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Serve the best registered model over HTTP", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config/config.yaml")]
    config: PathBuf,

    /// Override the configured bind address
    #[arg(long)]
    host: Option<IpAddr>,

    /// Override the configured port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = KeelsonConfig::from_yaml_file(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;
    init_logging(&config.log_level, config.log_dir.as_deref(), "serve.log")
        .context("Failed to set tracing subscriber")?;

    info!("Starting Keelson AI Service v{}", env!("CARGO_PKG_VERSION"));

    let result = run(&args, &config).await;
    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

async fn run(args: &Args, config: &KeelsonConfig) -> Result<()> {
    let host = match args.host {
        Some(host) => host,
        None => config
            .serve
            .host
            .parse()
            .with_context(|| format!("Invalid serve.host {}", config.serve.host))?,
    };
    let addr = SocketAddr::new(host, args.port.unwrap_or(config.serve.port));

    let service = PredictionService::<BoosterModel>::open(
        config.tracking_uri.as_deref(),
        &config.experiment_name,
        &config.model_name,
    )
    .with_context(|| format!("Failed to load best version of {}", config.model_name))?;

    keelson_ai_service::serve(Arc::new(service), addr).await
}
