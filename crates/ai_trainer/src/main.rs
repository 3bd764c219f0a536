//! Keelson trainer CLI
//!
//! Prepares the Titanic data versions, runs the search-and-register
//! pipeline for a configured data version, or lists data versions and
//! registered models.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use keelson_ai_core::{init_logging, KeelsonConfig};
use keelson_ai_registry::{ExperimentTracker, DEFAULT_SELECTION_METRIC};
use keelson_ai_trainer::{prepare_versions, DataVersionRegistry, TrainingPipeline};
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "ai-trainer")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Boosted-tree training with tracked hyperparameter search", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search hyperparameters, train and register a model
    Train {
        #[arg(short, long, default_value = "config/config.yaml")]
        config: PathBuf,

        /// Override the configured number of trials
        #[arg(long)]
        n_trials: Option<usize>,

        /// Override the configured data version
        #[arg(long)]
        data_version: Option<String>,
    },
    /// Build the v1.1, v1.2 and v1.3 training sets from the raw Titanic CSV
    Prepare {
        /// Raw passenger CSV
        #[arg(long)]
        raw: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "data")]
        out: PathBuf,

        /// Seed for the v1.3 row sample
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// List configured data versions
    Versions {
        #[arg(short, long, default_value = "config/config.yaml")]
        config: PathBuf,
    },
    /// List registered versions of the configured model
    Models {
        #[arg(short, long, default_value = "config/config.yaml")]
        config: PathBuf,
    },
}

fn load_config(path: &Path) -> Result<KeelsonConfig> {
    KeelsonConfig::from_yaml_file(path)
        .with_context(|| format!("Failed to load config {}", path.display()))
}

fn setup_logging(config: &KeelsonConfig) -> Result<()> {
    init_logging(&config.log_level, config.log_dir.as_deref(), "train.log")
        .context("Failed to set tracing subscriber")
}

fn train(path: &Path, n_trials: Option<usize>, data_version: Option<String>) -> Result<()> {
    let mut config = load_config(path)?;
    if let Some(n) = n_trials {
        config.n_trials = n;
    }
    if let Some(version) = data_version {
        config.data_version = version;
    }
    config.validate()?;
    setup_logging(&config)?;

    info!("Keelson trainer v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Experiment {}, model {}, data version {}, {} trials",
        config.experiment_name, config.model_name, config.data_version, config.n_trials
    );

    let mut pipeline = TrainingPipeline::from_config(config, path)
        .context("Failed to set up training pipeline")?;

    let outcome = pipeline.run().context("Training pipeline failed")?;
    info!(
        "Registered {} v{} from run {} (val_auc={:.4})",
        outcome.model_version.name, outcome.model_version.version, outcome.run_id, outcome.val_auc
    );
    Ok(())
}

fn prepare(raw: &Path, out: &Path, seed: u64) -> Result<()> {
    init_logging("info", None, "train.log").context("Failed to set tracing subscriber")?;

    let versions = prepare_versions(raw, out, seed)
        .with_context(|| format!("Failed to prepare data versions from {}", raw.display()))?;
    for version in versions {
        println!(
            "{}\t{}\t{} rows\t{}",
            version.key,
            version.path.display(),
            version.rows,
            version.columns.join(",")
        );
    }
    Ok(())
}

fn list_versions(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    setup_logging(&config)?;
    let versions_path = config.data_versions_path_from(path);
    let registry = DataVersionRegistry::from_yaml_file(&versions_path)
        .with_context(|| format!("Failed to load {}", versions_path.display()))?;

    for (key, entry) in registry.entries() {
        let marker = if key == config.data_version { "*" } else { " " };
        println!("{marker} {key}\t{}\t{}", entry.path.display(), entry.description);
    }
    Ok(())
}

fn list_models(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    setup_logging(&config)?;
    let tracker = ExperimentTracker::open(config.tracking_uri.as_deref(), &config.experiment_name)
        .context("Failed to open registry")?;

    for version in tracker.search_model_versions(&config.model_name)? {
        let metric = tracker
            .get_run(&version.run_id)?
            .metric(DEFAULT_SELECTION_METRIC)
            .map_or_else(|| "-".to_string(), |v| format!("{v:.4}"));
        println!(
            "{} v{}\t{}={}\trun {}\t{}",
            version.name,
            version.version,
            DEFAULT_SELECTION_METRIC,
            metric,
            version.run_id,
            version.created_at.to_rfc3339()
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Train {
            config,
            n_trials,
            data_version,
        } => train(&config, n_trials, data_version),
        Command::Prepare { raw, out, seed } => prepare(&raw, &out, seed),
        Command::Versions { config } => list_versions(&config),
        Command::Models { config } => list_models(&config),
    };

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}
