//! Emotion Fusion CLI
//!
//! Command-line front end for the multimodal emotion recognition engine.
//! Results are printed to stdout as JSON; logs go to stderr.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod commands;
mod output;
mod upload;

use commands::batch::BatchCommand;
use commands::predict::PredictCommand;
use commands::EngineOptions;

#[derive(Parser)]
#[command(
    name = "emotion-fusion",
    version,
    about = "Predict the emotion expressed in a video clip",
    long_about = "Fuses audio (MFCC), motion (dense optical flow) and appearance (image embedding)\n\
                  features through a pretrained classifier and prints a calibrated distribution\n\
                  over eight emotions.",
    after_help = "EXAMPLES:\n  \
                  # Single clip\n  \
                  emotion-fusion predict clip.mp4\n\n  \
                  # Several clips, four at a time\n  \
                  emotion-fusion batch --max-concurrent 4 *.mp4\n\n  \
                  # Custom model locations\n  \
                  emotion-fusion --weights fusion.safetensors --backbone resnet18.onnx predict clip.mp4\n\n  \
                  # Check that the models load\n  \
                  emotion-fusion health"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Engine configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Fusion classifier weights (overrides the config file)
    #[arg(long, global = true)]
    weights: Option<PathBuf>,

    /// Appearance backbone model (overrides the config file)
    #[arg(long, global = true)]
    backbone: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict the emotion of one clip
    Predict(PredictCommand),

    /// Predict several clips; failures are reported per file
    Batch(BatchCommand),

    /// Describe the loaded model
    ModelInfo,

    /// Check that every model loads
    Health,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    // RUST_LOG wins over the flag
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(log_level).into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let options = EngineOptions {
        config: cli.config,
        weights: cli.weights,
        backbone: cli.backbone,
    };

    match cli.command {
        Commands::Predict(cmd) => cmd.execute(&options),
        Commands::Batch(cmd) => cmd.execute(&options),
        Commands::ModelInfo => commands::info::model_info(&options),
        Commands::Health => commands::info::health(&options),
    }
}
