//! Single clip prediction

use super::EngineOptions;
use crate::output::{display_name, PredictResponse};
use crate::upload::{self, DEFAULT_MAX_SIZE_MB};
use anyhow::{Context as _, Result};
use clap::Parser;
use emotion_fusion_common::MediaClip;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
pub struct PredictCommand {
    /// Video file (mp4, avi, mov, mkv, webm)
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Reject files larger than this many megabytes
    #[arg(long, default_value_t = DEFAULT_MAX_SIZE_MB)]
    pub max_size_mb: u64,

    /// Print compact JSON instead of pretty-printed
    #[arg(long)]
    pub compact: bool,
}

impl PredictCommand {
    pub fn execute(self, options: &EngineOptions) -> Result<()> {
        // Cheap checks before any model is loaded
        upload::validate(&self.file, upload::limit_bytes(self.max_size_mb))
            .with_context(|| format!("Invalid input {}", self.file.display()))?;

        let config = options.resolve_config()?;
        let engine = options.load_engine(&config)?;

        let filename = display_name(&self.file);
        let start = std::time::Instant::now();
        let result = engine
            .infer_one(MediaClip::from_path(&self.file))
            .with_context(|| format!("Prediction failed for {}", filename))?;
        info!(
            "{}: {} ({:.4}) in {:.2}s",
            filename,
            result.emotion,
            result.confidence,
            start.elapsed().as_secs_f64()
        );

        let response = PredictResponse::new(filename, &result);
        super::print_json(&response, self.compact)
    }
}
