//! Multi-file prediction with per-file error reporting

use super::EngineOptions;
use crate::output::{display_name, BatchEntry, BatchResponse, PredictResponse};
use crate::upload::{self, DEFAULT_MAX_SIZE_MB};
use anyhow::Result;
use clap::Parser;
use emotion_fusion_common::MediaClip;
use emotion_fusion_orchestrator::BatchOutcome;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
pub struct BatchCommand {
    /// Video files to process, in output order
    #[arg(value_name = "FILES", required = true)]
    pub files: Vec<PathBuf>,

    /// Reject files larger than this many megabytes
    #[arg(long, default_value_t = DEFAULT_MAX_SIZE_MB)]
    pub max_size_mb: u64,

    /// Files processed at once (overrides the config file)
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    pub max_concurrent: Option<u16>,

    /// Run the three extractors of each file concurrently
    #[arg(long)]
    pub parallel_extractors: bool,

    /// Print compact JSON instead of pretty-printed
    #[arg(long)]
    pub compact: bool,
}

impl BatchCommand {
    pub fn execute(self, options: &EngineOptions) -> Result<()> {
        let mut config = options.resolve_config()?;
        if let Some(n) = self.max_concurrent {
            config.execution.max_concurrent_items = usize::from(n);
        }
        if self.parallel_extractors {
            config.execution.parallel_extractors = true;
        }

        let limit = upload::limit_bytes(self.max_size_mb);
        let mut entries: Vec<Option<BatchEntry>> = Vec::with_capacity(self.files.len());
        let mut clips = Vec::new();
        // Position in `entries` of each submitted clip
        let mut slots = Vec::new();

        for path in &self.files {
            match upload::validate(path, limit) {
                Ok(()) => {
                    slots.push(entries.len());
                    clips.push(MediaClip::from_path(path));
                    entries.push(None);
                }
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    entries.push(Some(BatchEntry::error(display_name(path), e)));
                }
            }
        }

        let engine = options.load_engine(&config)?;

        info!(
            "Processing {} of {} files ({} concurrent)",
            clips.len(),
            self.files.len(),
            config.execution.max_concurrent_items
        );
        let start = std::time::Instant::now();
        let batch = engine.infer_batch(clips);

        for item in batch.items {
            let Some(&slot) = slots.get(item.index) else {
                continue;
            };
            let filename = display_name(&self.files[slot]);
            entries[slot] = Some(match &item.outcome {
                BatchOutcome::Success(prediction) => {
                    BatchEntry::Success(PredictResponse::new(filename, prediction))
                }
                BatchOutcome::Failed(error) => BatchEntry::error(filename, &error.message),
            });
        }

        let response = BatchResponse::new(entries.into_iter().flatten().collect());
        info!(
            "Batch complete: {}/{} files in {:.2}s",
            response.processed,
            response.total_files,
            start.elapsed().as_secs_f64()
        );
        super::print_json(&response, self.compact)
    }
}
