pub mod batch;
pub mod info;
pub mod predict;

use anyhow::{Context as _, Result};
use emotion_fusion_orchestrator::{EngineConfig, InferenceEngine};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};

/// Global flags that decide how the engine is built
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub config: Option<PathBuf>,
    pub weights: Option<PathBuf>,
    pub backbone: Option<PathBuf>,
}

impl EngineOptions {
    /// Config file (or defaults) with command-line overrides applied
    pub fn resolve_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_yaml(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => EngineConfig::default(),
        };
        if let Some(weights) = &self.weights {
            config.models.fusion_weights = weights.clone();
        }
        if let Some(backbone) = &self.backbone {
            config.models.appearance_backbone = backbone.clone();
        }
        Ok(config)
    }

    pub fn load_engine(&self, config: &EngineConfig) -> Result<InferenceEngine> {
        debug!(
            "Loading engine: weights={} backbone={}",
            config.models.fusion_weights.display(),
            config.models.appearance_backbone.display()
        );
        let start = std::time::Instant::now();
        let engine = InferenceEngine::from_config(config).context("Failed to load models")?;
        info!("Models loaded in {:.2}s", start.elapsed().as_secs_f64());
        Ok(engine)
    }
}

/// Write a JSON document to stdout
pub fn print_json<T: Serialize>(value: &T, compact: bool) -> Result<()> {
    let text = if compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    }
    .context("Failed to serialize output")?;
    println!("{}", text);
    Ok(())
}
