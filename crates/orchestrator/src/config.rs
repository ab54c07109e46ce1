//! Engine configuration (YAML)
//!
//! ```yaml
//! models:
//!   fusion_weights: models/late_fusion_best.safetensors
//!   appearance_backbone: models/resnet18_backbone.onnx
//! audio:
//!   sample_rate: 16000
//! motion:
//!   window_size: 15
//!   reduction: mean_magnitude
//! execution:
//!   parallel_extractors: true
//!   max_concurrent_items: 4
//! ```
//!
//! Every field is optional. Feature dimensions, class order and the
//! calibration temperature are fixed by the checkpoint and not configurable.

use crate::EngineError;
use emotion_fusion_appearance::AppearanceConfig;
use emotion_fusion_audio::MfccConfig;
use emotion_fusion_motion::MotionConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Locations of the pretrained artefacts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPaths {
    /// Fusion classifier checkpoint (safetensors)
    pub fusion_weights: PathBuf,
    /// Headless image backbone (ONNX)
    pub appearance_backbone: PathBuf,
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self {
            fusion_weights: PathBuf::from("models/late_fusion_best.safetensors"),
            appearance_backbone: PathBuf::from("models/resnet18_backbone.onnx"),
        }
    }
}

/// Scheduling knobs; none of them change results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Run the three extractors of one clip concurrently
    pub parallel_extractors: bool,
    /// Batch items processed at once (1 = sequential)
    pub max_concurrent_items: usize,
    /// ONNX Runtime intra-op threads (defaults to `EMOTION_FUSION_THREADS`, then physical cores)
    pub intra_threads: Option<usize>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            parallel_extractors: false,
            max_concurrent_items: 1,
            intra_threads: None,
        }
    }
}

/// Everything needed to build an `InferenceEngine`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub models: ModelPaths,
    pub audio: MfccConfig,
    pub motion: MotionConfig,
    pub appearance: AppearanceConfig,
    pub execution: ExecutionConfig,
}

impl EngineConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, EngineError> {
        let config: Self = serde_yaml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot work before any model is loaded
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.execution.max_concurrent_items == 0 {
            return Err(EngineError::Config(
                "execution.max_concurrent_items must be at least 1".to_string(),
            ));
        }
        if self.execution.intra_threads == Some(0) {
            return Err(EngineError::Config(
                "execution.intra_threads must be at least 1".to_string(),
            ));
        }
        if self.appearance.image_size == 0 {
            return Err(EngineError::Config(
                "appearance.image_size must be positive".to_string(),
            ));
        }
        self.audio.validate()?;
        self.motion.flow.validate()?;
        Ok(())
    }
}
