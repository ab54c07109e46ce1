//! Results returned to callers

use emotion_fusion_common::{EmotionLabel, Modality};
use emotion_fusion_model::ProbabilityDistribution;
use serde::Serialize;

/// What one modality contributed to a prediction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModalityReport {
    pub modality: Modality,
    /// Length of the feature vector fed to the classifier
    pub dim: usize,
    /// The extractor failed and zeros were used instead
    pub fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Calibrated prediction for one clip
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub emotion: EmotionLabel,
    pub emotion_id: usize,
    pub confidence: f64,
    pub probabilities: ProbabilityDistribution,
    pub modalities: Vec<ModalityReport>,
}

impl PredictionResult {
    /// Report for one modality
    #[must_use]
    pub fn modality(&self, modality: Modality) -> Option<&ModalityReport> {
        self.modalities.iter().find(|r| r.modality == modality)
    }

    /// Modalities that fell back to zeros
    pub fn fallbacks(&self) -> impl Iterator<Item = Modality> + '_ {
        self.modalities
            .iter()
            .filter(|r| r.fallback)
            .map(|r| r.modality)
    }
}

/// Why a batch item produced no prediction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemError {
    pub message: String,
}

impl ItemError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Success(PredictionResult),
    Failed(ItemError),
}

/// One entry per submitted clip, in submission order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItem {
    /// Position in the submitted sequence
    pub index: usize,
    /// Clip name
    pub source: String,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
}

impl BatchItem {
    #[must_use]
    pub fn prediction(&self) -> Option<&PredictionResult> {
        match &self.outcome {
            BatchOutcome::Success(p) => Some(p),
            BatchOutcome::Failed(_) => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&ItemError> {
        match &self.outcome {
            BatchOutcome::Success(_) => None,
            BatchOutcome::Failed(e) => Some(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResult {
    pub total: usize,
    pub processed: usize,
    pub items: Vec<BatchItem>,
}

/// Per-modality and fused input sizes of the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InputDims {
    pub audio: usize,
    pub motion: usize,
    pub appearance: usize,
    pub fused: usize,
}

/// Static description of the loaded model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub model_name: String,
    pub architecture: Vec<String>,
    pub num_classes: usize,
    pub labels: Vec<EmotionLabel>,
    pub input_dims: InputDims,
    pub total_parameters: usize,
    pub temperature: f64,
}
