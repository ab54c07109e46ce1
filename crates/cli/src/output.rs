//! JSON documents printed on stdout

use emotion_fusion_common::EmotionLabel;
use emotion_fusion_model::ProbabilityDistribution;
use emotion_fusion_orchestrator::{ModalityReport, PredictionResult};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// File name shown in results; falls back to the full path
#[must_use]
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Round to 4 decimals for display; the engine keeps full precision
#[must_use]
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[derive(Debug, Serialize)]
pub struct PredictionSummary {
    pub emotion: EmotionLabel,
    pub emotion_id: usize,
    pub confidence: f64,
}

#[derive(Debug, Serialize)]
pub struct FeatureSummary {
    pub shape: [usize; 1],
    pub fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<&ModalityReport> for FeatureSummary {
    fn from(report: &ModalityReport) -> Self {
        Self {
            shape: [report.dim],
            fallback: report.fallback,
            reason: report.reason.clone(),
        }
    }
}

/// Successful prediction for one file
#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub status: &'static str,
    pub filename: String,
    pub prediction: PredictionSummary,
    pub probabilities: ProbabilityDistribution,
    pub features: BTreeMap<&'static str, FeatureSummary>,
}

impl PredictResponse {
    pub fn new(filename: impl Into<String>, result: &PredictionResult) -> Self {
        Self {
            status: "success",
            filename: filename.into(),
            prediction: PredictionSummary {
                emotion: result.emotion,
                emotion_id: result.emotion_id,
                confidence: round4(result.confidence),
            },
            probabilities: result.probabilities,
            features: result
                .modalities
                .iter()
                .map(|r| (r.modality.as_str(), FeatureSummary::from(r)))
                .collect(),
        }
    }
}

/// One file of a batch
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum BatchEntry {
    Success(PredictResponse),
    Error {
        status: &'static str,
        filename: String,
        error: String,
    },
}

impl BatchEntry {
    pub fn error(filename: impl Into<String>, error: impl ToString) -> Self {
        BatchEntry::Error {
            status: "error",
            filename: filename.into(),
            error: error.to_string(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, BatchEntry::Success(_))
    }
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub status: &'static str,
    pub total_files: usize,
    pub processed: usize,
    pub results: Vec<BatchEntry>,
}

impl BatchResponse {
    pub fn new(results: Vec<BatchEntry>) -> Self {
        Self {
            status: "success",
            total_files: results.len(),
            processed: results.iter().filter(|r| r.is_success()).count(),
            results,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
