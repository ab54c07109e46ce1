//! Inference orchestration: media clip in, calibrated emotion distribution out
//!
//! `InferenceEngine` owns the three modality extractors, the fusion classifier
//! and the calibrator. All of them are loaded once and shared read-only by
//! every call.
//!
//! ## Flow of one call
//!
//! 1. Probe the container; a clip with no decodable stream fails the call
//! 2. Extract audio, motion and appearance features (each falls back to zeros
//!    on its own failure)
//! 3. Concatenate in the fixed order audio, motion, appearance
//! 4. Forward pass, temperature calibration, argmax
//! 5. Release the clip
//!
//! Batches run this per item and record failures inline without stopping.

pub mod config;
pub mod engine;
pub mod report;

use emotion_fusion_appearance::OnnxError;
use emotion_fusion_common::ProcessingError;
use emotion_fusion_model::{FusionError, ModelLoadError};
use thiserror::Error;

pub use config::{EngineConfig, ExecutionConfig, ModelPaths};
pub use engine::{EngineBuilder, InferenceEngine};
pub use report::{
    BatchItem, BatchOutcome, BatchResult, InputDims, ItemError, ModalityReport, ModelInfo,
    PredictionResult,
};

/// Call-level inference failure
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Unreadable media {clip}: {reason}")]
    UnreadableMedia { clip: String, reason: String },

    #[error("Fused feature vector has {found} values, classifier expects {expected}")]
    FusionInputShape { expected: usize, found: usize },

    #[error("Fusion failed: {0}")]
    Fusion(FusionError),
}

impl From<FusionError> for InferenceError {
    fn from(err: FusionError) -> Self {
        match err {
            FusionError::InputShape { expected, found } => {
                InferenceError::FusionInputShape { expected, found }
            }
            other => InferenceError::Fusion(other),
        }
    }
}

/// Engine construction failure; the process must not serve with a partial engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Fusion model load failed: {0}")]
    Model(#[from] ModelLoadError),

    #[error("Appearance backbone load failed: {0}")]
    Backbone(#[from] OnnxError),

    #[error(transparent)]
    Processing(#[from] ProcessingError),
}

pub type Result<T> = std::result::Result<T, InferenceError>;
