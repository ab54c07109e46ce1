//! Late-fusion emotion classifier and confidence calibration
//!
//! The classifier consumes the concatenated audio, motion and appearance
//! features and produces one logit per emotion class. Logits are calibrated
//! with a fixed temperature before the softmax.
//!
//! ## Architecture
//!
//! ```text
//! 0 Linear(555, 256) -> 1 ReLU -> 2 Dropout(0.3)
//! 3 Linear(256, 128) -> 4 ReLU -> 5 Dropout(0.3)
//! 6 Linear(128, 8)
//! ```
//!
//! Dropout is the identity at inference. Weights come from a safetensors
//! checkpoint whose tensor names follow the layer indices above
//! (`fc.0.weight`, `fc.0.bias`, ..., `fc.6.bias`).
//!
//! ## Example
//!
//! ```no_run
//! use emotion_fusion_model::{Calibrator, FusionClassifier};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let model = FusionClassifier::load("models/late_fusion_best.safetensors")?;
//! let fused = vec![0.0f32; model.input_dim()];
//! let logits = model.forward(&fused)?;
//! let distribution = Calibrator::new().calibrate(&logits);
//! let (label, confidence) = distribution.argmax();
//! println!("{label}: {confidence:.4}");
//! # Ok(())
//! # }
//! ```

pub mod calibration;
pub mod checkpoint;
pub mod classifier;

use thiserror::Error;

pub use calibration::{Calibrator, ProbabilityDistribution, TEMPERATURE};
pub use classifier::{FusionClassifier, Layer, Linear, Logits, DROPOUT, HIDDEN_DIMS};

/// Checkpoint could not be turned into a usable classifier
#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("Failed to read checkpoint {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid safetensors checkpoint: {0}")]
    Format(String),

    #[error("Checkpoint is missing tensor {0}")]
    MissingTensor(String),

    #[error("Checkpoint has unexpected tensor {0}")]
    UnexpectedTensor(String),

    #[error("Tensor {name} has dtype {dtype}, expected F32")]
    Dtype { name: String, dtype: String },

    #[error("Tensor {name} has shape {found:?}, expected {expected:?}")]
    Shape {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
}

/// Forward-pass failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FusionError {
    #[error("Fused feature vector has {found} values, classifier expects {expected}")]
    InputShape { expected: usize, found: usize },

    #[error("Classifier produced non-finite logits")]
    NonFiniteLogits,

    #[error("Temperature must be positive and finite, got {0}")]
    InvalidTemperature(f64),
}
