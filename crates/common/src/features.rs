//! Per-modality feature vectors and the extractor seam.
//!
//! Every extractor produces a vector of a fixed, modality-specific length.
//! When extraction fails the extractor still yields a vector of that length
//! (all zeros), tagged as a fallback so callers can tell the two apart even
//! though the fusion step treats them identically.

use crate::clip::MediaClip;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use tracing::warn;

/// MFCC coefficients per clip
pub const AUDIO_DIM: usize = 40;
/// Optical-flow summary statistics (mean, std, max)
pub const MOTION_DIM: usize = 3;
/// Penultimate ResNet-18 embedding
pub const APPEARANCE_DIM: usize = 512;
/// Concatenated fusion input
pub const FUSED_DIM: usize = AUDIO_DIM + MOTION_DIM + APPEARANCE_DIM;

/// Input modality of the late-fusion model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Audio,
    Motion,
    Appearance,
}

impl Modality {
    /// Concatenation order of the fused vector. The classifier was trained on
    /// this order; permuting it corrupts predictions without any error.
    pub const FUSION_ORDER: [Modality; 3] = [Modality::Audio, Modality::Motion, Modality::Appearance];

    /// Fixed dimensionality of this modality's feature vector
    #[must_use]
    pub fn dim(self) -> usize {
        match self {
            Modality::Audio => AUDIO_DIM,
            Modality::Motion => MOTION_DIM,
            Modality::Appearance => APPEARANCE_DIM,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Modality::Audio => "audio",
            Modality::Motion => "motion",
            Modality::Appearance => "appearance",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Feature vector produced by one extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub modality: Modality,
    pub values: Vec<f32>,
}

impl FeatureVector {
    pub fn new(modality: Modality, values: Vec<f32>) -> Self {
        Self { modality, values }
    }

    /// Neutral vector of the modality's fixed length
    #[must_use]
    pub fn zeros(modality: Modality) -> Self {
        Self {
            modality,
            values: vec![0.0; modality.dim()],
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }
}

/// Outcome of running one extractor on one clip
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// The extractor produced a genuine feature vector
    Extracted(FeatureVector),
    /// Extraction failed; `vector` is the zero vector of the right length
    Fallback { vector: FeatureVector, reason: String },
}

impl Extraction {
    #[must_use]
    pub fn vector(&self) -> &FeatureVector {
        match self {
            Extraction::Extracted(vector) | Extraction::Fallback { vector, .. } => vector,
        }
    }

    #[must_use]
    pub fn into_vector(self) -> FeatureVector {
        match self {
            Extraction::Extracted(vector) | Extraction::Fallback { vector, .. } => vector,
        }
    }

    #[must_use]
    pub fn is_fallback(&self) -> bool {
        matches!(self, Extraction::Fallback { .. })
    }

    /// Why extraction fell back, if it did
    #[must_use]
    pub fn fallback_reason(&self) -> Option<&str> {
        match self {
            Extraction::Extracted(_) => None,
            Extraction::Fallback { reason, .. } => Some(reason),
        }
    }
}

/// A per-modality feature extractor.
///
/// Implementations hold only immutable, shared state (pretrained weights,
/// fixed parameters), so one instance serves concurrent calls.
pub trait FeatureExtractor: Send + Sync {
    /// Modality this extractor feeds
    fn modality(&self) -> Modality;

    /// Attempt extraction, reporting any failure
    fn extract(&self, clip: &MediaClip) -> Result<Vec<f32>>;

    /// Extract, replacing any failure (error or panic) with the modality's
    /// zero vector.
    ///
    /// Never fails. The returned vector is passed through untouched on
    /// success, so a misbehaving extractor that returns the wrong length is
    /// caught by the fusion shape check rather than silently padded here.
    fn extract_or_fallback(&self, clip: &MediaClip) -> Extraction {
        let modality = self.modality();
        let reason = match panic::catch_unwind(AssertUnwindSafe(|| self.extract(clip))) {
            Ok(Ok(values)) => return Extraction::Extracted(FeatureVector::new(modality, values)),
            Ok(Err(e)) => e.to_string(),
            Err(payload) => format!("Extractor panicked: {}", panic_message(&*payload)),
        };
        warn!(
            "{} extraction failed for {}, using zero vector: {}",
            modality,
            clip.name(),
            reason
        );
        Extraction::Fallback {
            vector: FeatureVector::zeros(modality),
            reason,
        }
    }
}

/// Text of a panic payload raised with a string message
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
