/// Common types and utilities for multimodal emotion inference
pub mod clip;
pub mod emotion;
pub mod features;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use clip::MediaClip;
pub use emotion::{EmotionLabel, NUM_CLASSES};
pub use features::{
    panic_message, Extraction, FeatureExtractor, FeatureVector, Modality, FUSED_DIM,
};

/// Processing errors
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Unreadable media: {0}")]
    UnreadableMedia(String),

    #[error("No audio stream found")]
    NoAudioStream,

    #[error("No video stream found")]
    NoVideoStream,

    #[error("Decoded audio is empty")]
    EmptyAudio,

    #[error("Not enough frames: {found} decoded, {required} required")]
    InsufficientFrames { found: usize, required: usize },

    #[error("FFmpeg error: {0}")]
    FFmpegError(String),

    #[error("Image processing error: {0}")]
    ImageError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Model inference error: {0}")]
    InferenceError(String),

    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for processing operations
pub type Result<T> = std::result::Result<T, ProcessingError>;

/// Container-level facts about a media clip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub format: String,
    pub duration: f64,
    pub has_audio: bool,
    pub has_video: bool,

    // Video-specific fields
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
}

impl MediaInfo {
    /// A clip is worth running the extractors on if it carries at least one usable stream
    #[must_use]
    pub fn has_any_stream(&self) -> bool {
        self.has_audio || self.has_video
    }
}

/// Opens a clip's container and reports what it holds.
///
/// The orchestrator probes every clip before extraction: a clip that cannot be
/// probed is a call-level failure, while a clip that probes fine but lacks one
/// modality still predicts through extractor fallbacks.
pub trait MediaProbe: Send + Sync {
    fn probe(&self, clip: &MediaClip) -> Result<MediaInfo>;
}
