//! Appearance modality: first-frame embedding from a pretrained CNN
//!
//! The first decodable frame is resized, ImageNet-normalised and passed through
//! an image classifier with its classification head removed. The resulting
//! penultimate-layer activations (512 values for ResNet-18) are the feature.

pub mod onnx;
pub mod preprocess;

use emotion_fusion_common::features::APPEARANCE_DIM;
use emotion_fusion_common::{FeatureExtractor, MediaClip, Modality, ProcessingError, Result};
use emotion_fusion_decoder::{FrameReader, PixelFormat};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info};

pub use onnx::OnnxError;
pub use preprocess::{to_input_tensor, IMAGENET_MEAN, IMAGENET_STD};

/// Appearance extractor settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppearanceConfig {
    /// Square input side expected by the backbone
    pub image_size: u32,
}

impl Default for AppearanceConfig {
    fn default() -> Self {
        Self { image_size: 224 }
    }
}

/// Maps a normalised `[1, 3, H, W]` tensor to a flat embedding
pub trait ImageEmbedder: Send + Sync {
    fn embed(&self, input: &Array4<f32>) -> Result<Vec<f32>>;
}

/// ONNX export of the headless backbone, loaded once and shared read-only
pub struct OnnxBackbone {
    session: Mutex<Session>,
    path: PathBuf,
}

impl OnnxBackbone {
    /// Load the model and verify it yields `APPEARANCE_DIM` values for a blank image
    pub fn load(
        path: &Path,
        image_size: u32,
        threads: Option<usize>,
    ) -> std::result::Result<Self, OnnxError> {
        info!("Loading appearance backbone from: {}", path.display());
        let session = onnx::create_session(path, threads)?;
        let backbone = Self {
            session: Mutex::new(session),
            path: path.to_path_buf(),
        };

        let side = image_size as usize;
        let blank = Array4::<f32>::zeros((1, 3, side, side));
        let output = backbone
            .run(&blank)
            .map_err(|e| OnnxError::WarmUp(e.to_string()))?;
        if output.len() != APPEARANCE_DIM {
            return Err(OnnxError::UnexpectedOutput {
                expected: APPEARANCE_DIM,
                found: output.len(),
            });
        }
        Ok(backbone)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn run(&self, input: &Array4<f32>) -> Result<Vec<f32>> {
        let mut session = onnx::lock_session(&self.session);

        let tensor = TensorRef::from_array_view(input.view())
            .map_err(|e| ProcessingError::InferenceError(e.to_string()))?;
        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| ProcessingError::InferenceError(e.to_string()))?;

        // [1, 512] or [1, 512, 1, 1] depending on the export; flatten either way
        let (_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ProcessingError::InferenceError(e.to_string()))?;
        Ok(data.to_vec())
    }
}

impl ImageEmbedder for OnnxBackbone {
    fn embed(&self, input: &Array4<f32>) -> Result<Vec<f32>> {
        self.run(input)
    }
}

/// First-frame appearance feature extractor
pub struct AppearanceFeatureExtractor {
    backbone: Arc<dyn ImageEmbedder>,
    config: AppearanceConfig,
}

impl AppearanceFeatureExtractor {
    pub fn new(backbone: Arc<dyn ImageEmbedder>, config: AppearanceConfig) -> Self {
        Self { backbone, config }
    }

    #[must_use]
    pub fn config(&self) -> &AppearanceConfig {
        &self.config
    }
}

impl FeatureExtractor for AppearanceFeatureExtractor {
    fn modality(&self) -> Modality {
        Modality::Appearance
    }

    fn extract(&self, clip: &MediaClip) -> Result<Vec<f32>> {
        let start = Instant::now();
        let frame = FrameReader::first_frame(clip.path(), PixelFormat::Rgb24)?;
        let img = preprocess::frame_to_rgb(frame)?;
        let input = to_input_tensor(&img, self.config.image_size);
        let decoded = start.elapsed();

        let embedding = self.backbone.embed(&input)?;
        debug!(
            "Appearance features for {}: decode {:.1}ms, backbone {:.1}ms",
            clip.name(),
            decoded.as_secs_f64() * 1000.0,
            (start.elapsed() - decoded).as_secs_f64() * 1000.0
        );
        Ok(embedding)
    }
}
