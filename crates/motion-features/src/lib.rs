//! Motion modality: optical-flow dynamics over the whole clip
//!
//! Frames are decoded lazily as grayscale, dense Farneback flow is computed for
//! every consecutive pair, each flow field is reduced to one scalar and the
//! scalars are folded into `[mean, std, max]` without being stored.

pub mod farneback;
pub mod image;
pub mod stats;

use emotion_fusion_common::{
    FeatureExtractor, MediaClip, Modality, ProcessingError, Result,
};
use emotion_fusion_decoder::{FrameReader, PixelFormat};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

pub use farneback::{Farneback, FarnebackParams, FlowField, Pyramid};
pub use image::Image;
pub use stats::{FlowReduction, RunningStats};

/// Feature dimensionality: mean, std and max of the per-pair motion scalar
pub const N_MOTION: usize = 3;

const MIN_FRAMES: usize = 2;

/// Motion extractor settings
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    #[serde(flatten)]
    pub flow: FarnebackParams,
    pub reduction: FlowReduction,
}

/// Summary of one pass over a frame sequence
#[derive(Debug, Clone, PartialEq)]
pub struct MotionSummary {
    pub frames: usize,
    pub features: [f32; N_MOTION],
}

/// Farneback-based motion feature extractor
pub struct MotionFeatureExtractor {
    config: MotionConfig,
    farneback: Farneback,
}

impl MotionFeatureExtractor {
    pub fn new(config: MotionConfig) -> Result<Self> {
        Ok(Self {
            farneback: Farneback::new(config.flow)?,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    /// Fold a grayscale frame sequence into motion statistics.
    ///
    /// A frame that fails to decode, or whose size differs from the previous
    /// one, ends the sequence like the end of the stream would. Each frame is expanded once and its pyramid reused for
    /// both pairs it takes part in.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientFrames` when fewer than two usable frames were read.
    pub fn summarize<I>(&self, frames: I) -> Result<MotionSummary>
    where
        I: IntoIterator<Item = Result<Image>>,
    {
        let mut stats = RunningStats::new();
        let mut previous: Option<Pyramid> = None;
        let mut count = 0usize;

        for frame in frames {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Stopping motion analysis after {} frames: {}", count, e);
                    break;
                }
            };

            let current = match self.farneback.pyramid(&frame) {
                Ok(pyramid) => pyramid,
                Err(e) => {
                    warn!("Stopping motion analysis after {} frames: {}", count, e);
                    break;
                }
            };
            if let Some(prev) = previous.as_ref() {
                match self.farneback.flow(prev, &current) {
                    Ok(flow) => stats.push(reduce(&flow, self.config.reduction)),
                    Err(e) => {
                        warn!("Stopping motion analysis after {} frames: {}", count, e);
                        break;
                    }
                }
            }
            count += 1;
            previous = Some(current);
        }

        let summary = stats.summary().ok_or(ProcessingError::InsufficientFrames {
            found: count,
            required: MIN_FRAMES,
        })?;

        Ok(MotionSummary {
            frames: count,
            features: summary.map(|v| v as f32),
        })
    }
}

fn reduce(flow: &FlowField, reduction: FlowReduction) -> f64 {
    match reduction {
        FlowReduction::MeanMagnitude => flow.mean_magnitude(),
        FlowReduction::SignedMean => flow.signed_mean(),
    }
}

impl FeatureExtractor for MotionFeatureExtractor {
    fn modality(&self) -> Modality {
        Modality::Motion
    }

    fn extract(&self, clip: &MediaClip) -> Result<Vec<f32>> {
        let start = Instant::now();
        let reader = FrameReader::open(clip.path(), PixelFormat::Gray8)?;
        let frames = reader.map(|frame| {
            let frame = frame?;
            Image::from_gray8(frame.width as usize, frame.height as usize, &frame.data)
        });

        let summary = self.summarize(frames)?;
        debug!(
            "Motion features for {}: {} frames in {:.1}ms",
            clip.name(),
            summary.frames,
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(summary.features.to_vec())
    }
}
