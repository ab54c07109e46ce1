//! Audio modality: time-averaged MFCCs
//!
//! Decodes the clip's audio track to mono at a fixed rate, computes 40 MFCCs
//! per analysis frame and averages them over the whole clip.
//!
//! # Example
//! ```no_run
//! use emotion_fusion_audio::{AudioFeatureExtractor, MfccConfig};
//! use emotion_fusion_common::{FeatureExtractor, MediaClip};
//!
//! # fn main() -> emotion_fusion_common::Result<()> {
//! let extractor = AudioFeatureExtractor::new(MfccConfig::default())?;
//! let clip = MediaClip::from_path("clip.mp4");
//! let outcome = extractor.extract_or_fallback(&clip);
//! assert_eq!(outcome.vector().len(), 40);
//! # Ok(())
//! # }
//! ```

pub mod mel;
pub mod mfcc;

use emotion_fusion_common::{FeatureExtractor, MediaClip, Modality, Result};
use std::time::Instant;
use tracing::debug;

pub use mfcc::{Mfcc, MfccConfig, N_MFCC};

/// MFCC-based audio feature extractor
pub struct AudioFeatureExtractor {
    mfcc: Mfcc,
}

impl AudioFeatureExtractor {
    pub fn new(config: MfccConfig) -> Result<Self> {
        Ok(Self {
            mfcc: Mfcc::new(config)?,
        })
    }

    #[must_use]
    pub fn config(&self) -> &MfccConfig {
        self.mfcc.config()
    }

    /// Features of an already-decoded mono signal at the configured rate
    pub fn extract_from_samples(&self, samples: &[f32]) -> Result<Vec<f32>> {
        self.mfcc.mean_mfcc(samples)
    }
}

impl FeatureExtractor for AudioFeatureExtractor {
    fn modality(&self) -> Modality {
        Modality::Audio
    }

    fn extract(&self, clip: &MediaClip) -> Result<Vec<f32>> {
        let start = Instant::now();
        let samples =
            emotion_fusion_decoder::load_audio_mono_f32(clip.path(), self.config().sample_rate)?;
        let decoded = start.elapsed();

        let features = self.extract_from_samples(&samples)?;
        debug!(
            "Audio features for {}: {} samples, decode {:.1}ms, mfcc {:.1}ms",
            clip.name(),
            samples.len(),
            decoded.as_secs_f64() * 1000.0,
            (start.elapsed() - decoded).as_secs_f64() * 1000.0
        );
        Ok(features)
    }
}
