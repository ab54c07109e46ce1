//! The inference engine

use crate::config::{EngineConfig, ExecutionConfig};
use crate::report::{
    BatchItem, BatchOutcome, BatchResult, InputDims, ItemError, ModalityReport, ModelInfo,
    PredictionResult,
};
use crate::{EngineError, InferenceError, Result};
use emotion_fusion_appearance::{AppearanceFeatureExtractor, OnnxBackbone};
use emotion_fusion_audio::AudioFeatureExtractor;
use emotion_fusion_common::{
    panic_message, EmotionLabel, Extraction, FeatureExtractor, MediaClip, MediaProbe, Modality,
    FUSED_DIM, NUM_CLASSES,
};
use emotion_fusion_decoder::FfmpegProbe;
use emotion_fusion_model::{Calibrator, FusionClassifier};
use emotion_fusion_motion::MotionFeatureExtractor;
use rayon::prelude::*;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const MODEL_NAME: &str = "LateFusionModel";

/// Loaded models and extractors, shared read-only by all calls
pub struct InferenceEngine {
    /// Extractors in `Modality::FUSION_ORDER`
    extractors: [Arc<dyn FeatureExtractor>; 3],
    probe: Arc<dyn MediaProbe>,
    classifier: Arc<FusionClassifier>,
    calibrator: Calibrator,
    execution: ExecutionConfig,
    pool: Option<rayon::ThreadPool>,
}

impl InferenceEngine {
    /// Load every model named in `config`. Any load failure is fatal.
    pub fn from_config(config: &EngineConfig) -> std::result::Result<Self, EngineError> {
        config.validate()?;
        emotion_fusion_decoder::init()?;

        let start = Instant::now();
        let classifier = FusionClassifier::load(&config.models.fusion_weights)?;
        let backbone = OnnxBackbone::load(
            &config.models.appearance_backbone,
            config.appearance.image_size,
            config.execution.intra_threads,
        )?;

        let engine = Self::builder(Arc::new(classifier))
            .audio(Arc::new(AudioFeatureExtractor::new(config.audio.clone())?))
            .motion(Arc::new(MotionFeatureExtractor::new(config.motion)?))
            .appearance(Arc::new(AppearanceFeatureExtractor::new(
                Arc::new(backbone),
                config.appearance,
            )))
            .probe(Arc::new(FfmpegProbe))
            .execution(config.execution.clone())
            .build()?;

        info!(
            "Inference engine ready in {:.2}s",
            start.elapsed().as_secs_f64()
        );
        Ok(engine)
    }

    /// Assemble an engine from already-constructed parts
    pub fn builder(classifier: Arc<FusionClassifier>) -> EngineBuilder {
        EngineBuilder {
            classifier,
            audio: None,
            motion: None,
            appearance: None,
            probe: None,
            calibrator: Calibrator::new(),
            execution: ExecutionConfig::default(),
        }
    }

    #[must_use]
    pub fn execution(&self) -> &ExecutionConfig {
        &self.execution
    }

    #[must_use]
    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            model_name: MODEL_NAME.to_string(),
            architecture: self
                .classifier
                .layers()
                .iter()
                .map(ToString::to_string)
                .collect(),
            num_classes: NUM_CLASSES,
            labels: EmotionLabel::ALL.to_vec(),
            input_dims: InputDims {
                audio: Modality::Audio.dim(),
                motion: Modality::Motion.dim(),
                appearance: Modality::Appearance.dim(),
                fused: FUSED_DIM,
            },
            total_parameters: self.classifier.parameter_count(),
            temperature: self.calibrator.temperature(),
        }
    }

    /// Predict the emotion of one clip. The clip is released before returning,
    /// whatever the outcome.
    pub fn infer_one(&self, clip: MediaClip) -> Result<PredictionResult> {
        let result = self.predict(&clip);
        clip.release();
        result
    }

    /// Predict every clip, isolating failures per item.
    ///
    /// Items run sequentially unless `max_concurrent_items > 1`; results are
    /// always returned in submission order.
    pub fn infer_batch(&self, clips: Vec<MediaClip>) -> BatchResult {
        let total = clips.len();
        let start = Instant::now();
        info!(
            "Batch started: {} items, {} concurrent",
            total, self.execution.max_concurrent_items
        );

        let run_item = |(index, clip): (usize, MediaClip)| self.run_item(index, clip);
        let items: Vec<BatchItem> = match &self.pool {
            Some(pool) => {
                pool.install(|| clips.into_par_iter().enumerate().map(run_item).collect())
            }
            None => clips.into_iter().enumerate().map(run_item).collect(),
        };

        let processed = items.iter().filter(|item| item.prediction().is_some()).count();
        info!(
            "Batch finished: {}/{} processed in {:.2}s",
            processed,
            total,
            start.elapsed().as_secs_f64()
        );
        BatchResult {
            total,
            processed,
            items,
        }
    }

    fn run_item(&self, index: usize, clip: MediaClip) -> BatchItem {
        let source = clip.name().to_string();
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| self.infer_one(clip))) {
            Ok(Ok(prediction)) => BatchOutcome::Success(prediction),
            Ok(Err(e)) => {
                warn!("Batch item {} ({}) failed: {}", index, source, e);
                BatchOutcome::Failed(ItemError::new(e.to_string()))
            }
            Err(payload) => {
                let message = format!("Processing panicked: {}", panic_message(&*payload));
                warn!("Batch item {} ({}) failed: {}", index, source, message);
                BatchOutcome::Failed(ItemError::new(message))
            }
        };
        BatchItem {
            index,
            source,
            outcome,
        }
    }

    fn predict(&self, clip: &MediaClip) -> Result<PredictionResult> {
        let start = Instant::now();
        let info = self
            .probe
            .probe(clip)
            .map_err(|e| InferenceError::UnreadableMedia {
                clip: clip.name().to_string(),
                reason: e.to_string(),
            })?;
        if !info.has_any_stream() {
            return Err(InferenceError::UnreadableMedia {
                clip: clip.name().to_string(),
                reason: "no audio or video stream".to_string(),
            });
        }

        let extractions = self.extract_all(clip);
        let extracted = start.elapsed();

        let mut fused = Vec::with_capacity(FUSED_DIM);
        let mut modalities = Vec::with_capacity(extractions.len());
        for extraction in &extractions {
            let vector = extraction.vector();
            fused.extend_from_slice(vector.as_slice());
            modalities.push(ModalityReport {
                modality: vector.modality,
                dim: vector.len(),
                fallback: extraction.is_fallback(),
                reason: extraction.fallback_reason().map(str::to_string),
            });
        }
        if fused.len() != self.classifier.input_dim() {
            return Err(InferenceError::FusionInputShape {
                expected: self.classifier.input_dim(),
                found: fused.len(),
            });
        }

        let logits = self.classifier.forward(&fused)?;
        let probabilities = self.calibrator.calibrate(&logits);
        let (emotion, confidence) = probabilities.argmax();

        debug!(
            "Prediction for {}: {} ({:.4}), extract {:.1}ms, total {:.1}ms",
            clip.name(),
            emotion,
            confidence,
            extracted.as_secs_f64() * 1000.0,
            start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(PredictionResult {
            emotion,
            emotion_id: emotion.index(),
            confidence,
            probabilities,
            modalities,
        })
    }

    /// Run the extractors, concurrently if configured; output is in fusion order
    fn extract_all(&self, clip: &MediaClip) -> [Extraction; 3] {
        let [audio, motion, appearance] = &self.extractors;
        if self.execution.parallel_extractors {
            let (a, (m, v)) = rayon::join(
                || audio.extract_or_fallback(clip),
                || {
                    rayon::join(
                        || motion.extract_or_fallback(clip),
                        || appearance.extract_or_fallback(clip),
                    )
                },
            );
            [a, m, v]
        } else {
            [
                audio.extract_or_fallback(clip),
                motion.extract_or_fallback(clip),
                appearance.extract_or_fallback(clip),
            ]
        }
    }
}

/// Builder for `InferenceEngine` with injectable extractors and probe
pub struct EngineBuilder {
    classifier: Arc<FusionClassifier>,
    audio: Option<Arc<dyn FeatureExtractor>>,
    motion: Option<Arc<dyn FeatureExtractor>>,
    appearance: Option<Arc<dyn FeatureExtractor>>,
    probe: Option<Arc<dyn MediaProbe>>,
    calibrator: Calibrator,
    execution: ExecutionConfig,
}

impl EngineBuilder {
    pub fn audio(mut self, extractor: Arc<dyn FeatureExtractor>) -> Self {
        self.audio = Some(extractor);
        self
    }

    pub fn motion(mut self, extractor: Arc<dyn FeatureExtractor>) -> Self {
        self.motion = Some(extractor);
        self
    }

    pub fn appearance(mut self, extractor: Arc<dyn FeatureExtractor>) -> Self {
        self.appearance = Some(extractor);
        self
    }

    pub fn probe(mut self, probe: Arc<dyn MediaProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Override the calibration temperature (tests and experiments only)
    pub fn calibrator(mut self, calibrator: Calibrator) -> Self {
        self.calibrator = calibrator;
        self
    }

    pub fn execution(mut self, execution: ExecutionConfig) -> Self {
        self.execution = execution;
        self
    }

    pub fn build(self) -> std::result::Result<InferenceEngine, EngineError> {
        let audio = slot(self.audio, Modality::Audio)?;
        let motion = slot(self.motion, Modality::Motion)?;
        let appearance = slot(self.appearance, Modality::Appearance)?;
        let probe = self
            .probe
            .ok_or_else(|| EngineError::Config("no media probe configured".to_string()))?;

        if self.execution.max_concurrent_items == 0 {
            return Err(EngineError::Config(
                "execution.max_concurrent_items must be at least 1".to_string(),
            ));
        }
        let pool = if self.execution.max_concurrent_items > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.execution.max_concurrent_items)
                .thread_name(|i| format!("emotion-batch-{i}"))
                .build()
                .map_err(|e| EngineError::Config(format!("Failed to start batch pool: {e}")))?;
            Some(pool)
        } else {
            None
        };

        Ok(InferenceEngine {
            extractors: [audio, motion, appearance],
            probe,
            classifier: self.classifier,
            calibrator: self.calibrator,
            execution: self.execution,
            pool,
        })
    }
}

fn slot(
    extractor: Option<Arc<dyn FeatureExtractor>>,
    modality: Modality,
) -> std::result::Result<Arc<dyn FeatureExtractor>, EngineError> {
    let extractor = extractor
        .ok_or_else(|| EngineError::Config(format!("no {modality} extractor configured")))?;
    if extractor.modality() != modality {
        return Err(EngineError::Config(format!(
            "{} extractor registered in the {modality} slot",
            extractor.modality()
        )));
    }
    Ok(extractor)
}
