/// Orchestrator behaviour with injected extractors, probe and classifier weights
use emotion_fusion_common::{
    EmotionLabel, FeatureExtractor, MediaClip, MediaInfo, MediaProbe, Modality, ProcessingError,
    Result,
};
use emotion_fusion_model::{FusionClassifier, Linear};
use emotion_fusion_orchestrator::{
    BatchOutcome, EngineBuilder, ExecutionConfig, InferenceEngine, InferenceError,
};
use std::sync::Arc;

/// Accepts every clip except those whose name starts with `corrupt`
struct NameProbe;

impl MediaProbe for NameProbe {
    fn probe(&self, clip: &MediaClip) -> Result<MediaInfo> {
        if clip.name().starts_with("corrupt") {
            return Err(ProcessingError::UnreadableMedia(clip.name().to_string()));
        }
        Ok(MediaInfo {
            format: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
            duration: 3.0,
            has_audio: !clip.name().contains("silent"),
            has_video: true,
            width: Some(640),
            height: Some(480),
            fps: Some(30.0),
        })
    }
}

/// Values derived from the clip name so different clips predict differently
struct NameHashed(Modality);

impl FeatureExtractor for NameHashed {
    fn modality(&self) -> Modality {
        self.0
    }

    fn extract(&self, clip: &MediaClip) -> Result<Vec<f32>> {
        if clip.name().contains("silent") && self.0 == Modality::Audio {
            return Err(ProcessingError::NoAudioStream);
        }
        let seed = clip
            .name()
            .bytes()
            .fold(17u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
        Ok((0..self.0.dim())
            .map(|i| ((seed.wrapping_add(i as u32 * 2654435761) % 1000) as f32) / 250.0)
            .collect())
    }
}

/// Motion statistics read from the clip name: `moving` clips have large flow
struct NamedMotion;

impl FeatureExtractor for NamedMotion {
    fn modality(&self) -> Modality {
        Modality::Motion
    }

    fn extract(&self, clip: &MediaClip) -> Result<Vec<f32>> {
        Ok(if clip.name().contains("moving") {
            vec![4.0, 2.5, 12.0]
        } else {
            vec![0.01, 0.005, 0.02]
        })
    }
}

struct WrongLength;

impl FeatureExtractor for WrongLength {
    fn modality(&self) -> Modality {
        Modality::Appearance
    }

    fn extract(&self, _clip: &MediaClip) -> Result<Vec<f32>> {
        Ok(vec![0.0; 1000])
    }
}

struct Panicking;

impl FeatureExtractor for Panicking {
    fn modality(&self) -> Modality {
        Modality::Appearance
    }

    fn extract(&self, clip: &MediaClip) -> Result<Vec<f32>> {
        if clip.name().starts_with("boom") {
            panic!("decoder state corrupted");
        }
        Ok(vec![0.0; Modality::Appearance.dim()])
    }
}

/// Dense weights with a fixed pattern; every input affects every class
fn patterned_classifier() -> Arc<FusionClassifier> {
    let linears = FusionClassifier::LINEAR_SHAPES.map(|(fan_in, fan_out)| {
        let weight = (0..fan_in * fan_out)
            .map(|i| (((i * 37) % 101) as f32 - 50.0) / 500.0)
            .collect();
        let bias = (0..fan_out).map(|i| (i % 3) as f32 * 0.01).collect();
        Linear::new(fan_in, fan_out, weight, bias).unwrap()
    });
    Arc::new(FusionClassifier::from_linears(linears).unwrap())
}

/// Routes the motion features alone into the fearful and surprised logits
fn motion_sensitive_classifier() -> Arc<FusionClassifier> {
    let [(in0, out0), (in1, out1), (in2, out2)] = FusionClassifier::LINEAR_SHAPES;

    let mut w0 = vec![0.0; in0 * out0];
    for m in 0..Modality::Motion.dim() {
        w0[Modality::Audio.dim() + m] = 1.0;
    }
    let mut w1 = vec![0.0; in1 * out1];
    w1[0] = 1.0;
    let mut w2 = vec![0.0; in2 * out2];
    w2[EmotionLabel::Fearful.index() * in2] = 0.5;
    w2[EmotionLabel::Surprised.index() * in2] = 0.5;

    Arc::new(
        FusionClassifier::from_linears([
            Linear::new(in0, out0, w0, vec![0.0; out0]).unwrap(),
            Linear::new(in1, out1, w1, vec![0.0; out1]).unwrap(),
            Linear::new(in2, out2, w2, vec![0.0; out2]).unwrap(),
        ])
        .unwrap(),
    )
}

fn hashed_builder(classifier: Arc<FusionClassifier>) -> EngineBuilder {
    InferenceEngine::builder(classifier)
        .audio(Arc::new(NameHashed(Modality::Audio)))
        .motion(Arc::new(NameHashed(Modality::Motion)))
        .appearance(Arc::new(NameHashed(Modality::Appearance)))
        .probe(Arc::new(NameProbe))
}

fn engine() -> InferenceEngine {
    hashed_builder(patterned_classifier()).build().unwrap()
}

fn clip(name: &str) -> MediaClip {
    MediaClip::from_path(format!("/uploads/{name}"))
}

#[test]
fn test_distribution_is_normalised() {
    let engine = engine();
    for name in ["a.mp4", "b.mov", "c.webm", "silent.mkv"] {
        let prediction = engine.infer_one(clip(name)).unwrap();
        let sum: f64 = prediction.probabilities.as_slice().iter().sum();

        assert!((sum - 1.0).abs() < 1e-6);
        assert!(prediction.probabilities.as_slice().iter().all(|&p| p >= 0.0));
        assert_eq!(prediction.emotion.index(), prediction.emotion_id);
        assert_eq!(prediction.confidence, prediction.probabilities.get(prediction.emotion));
    }
}

#[test]
fn test_modality_dimensions_always_fixed() {
    let engine = engine();
    for name in ["a.mp4", "silent.mp4"] {
        let prediction = engine.infer_one(clip(name)).unwrap();
        let dims: Vec<(Modality, usize)> = prediction
            .modalities
            .iter()
            .map(|r| (r.modality, r.dim))
            .collect();
        assert_eq!(
            dims,
            vec![
                (Modality::Audio, 40),
                (Modality::Motion, 3),
                (Modality::Appearance, 512)
            ]
        );
    }
}

#[test]
fn test_missing_audio_falls_back_and_still_predicts() {
    let engine = engine();
    let prediction = engine.infer_one(clip("silent_interview.mp4")).unwrap();

    let audio = prediction.modality(Modality::Audio).unwrap();
    assert!(audio.fallback);
    assert_eq!(audio.reason.as_deref(), Some("No audio stream found"));
    assert_eq!(prediction.fallbacks().collect::<Vec<_>>(), vec![Modality::Audio]);
}

#[test]
fn test_infer_one_is_idempotent() {
    let engine = engine();
    let path = "/uploads/repeat.mp4";
    let first = engine.infer_one(MediaClip::from_path(path)).unwrap();
    let second = engine.infer_one(MediaClip::from_path(path)).unwrap();

    assert_eq!(first, second);
    for (a, b) in first
        .probabilities
        .as_slice()
        .iter()
        .zip(second.probabilities.as_slice())
    {
        assert_eq!(a.to_bits(), b.to_bits());
    }
}

#[test]
fn test_parallel_extractors_match_sequential() {
    let sequential = engine();
    let parallel = hashed_builder(patterned_classifier())
        .execution(ExecutionConfig {
            parallel_extractors: true,
            ..ExecutionConfig::default()
        })
        .build()
        .unwrap();

    for name in ["x.mp4", "y.mp4", "silent.mp4"] {
        assert_eq!(
            sequential.infer_one(clip(name)).unwrap(),
            parallel.infer_one(clip(name)).unwrap()
        );
    }
}

#[test]
fn test_batch_isolates_corrupt_item() {
    let engine = engine();
    let names = ["one.mp4", "two.mp4", "corrupt_upload.mp4", "four.mp4"];
    let result = engine.infer_batch(names.iter().map(|n| clip(n)).collect());

    assert_eq!(result.total, 4);
    assert_eq!(result.processed, 3);
    assert_eq!(result.items.len(), 4);
    for (i, (item, name)) in result.items.iter().zip(names).enumerate() {
        assert_eq!(item.index, i);
        assert_eq!(item.source, name);
    }

    let failed: Vec<_> = result.items.iter().filter_map(|i| i.error()).collect();
    assert_eq!(failed.len(), 1);
    assert!(result.items[2].error().is_some());
    assert!(failed[0].message.contains("corrupt_upload.mp4"));

    // Surviving items match their single-item predictions
    for (item, name) in result.items.iter().zip(names) {
        if let Some(prediction) = item.prediction() {
            assert_eq!(prediction, &engine.infer_one(clip(name)).unwrap());
        }
    }
}

#[test]
fn test_concurrent_batch_preserves_order() {
    let sequential = engine();
    let concurrent = hashed_builder(patterned_classifier())
        .execution(ExecutionConfig {
            max_concurrent_items: 3,
            ..ExecutionConfig::default()
        })
        .build()
        .unwrap();

    let names: Vec<String> = (0..12)
        .map(|i| {
            if i % 5 == 3 {
                format!("corrupt_{i}.mp4")
            } else {
                format!("clip_{i}.mp4")
            }
        })
        .collect();

    let a = sequential.infer_batch(names.iter().map(|n| clip(n)).collect());
    let b = concurrent.infer_batch(names.iter().map(|n| clip(n)).collect());

    assert_eq!(a, b);
    assert_eq!(b.processed, 10);
}

#[test]
fn test_panicking_extractor_falls_back() {
    let engine = InferenceEngine::builder(patterned_classifier())
        .audio(Arc::new(NameHashed(Modality::Audio)))
        .motion(Arc::new(NameHashed(Modality::Motion)))
        .appearance(Arc::new(Panicking))
        .probe(Arc::new(NameProbe))
        .build()
        .unwrap();

    let result = engine.infer_batch(vec![clip("fine.mp4"), clip("boom.mp4"), clip("ok.mp4")]);
    assert_eq!(result.processed, 3);

    let prediction = result.items[1].prediction().unwrap();
    let appearance = prediction.modality(Modality::Appearance).unwrap();
    assert!(appearance.fallback);
    assert_eq!(appearance.dim, 512);
    assert!(appearance
        .reason
        .as_deref()
        .unwrap()
        .contains("decoder state corrupted"));
    assert!(!prediction.modality(Modality::Audio).unwrap().fallback);
}

/// Panics on clips whose name starts with `boom`
struct PanickingProbe;

impl MediaProbe for PanickingProbe {
    fn probe(&self, clip: &MediaClip) -> Result<MediaInfo> {
        if clip.name().starts_with("boom") {
            panic!("demuxer state corrupted");
        }
        NameProbe.probe(clip)
    }
}

#[test]
fn test_panicking_item_is_item_error() {
    let engine = hashed_builder(patterned_classifier())
        .probe(Arc::new(PanickingProbe))
        .build()
        .unwrap();

    let result = engine.infer_batch(vec![clip("fine.mp4"), clip("boom.mp4"), clip("ok.mp4")]);
    assert_eq!(result.total, 3);
    assert_eq!(result.processed, 2);
    match &result.items[1].outcome {
        BatchOutcome::Failed(e) => assert!(e.message.contains("demuxer state corrupted")),
        BatchOutcome::Success(_) => panic!("panicking item reported success"),
    }
    assert!(result.items[2].prediction().is_some());
}

#[test]
fn test_wrong_length_extractor_is_shape_error() {
    let engine = InferenceEngine::builder(patterned_classifier())
        .audio(Arc::new(NameHashed(Modality::Audio)))
        .motion(Arc::new(NameHashed(Modality::Motion)))
        .appearance(Arc::new(WrongLength))
        .probe(Arc::new(NameProbe))
        .build()
        .unwrap();

    match engine.infer_one(clip("a.mp4")) {
        Err(InferenceError::FusionInputShape { expected, found }) => {
            assert_eq!(expected, 555);
            assert_eq!(found, 1043);
        }
        other => panic!("expected FusionInputShape, got {other:?}"),
    }
}

#[test]
fn test_temporary_clip_released_on_every_path() {
    let engine = engine();

    for name in ["upload.mp4", "corrupt.mp4"] {
        let temp = tempfile::NamedTempFile::new().unwrap().into_temp_path();
        let location = temp.to_path_buf();
        let outcome = engine.infer_one(MediaClip::from_temp(temp, name));

        assert_eq!(outcome.is_ok(), name == "upload.mp4");
        assert!(!location.exists(), "{name} left its file behind");
    }
}

#[test]
fn test_borrowed_clip_is_not_deleted() {
    let engine = engine();
    let file = tempfile::NamedTempFile::new().unwrap();
    engine.infer_one(MediaClip::from_path(file.path())).unwrap();
    assert!(file.path().exists());
}

#[test]
fn test_motion_perturbs_prediction() {
    let engine = InferenceEngine::builder(motion_sensitive_classifier())
        .audio(Arc::new(NameHashed(Modality::Audio)))
        .motion(Arc::new(NamedMotion))
        .appearance(Arc::new(NameHashed(Modality::Appearance)))
        .probe(Arc::new(NameProbe))
        .build()
        .unwrap();

    let calm = engine.infer_one(clip("static_bright.mp4")).unwrap();
    let agitated = engine.infer_one(clip("moving_shaky.mp4")).unwrap();

    for label in [EmotionLabel::Fearful, EmotionLabel::Surprised] {
        assert!(agitated.probabilities.get(label) > calm.probabilities.get(label));
    }
    // Ties between fearful and surprised resolve to the lower index
    assert_eq!(agitated.emotion, EmotionLabel::Fearful);
}

#[test]
fn test_prediction_serializes() {
    let prediction = engine().infer_one(clip("a.mp4")).unwrap();
    let json = serde_json::to_value(&prediction).unwrap();

    assert!(json["emotion"].is_string());
    assert_eq!(json["probabilities"].as_object().unwrap().len(), 8);
    assert_eq!(json["modalities"][2]["modality"], "appearance");
    assert_eq!(json["modalities"][2]["dim"], 512);
}
