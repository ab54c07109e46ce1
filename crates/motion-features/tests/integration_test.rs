/// Motion extractor against a real clip (`EMOTION_FUSION_TEST_VIDEO`, run with `--ignored`)
use emotion_fusion_common::{FeatureExtractor, MediaClip};
use emotion_fusion_motion::{MotionConfig, MotionFeatureExtractor, N_MOTION};
use std::path::PathBuf;

fn test_video_path() -> Option<PathBuf> {
    let path = PathBuf::from(std::env::var("EMOTION_FUSION_TEST_VIDEO").ok()?);
    path.exists().then_some(path)
}

#[test]
#[ignore]
fn test_real_clip_motion_statistics() {
    let Some(path) = test_video_path() else {
        eprintln!("Skipping: EMOTION_FUSION_TEST_VIDEO not set or missing");
        return;
    };

    let extractor = MotionFeatureExtractor::new(MotionConfig::default()).unwrap();
    let clip = MediaClip::from_path(&path);

    let features = extractor.extract(&clip).expect("motion extraction failed");
    assert_eq!(features.len(), N_MOTION);

    let (mean, std, max) = (features[0], features[1], features[2]);
    assert!(mean >= 0.0 && std >= 0.0);
    assert!(max >= mean);

    // Re-opening the clip restarts the frame sequence
    assert_eq!(extractor.extract(&clip).unwrap(), features);
}
