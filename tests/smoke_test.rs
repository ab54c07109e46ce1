//! Smoke Test Suite - end-to-end checks against the release binary
//!
//! Needs the pretrained models under `models/` (or `EMOTION_FUSION_WEIGHTS` /
//! `EMOTION_FUSION_BACKBONE`) and a short clip in `EMOTION_FUSION_TEST_VIDEO`.
//!
//! Run: cargo build --release && cargo test --release --test smoke_test -- --ignored --test-threads=1

use std::env;
use std::path::PathBuf;
use std::process::{Command, Output};

fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("target/release/emotion-fusion")
}

/// Run the CLI with model overrides taken from the environment
fn run(args: &[&str]) -> Output {
    let mut command = Command::new(binary());
    if let Ok(weights) = env::var("EMOTION_FUSION_WEIGHTS") {
        command.arg("--weights").arg(weights);
    }
    if let Ok(backbone) = env::var("EMOTION_FUSION_BACKBONE") {
        command.arg("--backbone").arg(backbone);
    }
    command
        .args(args)
        .output()
        .expect("Failed to execute emotion-fusion")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({}): {}\nstderr: {}",
            e,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )
    })
}

fn test_video() -> String {
    env::var("EMOTION_FUSION_TEST_VIDEO").expect("EMOTION_FUSION_TEST_VIDEO not set")
}

fn assert_distribution(probabilities: &serde_json::Value) {
    let map = probabilities.as_object().expect("probabilities is an object");
    assert_eq!(map.len(), 8);
    let sum: f64 = map.values().map(|v| v.as_f64().unwrap()).sum();
    assert!((sum - 1.0).abs() < 1e-6, "sum = {}", sum);
}

#[test]
#[ignore]
fn smoke_health() {
    let output = run(&["health"]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["model_loaded"], true);
}

#[test]
#[ignore]
fn smoke_health_reports_missing_weights() {
    let output = Command::new(binary())
        .args(["--weights", "/nonexistent/fusion.safetensors", "health"])
        .output()
        .expect("Failed to execute emotion-fusion");
    assert!(!output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["model_loaded"], false);
}

#[test]
#[ignore]
fn smoke_model_info() {
    let output = run(&["model-info"]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["num_classes"], 8);
    assert_eq!(json["input_dims"]["fused"], 555);
    assert_eq!(json["temperature"], 2.5);
}

#[test]
#[ignore]
fn smoke_predict() {
    let video = test_video();
    let output = run(&["predict", &video]);
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );

    let json = stdout_json(&output);
    assert_eq!(json["status"], "success");
    assert_distribution(&json["probabilities"]);
    assert_eq!(json["features"]["audio"]["shape"][0], 40);
    assert_eq!(json["features"]["motion"]["shape"][0], 3);
    assert_eq!(json["features"]["appearance"]["shape"][0], 512);
}

#[test]
#[ignore]
fn smoke_predict_rejects_unsupported_extension() {
    let file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
    let output = run(&["predict", file.path().to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unsupported file type"));
}

#[test]
#[ignore]
fn smoke_batch_isolates_bad_files() {
    let video = test_video();
    let corrupt = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
    std::fs::write(corrupt.path(), b"not a video").unwrap();
    let corrupt_path = corrupt.path().to_str().unwrap().to_string();

    let output = run(&["batch", &video, &corrupt_path, "missing.mkv", &video]);
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["total_files"], 4);
    assert_eq!(json["processed"], 2);
    let results = json["results"].as_array().unwrap();
    assert_eq!(results[0]["status"], "success");
    assert_eq!(results[1]["status"], "error");
    assert_eq!(results[2]["status"], "error");
    assert_eq!(results[2]["filename"], "missing.mkv");
    assert_eq!(results[3]["status"], "success");
    assert_eq!(results[0]["probabilities"], results[3]["probabilities"]);
}
