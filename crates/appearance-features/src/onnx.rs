//! ONNX Runtime session construction

use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, warn};

/// Environment override for the intra-op thread count
pub const THREADS_ENV: &str = "EMOTION_FUSION_THREADS";

/// Failure to bring up the appearance backbone
#[derive(Debug, thiserror::Error)]
pub enum OnnxError {
    #[error("Backbone model not found: {0}")]
    ModelNotFound(String),

    #[error("Cannot configure ONNX Runtime session: {0}")]
    Session(String),

    #[error("Cannot load backbone {path}: {reason}")]
    Load { path: String, reason: String },

    #[error("Backbone output has {found} values, expected {expected}")]
    UnexpectedOutput { expected: usize, found: usize },

    #[error("Backbone warm-up failed: {0}")]
    WarmUp(String),
}

fn session_error(e: impl std::fmt::Display) -> OnnxError {
    OnnxError::Session(e.to_string())
}

/// Intra-op threads: explicit setting, then `EMOTION_FUSION_THREADS`, then physical cores
#[must_use]
pub fn intra_threads(configured: Option<usize>) -> usize {
    configured
        .or_else(|| {
            std::env::var(THREADS_ENV)
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
        })
        .filter(|&n| n > 0)
        .unwrap_or_else(num_cpus::get_physical)
}

/// Lock a shared session, recovering the guard if an earlier run panicked
pub(crate) fn lock_session<T>(session: &Mutex<T>) -> MutexGuard<'_, T> {
    session.lock().unwrap_or_else(|poisoned| {
        warn!("Backbone session lock was poisoned by a panic; recovering");
        PoisonError::into_inner(poisoned)
    })
}

/// Create a CPU session with full graph optimisation
pub fn create_session(model_path: &Path, threads: Option<usize>) -> Result<Session, OnnxError> {
    if !model_path.exists() {
        return Err(OnnxError::ModelNotFound(model_path.display().to_string()));
    }

    let start = Instant::now();
    let num_threads = intra_threads(threads);

    let session = Session::builder()
        .map_err(session_error)?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(session_error)?
        .with_intra_threads(num_threads)
        .map_err(session_error)?
        .with_memory_pattern(true)
        .map_err(session_error)?
        .with_execution_providers([CPUExecutionProvider::default().build()])
        .map_err(session_error)?
        .commit_from_file(model_path)
        .map_err(|e| OnnxError::Load {
            path: model_path.display().to_string(),
            reason: e.to_string(),
        })?;

    debug!(
        "ONNX session for {} ready in {:.3}s ({} threads)",
        model_path.display(),
        start.elapsed().as_secs_f64(),
        num_threads
    );
    Ok(session)
}
