//! Checks applied to a file before it reaches the engine

use std::path::Path;
use thiserror::Error;

/// Container extensions the engine is known to decode
pub const ALLOWED_EXTENSIONS: [&str; 5] = ["mp4", "avi", "mov", "mkv", "webm"];

pub const DEFAULT_MAX_SIZE_MB: u64 = 100;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Unsupported file type {extension:?}; allowed: {}", ALLOWED_EXTENSIONS.join(", "))]
    UnsupportedExtension { extension: String },

    #[error("File is {size} bytes, limit is {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    #[error("Cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Size limit in bytes for a limit given in megabytes
#[must_use]
pub fn limit_bytes(max_size_mb: u64) -> u64 {
    max_size_mb.saturating_mul(1024 * 1024)
}

/// Reject files with an unknown extension, missing files and oversized files
pub fn validate(path: &Path, max_bytes: u64) -> Result<(), UploadError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(UploadError::UnsupportedExtension { extension });
    }

    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(UploadError::NotFound(path.display().to_string()));
        }
        Err(source) => {
            return Err(UploadError::Io {
                path: path.display().to_string(),
                source,
            });
        }
    };
    if !metadata.is_file() {
        return Err(UploadError::NotFound(path.display().to_string()));
    }
    if metadata.len() > max_bytes {
        return Err(UploadError::TooLarge {
            size: metadata.len(),
            limit: max_bytes,
        });
    }
    Ok(())
}
