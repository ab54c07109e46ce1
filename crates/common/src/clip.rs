//! Media clip handle
//!
//! A `MediaClip` is created by the caller before extraction, read (never
//! mutated) by every extractor, and released once the inference call that
//! consumed it returns. Extractors only ever see `&MediaClip`, so they cannot
//! delete the underlying file.

use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, warn};

#[derive(Debug)]
enum Backing {
    /// The caller owns the file and is responsible for it
    Borrowed(PathBuf),
    /// The clip owns a temporary file that is deleted on release
    Temporary(TempPath),
}

/// Read-only handle to a decodable audio+video source
#[derive(Debug)]
pub struct MediaClip {
    backing: Backing,
    name: String,
}

impl MediaClip {
    /// Wrap a file the caller keeps ownership of
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = display_name(&path);
        Self {
            backing: Backing::Borrowed(path),
            name,
        }
    }

    /// Wrap a temporary file; the clip deletes it when released or dropped
    pub fn from_temp(path: TempPath, name: impl Into<String>) -> Self {
        Self {
            backing: Backing::Temporary(path),
            name: name.into(),
        }
    }

    /// Filesystem location of the clip
    #[must_use]
    pub fn path(&self) -> &Path {
        match &self.backing {
            Backing::Borrowed(path) => path,
            Backing::Temporary(path) => path,
        }
    }

    /// Human-readable name used in logs and batch reports
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether releasing this clip deletes its backing file
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        matches!(self.backing, Backing::Temporary(_))
    }

    /// Release the backing storage.
    ///
    /// Temporary files are deleted; a deletion failure is logged, not returned,
    /// because the inference outcome is already decided by the time we get here.
    pub fn release(self) {
        match self.backing {
            Backing::Borrowed(path) => {
                debug!("Released borrowed clip {}", path.display());
            }
            Backing::Temporary(path) => {
                let location = path.to_path_buf();
                match path.close() {
                    Ok(()) => debug!("Deleted temporary clip {}", location.display()),
                    Err(e) => warn!(
                        "Failed to delete temporary clip {}: {}",
                        location.display(),
                        e
                    ),
                }
            }
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
