/// FFmpeg-backed media access
///
/// Three entry points, each opening the container independently so that every
/// extractor reads the clip from the start:
/// 1. **probe**: container facts (streams, duration, dimensions)
/// 2. **audio**: mono f32 samples at a fixed rate (direct C FFI + libswresample)
/// 3. **frames**: lazy frame iterator (ffmpeg-next wrapper + swscale)
pub mod audio;
pub mod frames;

use emotion_fusion_common::{MediaClip, MediaInfo, MediaProbe, ProcessingError, Result};
use ffmpeg_next as ffmpeg;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, OnceLock};
use tracing::debug;

pub use audio::load_audio_mono_f32;
pub use frames::{Frame, FrameReader, PixelFormat};

/// Serialises FFmpeg's non-thread-safe setup calls
/// (`avformat_open_input`, `avformat_find_stream_info`, `avcodec_open2`).
///
/// Decode loops run without it.
static FFMPEG_INIT_LOCK: Mutex<()> = Mutex::new(());

pub(crate) fn init_lock() -> MutexGuard<'static, ()> {
    // The guarded section holds no data, so a poisoned lock is still usable
    FFMPEG_INIT_LOCK
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Initialize `FFmpeg` once per process. Safe to call repeatedly.
pub fn init() -> Result<()> {
    static INIT: OnceLock<std::result::Result<(), String>> = OnceLock::new();
    INIT.get_or_init(|| {
        ffmpeg::init().map_err(|e| e.to_string())?;
        ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Error);
        Ok(())
    })
    .clone()
    .map_err(|e| ProcessingError::FFmpegError(format!("Failed to initialize FFmpeg: {e}")))
}

/// Open a container and report its streams
///
/// # Errors
///
/// Returns `UnreadableMedia` if the container cannot be opened or parsed.
#[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
pub fn probe_media(path: &Path) -> Result<MediaInfo> {
    init()?;
    debug!("Probing media file: {:?}", path);

    let input = {
        let _lock = init_lock();
        ffmpeg::format::input(&path).map_err(|e| {
            ProcessingError::UnreadableMedia(format!("Failed to open {}: {e}", path.display()))
        })?
    };

    let format = input
        .format()
        .name()
        .split(',')
        .next()
        .unwrap_or("unknown")
        .to_string();

    let duration = if input.duration() > 0 {
        input.duration() as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE)
    } else {
        0.0
    };

    let mut info = MediaInfo {
        format,
        duration,
        has_audio: false,
        has_video: false,
        width: None,
        height: None,
        fps: None,
    };

    for stream in input.streams() {
        let codec = stream.parameters();
        match codec.medium() {
            ffmpeg::media::Type::Audio => info.has_audio = true,
            ffmpeg::media::Type::Video if !info.has_video => {
                info.has_video = true;
                // Parameters exposes no safe accessors for these in ffmpeg-next 8.0
                let (width, height) =
                    unsafe { ((*codec.as_ptr()).width, (*codec.as_ptr()).height) };
                info.width = Some(width.max(0) as u32);
                info.height = Some(height.max(0) as u32);
                let rate = stream.avg_frame_rate();
                if rate.1 > 0 {
                    info.fps = Some(f64::from(rate.0) / f64::from(rate.1));
                }
            }
            _ => {}
        }
    }

    debug!(
        "Probed {}: format={}, audio={}, video={}, duration={:.2}s",
        path.display(),
        info.format,
        info.has_audio,
        info.has_video,
        info.duration
    );

    Ok(info)
}

/// `MediaProbe` backed by libavformat
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegProbe;

impl MediaProbe for FfmpegProbe {
    fn probe(&self, clip: &MediaClip) -> Result<MediaInfo> {
        probe_media(clip.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_init_is_idempotent() {
        assert!(init().is_ok());
        assert!(init().is_ok());
    }

    #[test]
    fn test_probe_nonexistent_file() {
        let result = probe_media(Path::new("/nonexistent/video.mp4"));
        assert!(matches!(result, Err(ProcessingError::UnreadableMedia(_))));
    }

    #[test]
    fn test_probe_garbage_file() {
        let mut file = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
        file.write_all(&[0x42; 4096]).unwrap();

        // Depending on the demuxer this either fails to open or opens with no streams
        let result = FfmpegProbe.probe(&MediaClip::from_path(file.path()));
        assert!(result.map_or(true, |info| !info.has_any_stream()));
    }
}
