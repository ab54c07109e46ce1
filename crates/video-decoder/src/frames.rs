//! Lazy video frame decoding
//!
//! `FrameReader` pulls packets on demand, so only the frames currently held
//! by the caller are in memory. Re-opening the path restarts the sequence.

use crate::init_lock;
use emotion_fusion_common::{ProcessingError, Result};
use ffmpeg_next as ffmpeg;
use std::path::Path;
use tracing::{debug, warn};

/// Pixel format for decoded frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit luma, 1 byte per pixel (optical flow input)
    Gray8,
    /// Packed RGB, 3 bytes per pixel (image model input)
    Rgb24,
}

impl PixelFormat {
    fn to_ffmpeg_format(self) -> ffmpeg::format::Pixel {
        match self {
            PixelFormat::Gray8 => ffmpeg::format::Pixel::GRAY8,
            PixelFormat::Rgb24 => ffmpeg::format::Pixel::RGB24,
        }
    }

    /// Bytes per pixel in the packed output
    #[must_use]
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb24 => 3,
        }
    }
}

/// Decoded video frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame number (0-indexed, decode order)
    pub index: u64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Packed rows, no stride padding (`width * height * channels` bytes)
    pub data: Vec<u8>,
}

struct Scaler {
    context: ffmpeg::software::scaling::Context,
    src_format: ffmpeg::format::Pixel,
    width: u32,
    height: u32,
}

/// Finite, lazily decoded sequence of frames from the best video stream
pub struct FrameReader {
    input: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    stream_index: usize,
    format: PixelFormat,
    scaler: Option<Scaler>,
    decoded: ffmpeg::util::frame::video::Video,
    next_index: u64,
    eof_sent: bool,
    finished: bool,
}

impl FrameReader {
    /// Open `path` and position the reader before its first frame
    ///
    /// # Errors
    ///
    /// Returns `UnreadableMedia` if the container cannot be opened,
    /// `NoVideoStream` if it has no video, and `FFmpegError` if the decoder
    /// cannot be created.
    pub fn open(path: &Path, format: PixelFormat) -> Result<Self> {
        crate::init()?;

        let _lock = init_lock();
        let input = ffmpeg::format::input(&path).map_err(|e| {
            ProcessingError::UnreadableMedia(format!("Failed to open {}: {e}", path.display()))
        })?;

        let video_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or(ProcessingError::NoVideoStream)?;
        let stream_index = video_stream.index();

        let decoder = ffmpeg::codec::context::Context::from_parameters(video_stream.parameters())
            .map_err(|e| ProcessingError::FFmpegError(format!("Failed to create context: {e}")))?
            .decoder()
            .video()
            .map_err(|e| ProcessingError::FFmpegError(format!("Failed to create decoder: {e}")))?;
        drop(_lock);

        debug!(
            "Opened video stream {} of {} ({}x{})",
            stream_index,
            path.display(),
            decoder.width(),
            decoder.height()
        );

        Ok(Self {
            input,
            decoder,
            stream_index,
            format,
            scaler: None,
            decoded: ffmpeg::util::frame::video::Video::empty(),
            next_index: 0,
            eof_sent: false,
            finished: false,
        })
    }

    /// Read only the first decodable frame
    pub fn first_frame(path: &Path, format: PixelFormat) -> Result<Frame> {
        Self::open(path, format)?
            .next()
            .unwrap_or(Err(ProcessingError::InsufficientFrames {
                found: 0,
                required: 1,
            }))
    }

    /// Feed the decoder one packet from the video stream.
    /// Returns `false` once the demuxer is exhausted and EOF has been sent.
    fn feed(&mut self) -> bool {
        if self.eof_sent {
            return false;
        }

        let mut packet = ffmpeg::Packet::empty();
        match packet.read(&mut self.input) {
            Ok(()) => {
                if packet.stream() == self.stream_index {
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        // Corrupt packets are skipped
                        debug!("Skipping undecodable packet: {e}");
                    }
                }
            }
            Err(ffmpeg::Error::Eof) => {
                self.decoder.send_eof().ok();
                self.eof_sent = true;
            }
            Err(e) => {
                warn!("Demuxer error, ending frame sequence: {e}");
                self.decoder.send_eof().ok();
                self.eof_sent = true;
            }
        }
        true
    }

    /// Convert the frame held in `self.decoded` to the output format
    fn convert(&mut self) -> Result<Frame> {
        let src_format = self.decoded.format();
        let width = self.decoded.width();
        let height = self.decoded.height();

        let stale = match &self.scaler {
            Some(s) => s.src_format != src_format || s.width != width || s.height != height,
            None => true,
        };
        if stale {
            let context = ffmpeg::software::scaling::Context::get(
                src_format,
                width,
                height,
                self.format.to_ffmpeg_format(),
                width,
                height,
                ffmpeg::software::scaling::Flags::BILINEAR,
            )
            .map_err(|e| ProcessingError::FFmpegError(format!("Failed to create scaler: {e}")))?;
            self.scaler = Some(Scaler {
                context,
                src_format,
                width,
                height,
            });
        }

        let mut converted = ffmpeg::util::frame::video::Video::empty();
        if let Some(scaler) = self.scaler.as_mut() {
            scaler
                .context
                .run(&self.decoded, &mut converted)
                .map_err(|e| ProcessingError::FFmpegError(format!("Failed to convert frame: {e}")))?;
        }

        let frame = Frame {
            index: self.next_index,
            width,
            height,
            format: self.format,
            data: copy_packed(&converted, self.format),
        };
        self.next_index += 1;
        Ok(frame)
    }
}

impl Iterator for FrameReader {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            if self.decoder.receive_frame(&mut self.decoded).is_ok() {
                let frame = self.convert();
                if frame.is_err() {
                    self.finished = true;
                }
                return Some(frame);
            }
            if !self.feed() {
                self.finished = true;
            }
        }
        None
    }
}

/// Copy frame rows into a contiguous buffer, dropping stride padding
fn copy_packed(frame: &ffmpeg::util::frame::video::Video, format: PixelFormat) -> Vec<u8> {
    let row_bytes = frame.width() as usize * format.channels();
    let height = frame.height() as usize;
    let stride = frame.stride(0);
    let plane = frame.data(0);

    let mut data = Vec::with_capacity(row_bytes * height);
    for y in 0..height {
        let row_start = y * stride;
        data.extend_from_slice(&plane[row_start..row_start + row_bytes]);
    }
    data
}
