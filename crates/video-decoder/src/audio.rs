//! Mono f32 audio loading through libavcodec + libswresample
//!
//! # Safety
//!
//! Every FFmpeg object is owned by a small RAII wrapper whose `Drop` frees
//! it, so early returns on error never leak contexts, packets or frames.

use crate::init_lock;
use emotion_fusion_common::{ProcessingError, Result};
use ffmpeg_sys_next as ffi;
use std::ffi::CString;
use std::os::raw::c_int;
use std::path::Path;
use std::ptr;
use tracing::debug;

struct FormatContext {
    ptr: *mut ffi::AVFormatContext,
}

impl FormatContext {
    fn open(path: &Path) -> Result<Self> {
        let path_str = path.to_str().ok_or_else(|| {
            ProcessingError::UnreadableMedia(format!("Invalid path encoding: {}", path.display()))
        })?;
        let path_cstr = CString::new(path_str)
            .map_err(|e| ProcessingError::UnreadableMedia(format!("CString error: {e}")))?;

        let mut ptr: *mut ffi::AVFormatContext = ptr::null_mut();
        let _lock = init_lock();

        unsafe {
            let ret = ffi::avformat_open_input(
                &mut ptr,
                path_cstr.as_ptr(),
                ptr::null_mut(),
                ptr::null_mut(),
            );
            if ret < 0 {
                return Err(ProcessingError::UnreadableMedia(format!(
                    "avformat_open_input failed for {}: {ret}",
                    path.display()
                )));
            }

            let ret = ffi::avformat_find_stream_info(ptr, ptr::null_mut());
            if ret < 0 {
                ffi::avformat_close_input(&mut ptr);
                return Err(ProcessingError::UnreadableMedia(format!(
                    "avformat_find_stream_info failed: {ret}"
                )));
            }
        }

        Ok(Self { ptr })
    }

    /// Best audio stream index and its decoder
    fn find_audio_stream(&self) -> Result<(c_int, *const ffi::AVCodec)> {
        let mut decoder: *const ffi::AVCodec = ptr::null();
        let index = unsafe {
            ffi::av_find_best_stream(
                self.ptr,
                ffi::AVMediaType::AVMEDIA_TYPE_AUDIO,
                -1,
                -1,
                &mut decoder,
                0,
            )
        };

        if index < 0 {
            return Err(ProcessingError::NoAudioStream);
        }
        if decoder.is_null() {
            return Err(ProcessingError::FFmpegError(
                "No decoder found for audio stream".to_string(),
            ));
        }
        Ok((index, decoder))
    }

    fn codecpar(&self, stream_index: c_int) -> *mut ffi::AVCodecParameters {
        unsafe {
            let stream = *(*self.ptr).streams.offset(stream_index as isize);
            (*stream).codecpar
        }
    }
}

impl Drop for FormatContext {
    fn drop(&mut self) {
        unsafe {
            if !self.ptr.is_null() {
                ffi::avformat_close_input(&mut self.ptr);
            }
        }
    }
}

struct CodecContext {
    ptr: *mut ffi::AVCodecContext,
}

impl CodecContext {
    /// # Safety
    /// `codec` and `codecpar` must come from the same open `FormatContext`
    unsafe fn open(
        codec: *const ffi::AVCodec,
        codecpar: *const ffi::AVCodecParameters,
    ) -> Result<Self> {
        let ptr = ffi::avcodec_alloc_context3(codec);
        if ptr.is_null() {
            return Err(ProcessingError::FFmpegError(
                "avcodec_alloc_context3 failed".to_string(),
            ));
        }
        // From here on Drop frees the context on every early return
        let ctx = Self { ptr };

        let ret = ffi::avcodec_parameters_to_context(ctx.ptr, codecpar);
        if ret < 0 {
            return Err(ProcessingError::FFmpegError(format!(
                "avcodec_parameters_to_context failed: {ret}"
            )));
        }

        let _lock = init_lock();
        let ret = ffi::avcodec_open2(ctx.ptr, codec, ptr::null_mut());
        if ret < 0 {
            return Err(ProcessingError::FFmpegError(format!(
                "avcodec_open2 failed: {ret}"
            )));
        }

        Ok(ctx)
    }
}

impl Drop for CodecContext {
    fn drop(&mut self) {
        unsafe {
            if !self.ptr.is_null() {
                ffi::avcodec_free_context(&mut self.ptr);
            }
        }
    }
}

struct ChannelLayout(ffi::AVChannelLayout);

impl ChannelLayout {
    fn default_for(channels: c_int) -> Self {
        unsafe {
            let mut layout = std::mem::zeroed::<ffi::AVChannelLayout>();
            ffi::av_channel_layout_default(&mut layout, channels);
            Self(layout)
        }
    }

    /// Copy the decoder's layout, substituting the default order when the
    /// stream leaves it unspecified (swresample rejects UNSPEC layouts)
    unsafe fn from_decoder(ctx: *const ffi::AVCodecContext) -> Result<Self> {
        let source = &(*ctx).ch_layout;
        if source.order == ffi::AVChannelOrder::AV_CHANNEL_ORDER_UNSPEC {
            return Ok(Self::default_for(source.nb_channels.max(1)));
        }

        let mut layout = std::mem::zeroed::<ffi::AVChannelLayout>();
        let ret = ffi::av_channel_layout_copy(&mut layout, source);
        if ret < 0 {
            return Err(ProcessingError::FFmpegError(format!(
                "av_channel_layout_copy failed: {ret}"
            )));
        }
        Ok(Self(layout))
    }
}

impl Drop for ChannelLayout {
    fn drop(&mut self) {
        unsafe { ffi::av_channel_layout_uninit(&mut self.0) }
    }
}

/// Rematrix coefficients for averaging `channels` inputs into one output.
///
/// libswresample's default stereo-to-mono matrix uses 1/sqrt(2) per channel
/// and leaves float output unnormalised; the features expect the plain mean.
fn mono_downmix_matrix(channels: usize) -> Vec<f64> {
    let channels = channels.max(1);
    vec![1.0 / channels as f64; channels]
}

struct Resampler {
    ptr: *mut ffi::SwrContext,
}

impl Resampler {
    /// Resampler from the decoder's native format to packed mono f32
    unsafe fn to_mono_f32(dec: &CodecContext, out_rate: c_int) -> Result<Self> {
        let in_layout = ChannelLayout::from_decoder(dec.ptr)?;
        let out_layout = ChannelLayout::default_for(1);

        let mut ptr: *mut ffi::SwrContext = ptr::null_mut();
        let ret = ffi::swr_alloc_set_opts2(
            &mut ptr,
            &out_layout.0,
            ffi::AVSampleFormat::AV_SAMPLE_FMT_FLT,
            out_rate,
            &in_layout.0,
            (*dec.ptr).sample_fmt,
            (*dec.ptr).sample_rate,
            0,
            ptr::null_mut(),
        );
        if ret < 0 || ptr.is_null() {
            return Err(ProcessingError::FFmpegError(format!(
                "swr_alloc_set_opts2 failed: {ret}"
            )));
        }
        let resampler = Self { ptr };

        let channels = usize::try_from(in_layout.0.nb_channels).unwrap_or(1);
        let matrix = mono_downmix_matrix(channels);
        let stride = c_int::try_from(matrix.len())
            .map_err(|_| ProcessingError::FFmpegError(format!("Too many channels: {channels}")))?;
        let ret = ffi::swr_set_matrix(resampler.ptr, matrix.as_ptr(), stride);
        if ret < 0 {
            return Err(ProcessingError::FFmpegError(format!(
                "swr_set_matrix failed: {ret}"
            )));
        }

        let ret = ffi::swr_init(resampler.ptr);
        if ret < 0 {
            return Err(ProcessingError::FFmpegError(format!("swr_init failed: {ret}")));
        }
        Ok(resampler)
    }

    /// Convert `in_count` samples (or flush buffered delay when `input` is null)
    /// and append the mono output to `out`
    unsafe fn convert_into(
        &self,
        input: *const *const u8,
        in_count: c_int,
        out: &mut Vec<f32>,
    ) -> Result<c_int> {
        let capacity = ffi::swr_get_out_samples(self.ptr, in_count);
        if capacity <= 0 {
            return Ok(0);
        }

        let start = out.len();
        out.resize(start + capacity as usize, 0.0);
        let mut out_ptr = out[start..].as_mut_ptr().cast::<u8>();

        let converted = ffi::swr_convert(
            self.ptr,
            &mut out_ptr as *mut *mut u8 as _,
            capacity,
            input,
            in_count,
        );
        if converted < 0 {
            out.truncate(start);
            return Err(ProcessingError::FFmpegError(format!(
                "swr_convert failed: {converted}"
            )));
        }
        out.truncate(start + converted as usize);
        Ok(converted)
    }
}

impl Drop for Resampler {
    fn drop(&mut self) {
        unsafe {
            if !self.ptr.is_null() {
                ffi::swr_free(&mut self.ptr);
            }
        }
    }
}

struct AvPacket(*mut ffi::AVPacket);

impl Drop for AvPacket {
    fn drop(&mut self) {
        unsafe { ffi::av_packet_free(&mut self.0) }
    }
}

struct AvFrame(*mut ffi::AVFrame);

impl Drop for AvFrame {
    fn drop(&mut self) {
        unsafe { ffi::av_frame_free(&mut self.0) }
    }
}

/// Drain every frame the decoder currently holds through the resampler
unsafe fn drain_decoder(
    dec: &CodecContext,
    frame: &AvFrame,
    swr: &Resampler,
    samples: &mut Vec<f32>,
) -> Result<()> {
    // Negative return means EAGAIN (needs input) or EOF
    while ffi::avcodec_receive_frame(dec.ptr, frame.0) >= 0 {
        let result = swr.convert_into(
            (*frame.0).extended_data as *const *const u8,
            (*frame.0).nb_samples,
            samples,
        );
        ffi::av_frame_unref(frame.0);
        result?;
    }
    Ok(())
}

/// Decode the best audio stream of `input_path` as mono f32 at `sample_rate`
///
/// Multi-channel audio is downmixed to the mean of its channels. The resampler's internal
/// delay is flushed at the end, so the output length matches the clip duration.
///
/// # Errors
///
/// Returns `UnreadableMedia` if the container cannot be opened,
/// `NoAudioStream` if it has no audio, and `FFmpegError` for decoder or
/// resampler failures. Corrupt packets are skipped.
pub fn load_audio_mono_f32(input_path: &Path, sample_rate: u32) -> Result<Vec<f32>> {
    crate::init()?;

    let out_rate = c_int::try_from(sample_rate)
        .map_err(|_| ProcessingError::Other(format!("Invalid sample rate: {sample_rate}")))?;

    let fmt_ctx = FormatContext::open(input_path)?;
    let (stream_index, decoder) = fmt_ctx.find_audio_stream()?;

    unsafe {
        let dec = CodecContext::open(decoder, fmt_ctx.codecpar(stream_index))?;
        let swr = Resampler::to_mono_f32(&dec, out_rate)?;

        let pkt = AvPacket(ffi::av_packet_alloc());
        let frame = AvFrame(ffi::av_frame_alloc());
        if pkt.0.is_null() || frame.0.is_null() {
            return Err(ProcessingError::FFmpegError(
                "Failed to allocate packet/frame".to_string(),
            ));
        }

        let mut samples = Vec::<f32>::new();

        while ffi::av_read_frame(fmt_ctx.ptr, pkt.0) >= 0 {
            if (*pkt.0).stream_index != stream_index {
                ffi::av_packet_unref(pkt.0);
                continue;
            }

            let ret = ffi::avcodec_send_packet(dec.ptr, pkt.0);
            ffi::av_packet_unref(pkt.0);
            if ret < 0 {
                continue; // Skip corrupted packets
            }

            drain_decoder(&dec, &frame, &swr, &mut samples)?;
        }

        // Flush decoder, then resampler delay
        if ffi::avcodec_send_packet(dec.ptr, ptr::null()) >= 0 {
            drain_decoder(&dec, &frame, &swr, &mut samples)?;
        }
        while swr.convert_into(ptr::null(), 0, &mut samples)? > 0 {}

        debug!(
            "Decoded {} mono samples at {} Hz from {}",
            samples.len(),
            sample_rate,
            input_path.display()
        );

        Ok(samples)
    }
}
