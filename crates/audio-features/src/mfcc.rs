//! Time-averaged MFCC computation
//!
//! Pipeline per frame: centred Hann-windowed STFT -> power spectrum ->
//! mel filterbank -> decibels. The decibel matrix is clamped to `top_db`
//! below its global maximum, averaged over time, and projected with an
//! orthonormal DCT-II onto the first [`N_MFCC`] coefficients.

use crate::mel::MelFilterbank;
use emotion_fusion_common::features::AUDIO_DIM;
use emotion_fusion_common::{ProcessingError, Result};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::Arc;

/// Number of cepstral coefficients kept
pub const N_MFCC: usize = AUDIO_DIM;

/// Floor applied before taking the logarithm of mel power
const AMIN: f64 = 1e-10;

/// MFCC analysis parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MfccConfig {
    /// Audio is resampled to this rate before analysis (Hz)
    pub sample_rate: u32,
    /// FFT size (window length)
    pub n_fft: usize,
    /// Samples between successive frames
    pub hop_length: usize,
    /// Number of mel bands
    pub n_mels: usize,
    /// Dynamic range kept below the loudest mel cell (dB)
    pub top_db: f64,
}

impl Default for MfccConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            n_fft: 2048,
            hop_length: 512,
            n_mels: 128,
            top_db: 80.0,
        }
    }
}

impl MfccConfig {
    /// Reject parameters the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(ProcessingError::InvalidConfig(
                "audio.sample_rate must be positive".to_string(),
            ));
        }
        if self.n_fft < 2 || self.hop_length == 0 {
            return Err(ProcessingError::InvalidConfig(format!(
                "audio.n_fft ({}) must be >= 2 and audio.hop_length ({}) positive",
                self.n_fft, self.hop_length
            )));
        }
        if self.n_mels < N_MFCC {
            return Err(ProcessingError::InvalidConfig(format!(
                "audio.n_mels ({}) must be at least {N_MFCC}",
                self.n_mels
            )));
        }
        if !(self.top_db.is_finite() && self.top_db >= 0.0) {
            return Err(ProcessingError::InvalidConfig(format!(
                "audio.top_db ({}) must be a non-negative number",
                self.top_db
            )));
        }
        Ok(())
    }
}

/// Row-major `n_out x n` orthonormal DCT-II basis
#[must_use]
pub fn dct_matrix(n_out: usize, n: usize) -> Vec<f64> {
    let nf = n as f64;
    let mut basis = Vec::with_capacity(n_out * n);
    for k in 0..n_out {
        let scale = if k == 0 {
            (1.0 / nf).sqrt()
        } else {
            (2.0 / nf).sqrt()
        };
        for i in 0..n {
            basis.push(scale * (PI * k as f64 * (2 * i + 1) as f64 / (2.0 * nf)).cos());
        }
    }
    basis
}

/// Precomputed MFCC pipeline; immutable and shareable across threads
pub struct Mfcc {
    config: MfccConfig,
    window: Vec<f64>,
    filterbank: MelFilterbank,
    dct: Vec<f64>,
    fft: Arc<dyn Fft<f64>>,
}

impl Mfcc {
    pub fn new(config: MfccConfig) -> Result<Self> {
        config.validate()?;

        let n_fft = config.n_fft;
        // Periodic Hann
        let window = (0..n_fft)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / n_fft as f64).cos())
            .collect();
        let filterbank = MelFilterbank::new(
            config.sample_rate,
            n_fft,
            config.n_mels,
            0.0,
            f64::from(config.sample_rate) / 2.0,
        );
        let dct = dct_matrix(N_MFCC, config.n_mels);
        let fft = FftPlanner::<f64>::new().plan_fft_forward(n_fft);

        Ok(Self {
            config,
            window,
            filterbank,
            dct,
            fft,
        })
    }

    #[must_use]
    pub fn config(&self) -> &MfccConfig {
        &self.config
    }

    /// Number of STFT frames for a signal of `len` samples
    #[must_use]
    pub fn frame_count(&self, len: usize) -> usize {
        1 + len / self.config.hop_length
    }

    /// Log-mel spectrogram in decibels, frame-major (`frames x n_mels`),
    /// before the `top_db` clamp
    fn log_mel_frames(&self, samples: &[f32]) -> Vec<f64> {
        let n_fft = self.config.n_fft;
        let hop = self.config.hop_length;
        let n_mels = self.config.n_mels;
        let pad = n_fft / 2;
        let n_frames = self.frame_count(samples.len());

        let mut db = Vec::with_capacity(n_frames * n_mels);
        let mut buffer = vec![Complex::new(0.0, 0.0); n_fft];
        let mut power = vec![0.0; self.filterbank.n_bins()];
        let mut mel = vec![0.0; n_mels];

        for frame in 0..n_frames {
            // Frame starts `pad` samples before its centre; out-of-range samples are zero
            let start = (frame * hop) as isize - pad as isize;
            for (i, slot) in buffer.iter_mut().enumerate() {
                let idx = start + i as isize;
                let sample = if idx >= 0 && (idx as usize) < samples.len() {
                    f64::from(samples[idx as usize])
                } else {
                    0.0
                };
                *slot = Complex::new(sample * self.window[i], 0.0);
            }

            self.fft.process(&mut buffer);

            for (p, c) in power.iter_mut().zip(&buffer) {
                *p = c.norm_sqr();
            }
            self.filterbank.apply(&power, &mut mel);
            db.extend(mel.iter().map(|&m| 10.0 * m.max(AMIN).log10()));
        }

        db
    }

    /// Time-averaged MFCC vector of a mono signal
    ///
    /// # Errors
    ///
    /// Returns `EmptyAudio` for an empty signal.
    pub fn mean_mfcc(&self, samples: &[f32]) -> Result<Vec<f32>> {
        if samples.is_empty() {
            return Err(ProcessingError::EmptyAudio);
        }

        let n_mels = self.config.n_mels;
        let db = self.log_mel_frames(samples);
        let n_frames = db.len() / n_mels;

        let peak = db.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let floor = peak - self.config.top_db;

        let mut mean_db = vec![0.0; n_mels];
        for frame in db.chunks_exact(n_mels) {
            for (acc, &value) in mean_db.iter_mut().zip(frame) {
                *acc += value.max(floor);
            }
        }
        for acc in &mut mean_db {
            *acc /= n_frames as f64;
        }

        // The DCT is linear, so transforming the time mean equals averaging per-frame MFCCs
        Ok(self
            .dct
            .chunks_exact(n_mels)
            .map(|basis| basis.iter().zip(&mean_db).map(|(b, x)| b * x).sum::<f64>() as f32)
            .collect())
    }
}
