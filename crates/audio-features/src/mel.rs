//! Slaney-style mel scale and filterbank

/// Linear region slope of the Slaney mel scale (Hz per mel)
const F_SP: f64 = 200.0 / 3.0;
/// Start of the logarithmic region
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

fn log_step() -> f64 {
    6.4f64.ln() / 27.0
}

/// Convert Hz to Slaney mels (linear below 1 kHz, logarithmic above)
#[must_use]
pub fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

/// Inverse of [`hz_to_mel`]
#[must_use]
pub fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// Triangular mel filterbank with Slaney area normalisation.
///
/// Row-major `n_mels x (n_fft / 2 + 1)`; each filter integrates to roughly
/// one over frequency so wide high-frequency bands are not over-weighted.
#[derive(Debug, Clone)]
pub struct MelFilterbank {
    weights: Vec<f64>,
    n_mels: usize,
    n_bins: usize,
}

impl MelFilterbank {
    /// Filters spanning `fmin..fmax` Hz for an `n_fft`-point spectrum at `sample_rate`
    #[must_use]
    pub fn new(sample_rate: u32, n_fft: usize, n_mels: usize, fmin: f64, fmax: f64) -> Self {
        let n_bins = n_fft / 2 + 1;
        let sr = f64::from(sample_rate);

        let fft_freqs: Vec<f64> = (0..n_bins).map(|k| k as f64 * sr / n_fft as f64).collect();

        let mel_min = hz_to_mel(fmin);
        let mel_max = hz_to_mel(fmax);
        let n_points = n_mels + 2;
        let mel_f: Vec<f64> = (0..n_points)
            .map(|i| {
                let mel = mel_min + (mel_max - mel_min) * i as f64 / (n_points - 1) as f64;
                mel_to_hz(mel)
            })
            .collect();

        let mut weights = vec![0.0; n_mels * n_bins];
        for m in 0..n_mels {
            let lower_width = mel_f[m + 1] - mel_f[m];
            let upper_width = mel_f[m + 2] - mel_f[m + 1];
            let enorm = 2.0 / (mel_f[m + 2] - mel_f[m]);
            let row = &mut weights[m * n_bins..(m + 1) * n_bins];

            for (w, &f) in row.iter_mut().zip(&fft_freqs) {
                let lower = (f - mel_f[m]) / lower_width;
                let upper = (mel_f[m + 2] - f) / upper_width;
                *w = lower.min(upper).max(0.0) * enorm;
            }
        }

        Self {
            weights,
            n_mels,
            n_bins,
        }
    }

    #[must_use]
    pub fn n_mels(&self) -> usize {
        self.n_mels
    }

    #[must_use]
    pub fn n_bins(&self) -> usize {
        self.n_bins
    }

    /// Weights of filter `m` over the spectrum bins
    #[must_use]
    pub fn filter(&self, m: usize) -> &[f64] {
        &self.weights[m * self.n_bins..(m + 1) * self.n_bins]
    }

    /// Project a power spectrum (`n_bins` values) onto the mel bands
    pub fn apply(&self, power: &[f64], out: &mut [f64]) {
        debug_assert_eq!(power.len(), self.n_bins);
        debug_assert_eq!(out.len(), self.n_mels);
        for (m, band) in out.iter_mut().enumerate() {
            *band = self
                .filter(m)
                .iter()
                .zip(power)
                .map(|(w, p)| w * p)
                .sum();
        }
    }
}
