//! Minimal interleaved f32 raster used by the optical-flow kernels

use emotion_fusion_common::{ProcessingError, Result};

/// Row-major image with `channels` interleaved f32 values per pixel
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    width: usize,
    height: usize,
    channels: usize,
    data: Vec<f32>,
}

impl Image {
    #[must_use]
    pub fn zeros(width: usize, height: usize, channels: usize) -> Self {
        Self {
            width,
            height,
            channels,
            data: vec![0.0; width * height * channels],
        }
    }

    /// Wrap an existing buffer
    ///
    /// # Errors
    ///
    /// Returns an error if `data.len() != width * height * channels`.
    pub fn from_vec(width: usize, height: usize, channels: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != width * height * channels {
            return Err(ProcessingError::ImageError(format!(
                "Buffer of {} values does not match {width}x{height}x{channels}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Single-channel image from packed 8-bit luma
    pub fn from_gray8(width: usize, height: usize, pixels: &[u8]) -> Result<Self> {
        Self::from_vec(
            width,
            height,
            1,
            pixels.iter().map(|&p| f32::from(p)).collect(),
        )
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    #[must_use]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    #[must_use]
    pub fn row_len(&self) -> usize {
        self.width * self.channels
    }

    #[must_use]
    pub fn row(&self, y: usize) -> &[f32] {
        let len = self.row_len();
        &self.data[y * len..(y + 1) * len]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [f32] {
        let len = self.row_len();
        &mut self.data[y * len..(y + 1) * len]
    }

    /// Multiply every value by `factor`
    pub fn scale(&mut self, factor: f32) {
        for v in &mut self.data {
            *v *= factor;
        }
    }

    /// Separable Gaussian blur with reflect-101 borders.
    ///
    /// `sigma <= 0` derives sigma from `ksize`; small odd kernels then use
    /// the fixed binomial taps.
    #[must_use]
    pub fn gaussian_blur(&self, ksize: usize, sigma: f64) -> Self {
        let kernel = gaussian_kernel(ksize, sigma);
        let radius = (kernel.len() / 2) as isize;
        let (w, h, c) = (self.width, self.height, self.channels);

        let mut horizontal = Self::zeros(w, h, c);
        for y in 0..h {
            let src = self.row(y);
            let dst = horizontal.row_mut(y);
            for x in 0..w {
                for ch in 0..c {
                    let mut acc = 0.0f32;
                    for (i, &k) in kernel.iter().enumerate() {
                        let sx = reflect_101(x as isize + i as isize - radius, w);
                        acc += k * src[sx * c + ch];
                    }
                    dst[x * c + ch] = acc;
                }
            }
        }

        let mut out = Self::zeros(w, h, c);
        for y in 0..h {
            let dst = &mut out.data[y * w * c..(y + 1) * w * c];
            for (i, &k) in kernel.iter().enumerate() {
                let sy = reflect_101(y as isize + i as isize - radius, h);
                for (d, &s) in dst.iter_mut().zip(horizontal.row(sy)) {
                    *d += k * s;
                }
            }
        }
        out
    }

    /// Bilinear resize with pixel-centre alignment and clamped edges
    #[must_use]
    pub fn resize_bilinear(&self, width: usize, height: usize) -> Self {
        if width == self.width && height == self.height {
            return self.clone();
        }

        let c = self.channels;
        let xs = linear_taps(self.width, width);
        let ys = linear_taps(self.height, height);

        let mut out = Self::zeros(width, height, c);
        for (dy, &(y0, y1, fy)) in ys.iter().enumerate() {
            let row0 = self.row(y0);
            let row1 = self.row(y1);
            let dst = out.row_mut(dy);
            for (dx, &(x0, x1, fx)) in xs.iter().enumerate() {
                for ch in 0..c {
                    let top = row0[x0 * c + ch] * (1.0 - fx) + row0[x1 * c + ch] * fx;
                    let bottom = row1[x0 * c + ch] * (1.0 - fx) + row1[x1 * c + ch] * fx;
                    dst[dx * c + ch] = top * (1.0 - fy) + bottom * fy;
                }
            }
        }
        out
    }
}

/// Source index pair and weight of the second tap for each destination index
fn linear_taps(src_len: usize, dst_len: usize) -> Vec<(usize, usize, f32)> {
    let scale = src_len as f64 / dst_len as f64;
    (0..dst_len)
        .map(|d| {
            let pos = ((d as f64 + 0.5) * scale - 0.5) as f32;
            let mut s = pos.floor() as isize;
            let mut frac = pos - s as f32;
            if s < 0 {
                s = 0;
                frac = 0.0;
            }
            if s as usize >= src_len - 1 {
                s = src_len as isize - 1;
                frac = 0.0;
            }
            let s = s as usize;
            (s, (s + 1).min(src_len - 1), frac)
        })
        .collect()
}

/// Mirror an out-of-range index without repeating the edge sample (`dcb|abcd|cba`)
#[must_use]
pub fn reflect_101(i: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let n = len as isize;
    let mut i = i;
    loop {
        if i < 0 {
            i = -i;
        } else if i >= n {
            i = 2 * n - 2 - i;
        } else {
            return i as usize;
        }
    }
}

/// Normalised 1-D Gaussian taps
#[must_use]
pub fn gaussian_kernel(ksize: usize, sigma: f64) -> Vec<f32> {
    const SMALL: [&[f32]; 4] = [
        &[1.0],
        &[0.25, 0.5, 0.25],
        &[0.0625, 0.25, 0.375, 0.25, 0.0625],
        &[
            0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125,
        ],
    ];

    if sigma <= 0.0 && ksize % 2 == 1 && ksize <= 7 {
        return SMALL[ksize / 2].to_vec();
    }

    let sigma = if sigma > 0.0 {
        sigma
    } else {
        ((ksize as f64 - 1.0) * 0.5 - 1.0) * 0.3 + 0.8
    };
    let scale = -0.5 / (sigma * sigma);
    let centre = (ksize as f64 - 1.0) * 0.5;

    let raw: Vec<f64> = (0..ksize)
        .map(|i| {
            let x = i as f64 - centre;
            (scale * x * x).exp()
        })
        .collect();
    let sum: f64 = raw.iter().sum();
    raw.iter().map(|v| (v / sum) as f32).collect()
}
