//! Dense optical flow by polynomial expansion (Farneback)
//!
//! Each neighbourhood of a frame is approximated by a quadratic polynomial.
//! Displacement is estimated coarse-to-fine by comparing the expansions of two
//! frames, smoothing the normal equations over a box window and solving a 2x2
//! system per pixel. Numerics follow the widely used OpenCV formulation so the
//! flow fields agree with the reference to float precision.

use crate::image::Image;
use emotion_fusion_common::{ProcessingError, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Coarsest pyramid level keeps both sides at least this many pixels
const MIN_LEVEL_SIZE: f64 = 32.0;

/// Pixels near the frame edge whose constraints are attenuated
const BORDER: usize = 5;
const BORDER_WEIGHTS: [f32; BORDER] = [0.14, 0.14, 0.4472, 0.4472, 0.4472];

/// Farneback parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FarnebackParams {
    /// Image scale between pyramid levels (< 1)
    pub pyramid_scale: f64,
    /// Extra pyramid levels above the full-resolution image
    pub levels: usize,
    /// Averaging window size
    pub window_size: usize,
    /// Refinement iterations per level
    pub iterations: usize,
    /// Polynomial expansion neighbourhood radius
    pub poly_n: usize,
    /// Gaussian sigma of the expansion applicability
    pub poly_sigma: f64,
}

impl Default for FarnebackParams {
    fn default() -> Self {
        Self {
            pyramid_scale: 0.5,
            levels: 3,
            window_size: 15,
            iterations: 3,
            poly_n: 5,
            poly_sigma: 1.2,
        }
    }
}

impl FarnebackParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.pyramid_scale > 0.0 && self.pyramid_scale < 1.0) {
            return Err(ProcessingError::InvalidConfig(format!(
                "motion.pyramid_scale ({}) must be in (0, 1)",
                self.pyramid_scale
            )));
        }
        if self.window_size == 0 || self.poly_n == 0 || self.iterations == 0 {
            return Err(ProcessingError::InvalidConfig(
                "motion.window_size, motion.poly_n and motion.iterations must be positive"
                    .to_string(),
            ));
        }
        if !(self.poly_sigma.is_finite() && self.poly_sigma >= 0.0) {
            return Err(ProcessingError::InvalidConfig(format!(
                "motion.poly_sigma ({}) must be non-negative",
                self.poly_sigma
            )));
        }
        Ok(())
    }
}

/// Per-pixel displacement `(dx, dy)` from the first frame to the second
#[derive(Debug, Clone, PartialEq)]
pub struct FlowField {
    field: Image,
}

impl FlowField {
    #[must_use]
    pub fn width(&self) -> usize {
        self.field.width()
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.field.height()
    }

    /// Displacement at pixel `(x, y)`
    #[must_use]
    pub fn at(&self, x: usize, y: usize) -> (f32, f32) {
        let row = self.field.row(y);
        (row[x * 2], row[x * 2 + 1])
    }

    /// Interleaved `dx, dy` values, row-major
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        self.field.data()
    }

    /// Mean Euclidean displacement over all pixels
    #[must_use]
    pub fn mean_magnitude(&self) -> f64 {
        let pixels = self.width() * self.height();
        if pixels == 0 {
            return 0.0;
        }
        let sum: f64 = self
            .as_slice()
            .chunks_exact(2)
            .map(|d| f64::from(d[0]).hypot(f64::from(d[1])))
            .sum();
        sum / pixels as f64
    }

    /// Mean over both components of every pixel (signed; opposing motions cancel)
    #[must_use]
    pub fn signed_mean(&self) -> f64 {
        let values = self.as_slice();
        if values.is_empty() {
            return 0.0;
        }
        values.iter().map(|&v| f64::from(v)).sum::<f64>() / values.len() as f64
    }
}

/// Quadratic polynomial expansion with a Gaussian applicability
#[derive(Debug, Clone)]
struct PolyExpansion {
    n: usize,
    /// Gaussian, x-weighted and x^2-weighted taps, index `k + n` for offset `k`
    g: Vec<f32>,
    xg: Vec<f32>,
    xxg: Vec<f32>,
    ig11: f64,
    ig03: f64,
    ig33: f64,
    ig55: f64,
}

impl PolyExpansion {
    fn new(n: usize, sigma: f64) -> Self {
        let sigma = if sigma < f64::from(f32::EPSILON) {
            n as f64 * 0.3
        } else {
            sigma
        };
        let ni = n as isize;

        let raw: Vec<f32> = (-ni..=ni)
            .map(|x| (-(x * x) as f64 / (2.0 * sigma * sigma)).exp() as f32)
            .collect();
        let s = 1.0 / raw.iter().map(|&v| f64::from(v)).sum::<f64>();

        let g: Vec<f32> = raw.iter().map(|&v| (f64::from(v) * s) as f32).collect();
        let xg: Vec<f32> = (-ni..=ni)
            .zip(&g)
            .map(|(x, &gv)| x as f32 * gv)
            .collect();
        let xxg: Vec<f32> = (-ni..=ni)
            .zip(&g)
            .map(|(x, &gv)| (x * x) as f32 * gv)
            .collect();

        // Moments of the separable applicability over the (2n+1)^2 window
        let (mut g00, mut g11, mut g33, mut g55) = (0.0f64, 0.0f64, 0.0f64, 0.0f64);
        for y in -ni..=ni {
            for x in -ni..=ni {
                let w = g[(y + ni) as usize] * g[(x + ni) as usize];
                let (xf, yf) = (x as f32, y as f32);
                g00 += f64::from(w);
                g11 += f64::from(w * xf * xf);
                g33 += f64::from(w * xf * xf * xf * xf);
                g55 += f64::from(w * xf * xf * yf * yf);
            }
        }

        // The normal matrix is block diagonal: {1, x^2, y^2} couple, the
        // linear and cross terms are independent
        let inv = invert_3x3([[g00, g11, g11], [g11, g33, g55], [g11, g55, g33]]);

        Self {
            n,
            g,
            xg,
            xxg,
            ig11: 1.0 / g11,
            ig03: inv[0][1],
            ig33: inv[1][1],
            ig55: 1.0 / g55,
        }
    }

    /// Expand `src` (single channel) into five coefficient planes per pixel:
    /// `[b_y, b_x, a_yy, a_xx, a_xy]`
    fn expand(&self, src: &Image) -> Image {
        let (width, height) = (src.width(), src.height());
        let n = self.n;
        let mut dst = Image::zeros(width, height, 5);

        dst.data_mut()
            .par_chunks_mut(width * 5)
            .enumerate()
            .for_each_init(
                || vec![0.0f32; (width + 2 * n) * 3],
                |buf, (y, drow)| self.expand_row(src, y, buf, drow),
            );
        dst
    }

    fn expand_row(&self, src: &Image, y: usize, buf: &mut [f32], drow: &mut [f32]) {
        let (width, height) = (src.width(), src.height());
        let n = self.n;
        let c = n; // centre tap index
        // `buf` holds pixel x at (x + n) * 3, leaving n pixels of padding per side
        let off = n * 3;

        // Vertical pass: [sum g, sum xg (odd), sum xxg] with replicated rows
        {
            let s = src.row(y);
            let g0 = self.g[c];
            for x in 0..width {
                buf[off + x * 3] = s[x] * g0;
                buf[off + x * 3 + 1] = 0.0;
                buf[off + x * 3 + 2] = 0.0;
            }
        }
        for k in 1..=n {
            let (g0, g1, g2) = (self.g[c + k], self.xg[c + k], self.xxg[c + k]);
            let s0 = src.row(y.saturating_sub(k));
            let s1 = src.row((y + k).min(height - 1));
            for x in 0..width {
                let p = s0[x] + s1[x];
                buf[off + x * 3] += g0 * p;
                buf[off + x * 3 + 1] += g1 * (s1[x] - s0[x]);
                buf[off + x * 3 + 2] += g2 * p;
            }
        }

        // Replicate the edge columns into the padding
        for x in 0..n {
            for ch in 0..3 {
                buf[x * 3 + ch] = buf[off + ch];
                buf[off + (width + x) * 3 + ch] = buf[off + (width - 1) * 3 + ch];
            }
        }

        // Horizontal pass
        let at = |px: isize, ch: usize| buf[(px + n as isize) as usize * 3 + ch];
        for x in 0..width {
            let xi = x as isize;
            let g0 = self.g[c];
            let mut b1 = f64::from(at(xi, 0) * g0);
            let mut b2 = 0.0f64;
            let mut b3 = f64::from(at(xi, 1) * g0);
            let mut b4 = 0.0f64;
            let mut b5 = f64::from(at(xi, 2) * g0);
            let mut b6 = 0.0f64;

            for k in 1..=n {
                let ki = k as isize;
                let (gk, xgk, xxgk) = (
                    f64::from(self.g[c + k]),
                    f64::from(self.xg[c + k]),
                    f64::from(self.xxg[c + k]),
                );
                let tg = f64::from(at(xi + ki, 0) + at(xi - ki, 0));
                b1 += tg * gk;
                b4 += tg * xxgk;
                b2 += f64::from(at(xi + ki, 0) - at(xi - ki, 0)) * xgk;
                b3 += f64::from(at(xi + ki, 1) + at(xi - ki, 1)) * gk;
                b6 += f64::from(at(xi + ki, 1) - at(xi - ki, 1)) * xgk;
                b5 += f64::from(at(xi + ki, 2) + at(xi - ki, 2)) * gk;
            }

            drow[x * 5] = (b3 * self.ig11) as f32;
            drow[x * 5 + 1] = (b2 * self.ig11) as f32;
            drow[x * 5 + 2] = (b1 * self.ig03 + b5 * self.ig33) as f32;
            drow[x * 5 + 3] = (b1 * self.ig03 + b4 * self.ig33) as f32;
            drow[x * 5 + 4] = (b6 * self.ig55) as f32;
        }
    }
}

fn invert_3x3(m: [[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let cof = |r0: usize, r1: usize, c0: usize, c1: usize| {
        m[r0][c0] * m[r1][c1] - m[r0][c1] * m[r1][c0]
    };
    let c00 = cof(1, 2, 1, 2);
    let c01 = -cof(1, 2, 0, 2);
    let c02 = cof(1, 2, 0, 1);
    let det = m[0][0] * c00 + m[0][1] * c01 + m[0][2] * c02;
    let inv_det = 1.0 / det;

    // Adjugate is the transpose of the cofactor matrix
    [
        [c00 * inv_det, -cof(0, 2, 1, 2) * inv_det, cof(0, 1, 1, 2) * inv_det],
        [c01 * inv_det, cof(0, 2, 0, 2) * inv_det, -cof(0, 1, 0, 2) * inv_det],
        [c02 * inv_det, -cof(0, 2, 0, 1) * inv_det, cof(0, 1, 0, 1) * inv_det],
    ]
}

/// Polynomial expansions of one frame at every pyramid level (finest first)
#[derive(Debug, Clone)]
pub struct Pyramid {
    width: usize,
    height: usize,
    levels: Vec<Image>,
}

impl Pyramid {
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    #[must_use]
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }
}

/// Reusable Farneback estimator; immutable and shareable across threads
#[derive(Debug, Clone)]
pub struct Farneback {
    params: FarnebackParams,
    poly: PolyExpansion,
}

impl Farneback {
    pub fn new(params: FarnebackParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            poly: PolyExpansion::new(params.poly_n, params.poly_sigma),
            params,
        })
    }

    #[must_use]
    pub fn params(&self) -> &FarnebackParams {
        &self.params
    }

    /// Scale factor of each level, finest first
    fn level_scales(&self, width: usize, height: usize) -> Vec<f64> {
        let mut scales = vec![1.0];
        let mut scale = 1.0;
        for _ in 0..self.params.levels {
            scale *= self.params.pyramid_scale;
            if width as f64 * scale < MIN_LEVEL_SIZE || height as f64 * scale < MIN_LEVEL_SIZE {
                break;
            }
            scales.push(scale);
        }
        scales
    }

    /// Expand a grayscale frame at every pyramid level
    ///
    /// # Errors
    ///
    /// Returns an error for an empty or multi-channel image.
    pub fn pyramid(&self, frame: &Image) -> Result<Pyramid> {
        let (width, height) = (frame.width(), frame.height());
        if width == 0 || height == 0 || frame.channels() != 1 {
            return Err(ProcessingError::ImageError(format!(
                "Optical flow needs a non-empty single-channel frame, got {width}x{height}x{}",
                frame.channels()
            )));
        }

        let levels = self
            .level_scales(width, height)
            .into_iter()
            .map(|scale| {
                let sigma = (1.0 / scale - 1.0) * 0.5;
                let ksize = (((sigma * 5.0).round_ties_even() as usize) | 1).max(3);
                let level_w = (width as f64 * scale).round_ties_even() as usize;
                let level_h = (height as f64 * scale).round_ties_even() as usize;

                let smoothed = frame.gaussian_blur(ksize, sigma);
                self.poly.expand(&smoothed.resize_bilinear(level_w, level_h))
            })
            .collect();

        Ok(Pyramid {
            width,
            height,
            levels,
        })
    }

    /// Flow from `prev` to `next`
    ///
    /// # Errors
    ///
    /// Returns an error if the two pyramids come from frames of different sizes.
    pub fn flow(&self, prev: &Pyramid, next: &Pyramid) -> Result<FlowField> {
        if prev.width != next.width || prev.height != next.height {
            return Err(ProcessingError::ImageError(format!(
                "Frame size changed from {}x{} to {}x{}",
                prev.width, prev.height, next.width, next.height
            )));
        }

        let mut flow: Option<Image> = None;
        for (r0, r1) in prev.levels.iter().zip(&next.levels).rev() {
            let (w, h) = (r0.width(), r0.height());
            let mut current = match flow.take() {
                Some(coarse) => {
                    let mut up = coarse.resize_bilinear(w, h);
                    up.scale((1.0 / self.params.pyramid_scale) as f32);
                    up
                }
                None => Image::zeros(w, h, 2),
            };

            let mut matrices = update_matrices(r0, r1, &current);
            for i in 0..self.params.iterations {
                solve_flow(&matrices, &mut current, self.params.window_size);
                if i + 1 < self.params.iterations {
                    matrices = update_matrices(r0, r1, &current);
                }
            }
            flow = Some(current);
        }

        flow.map(|field| FlowField { field }).ok_or_else(|| {
            ProcessingError::ImageError("Optical flow pyramid has no levels".to_string())
        })
    }

    /// Flow between two grayscale frames
    pub fn calc(&self, prev: &Image, next: &Image) -> Result<FlowField> {
        self.flow(&self.pyramid(prev)?, &self.pyramid(next)?)
    }
}

/// Build the per-pixel normal equations `[g11, g12, g22, h1, h2]` comparing
/// the expansion `r0` with `r1` sampled at the current displacement
fn update_matrices(r0: &Image, r1: &Image, flow: &Image) -> Image {
    let (width, height) = (flow.width(), flow.height());
    let mut m = Image::zeros(width, height, 5);

    m.data_mut()
        .par_chunks_mut(width * 5)
        .enumerate()
        .for_each(|(y, mrow)| {
            let frow = flow.row(y);
            let r0row = r0.row(y);

            for x in 0..width {
                let (dx, dy) = (frow[x * 2], frow[x * 2 + 1]);
                let fx = x as f32 + dx;
                let fy = y as f32 + dy;
                let x1 = fx.floor() as isize;
                let y1 = fy.floor() as isize;
                let (fx, fy) = (fx - x1 as f32, fy - y1 as f32);
                let r = &r0row[x * 5..x * 5 + 5];

                let inside =
                    x1 >= 0 && (x1 as usize) < width - 1 && y1 >= 0 && (y1 as usize) < height - 1;
                let (mut r2, mut r3, mut r4, mut r5, mut r6) = if inside {
                    let (x1, y1) = (x1 as usize, y1 as usize);
                    let a00 = (1.0 - fx) * (1.0 - fy);
                    let a01 = fx * (1.0 - fy);
                    let a10 = (1.0 - fx) * fy;
                    let a11 = fx * fy;
                    let top = &r1.row(y1)[x1 * 5..x1 * 5 + 10];
                    let bottom = &r1.row(y1 + 1)[x1 * 5..x1 * 5 + 10];
                    let sample = |c: usize| {
                        a00 * top[c] + a01 * top[c + 5] + a10 * bottom[c] + a11 * bottom[c + 5]
                    };
                    (
                        sample(0),
                        sample(1),
                        (r[2] + sample(2)) * 0.5,
                        (r[3] + sample(3)) * 0.5,
                        (r[4] + sample(4)) * 0.25,
                    )
                } else {
                    // Displaced outside the frame: compare against a flat second frame
                    (0.0, 0.0, r[2], r[3], r[4] * 0.5)
                };

                r2 = (r[0] - r2) * 0.5;
                r3 = (r[1] - r3) * 0.5;

                r2 += r4 * dy + r6 * dx;
                r3 += r6 * dy + r5 * dx;

                let near_edge =
                    x < BORDER || x + BORDER >= width || y < BORDER || y + BORDER >= height;
                if near_edge {
                    let weight = |i: usize, len: usize| {
                        let mut w = 1.0;
                        if i < BORDER {
                            w *= BORDER_WEIGHTS[i];
                        }
                        if i + BORDER >= len {
                            w *= BORDER_WEIGHTS[len - i - 1];
                        }
                        w
                    };
                    let scale = weight(x, width) * weight(y, height);
                    r2 *= scale;
                    r3 *= scale;
                    r4 *= scale;
                    r5 *= scale;
                    r6 *= scale;
                }

                let out = &mut mrow[x * 5..x * 5 + 5];
                out[0] = r4 * r4 + r6 * r6;
                out[1] = (r4 + r5) * r6;
                out[2] = r5 * r5 + r6 * r6;
                out[3] = r4 * r2 + r6 * r3;
                out[4] = r6 * r2 + r5 * r3;
            }
        });
    m
}

/// Box-average the normal equations over the window (replicated borders) and
/// solve the regularised 2x2 system for each pixel
fn solve_flow(m: &Image, flow: &mut Image, window_size: usize) {
    let (width, height) = (m.width(), m.height());
    let radius = (window_size / 2) as isize;
    let scale = 1.0 / (window_size * window_size) as f64;
    let clamp = |i: isize, len: usize| i.clamp(0, len as isize - 1) as usize;

    // Running vertical sums over rows y-radius..=y+radius
    let mut vsum = vec![0.0f64; width * 5];
    for d in -radius..=radius {
        for (acc, &v) in vsum.iter_mut().zip(m.row(clamp(d, height))) {
            *acc += f64::from(v);
        }
    }

    for y in 0..height {
        if y > 0 {
            let yi = y as isize;
            let add = m.row(clamp(yi + radius, height));
            let sub = m.row(clamp(yi - radius - 1, height));
            for ((acc, &a), &s) in vsum.iter_mut().zip(add).zip(sub) {
                *acc += f64::from(a) - f64::from(s);
            }
        }

        let mut acc = [0.0f64; 5];
        for d in -radius..=radius {
            let col = clamp(d, width);
            for (c, a) in acc.iter_mut().enumerate() {
                *a += vsum[col * 5 + c];
            }
        }

        let frow = flow.row_mut(y);
        for x in 0..width {
            if x > 0 {
                let xi = x as isize;
                let add = clamp(xi + radius, width);
                let sub = clamp(xi - radius - 1, width);
                for (c, a) in acc.iter_mut().enumerate() {
                    *a += vsum[add * 5 + c] - vsum[sub * 5 + c];
                }
            }

            let g11 = acc[0] * scale;
            let g12 = acc[1] * scale;
            let g22 = acc[2] * scale;
            let h1 = acc[3] * scale;
            let h2 = acc[4] * scale;
            let idet = 1.0 / (g11 * g22 - g12 * g12 + 1e-3);

            frow[x * 2] = ((g11 * h2 - g12 * h1) * idet) as f32;
            frow[x * 2 + 1] = ((g22 * h1 - g12 * h2) * idet) as f32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    /// Smooth non-separable texture, translated by `(tx, ty)`
    fn texture(width: usize, height: usize, tx: f64, ty: f64) -> Image {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let (xf, yf) = (x as f64 - tx, y as f64 - ty);
                let v = 128.0
                    + 40.0 * (2.0 * PI * xf / 24.0).sin()
                    + 40.0 * (2.0 * PI * yf / 18.0).sin()
                    + 25.0 * (2.0 * PI * (xf + yf) / 30.0).cos();
                data.push(v as f32);
            }
        }
        Image::from_vec(width, height, 1, data).unwrap()
    }

    fn interior_mean(flow: &FlowField, margin: usize) -> (f64, f64) {
        let mut sum = (0.0, 0.0);
        let mut count = 0.0;
        for y in margin..flow.height() - margin {
            for x in margin..flow.width() - margin {
                let (dx, dy) = flow.at(x, y);
                sum.0 += f64::from(dx);
                sum.1 += f64::from(dy);
                count += 1.0;
            }
        }
        (sum.0 / count, sum.1 / count)
    }

    #[test]
    fn test_default_params() {
        let params = FarnebackParams::default();
        assert_eq!(params.pyramid_scale, 0.5);
        assert_eq!(params.levels, 3);
        assert_eq!(params.window_size, 15);
        assert_eq!(params.iterations, 3);
        assert_eq!(params.poly_n, 5);
        assert_eq!(params.poly_sigma, 1.2);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_invalid_params_rejected() {
        let bad = FarnebackParams {
            pyramid_scale: 1.5,
            ..FarnebackParams::default()
        };
        assert!(Farneback::new(bad).is_err());

        let bad = FarnebackParams {
            window_size: 0,
            ..FarnebackParams::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_level_count_respects_min_size() {
        let fb = Farneback::new(FarnebackParams::default()).unwrap();
        // 640 -> 320 -> 160 -> 80: all levels fit
        assert_eq!(fb.level_scales(640, 480).len(), 4);
        // 128x96 -> 64x48; 32x24 is too small
        assert_eq!(fb.level_scales(128, 96).len(), 2);
        assert_eq!(fb.level_scales(40, 40).len(), 1);
    }

    #[test]
    fn test_expansion_of_linear_ramp() {
        // f(x, y) = 3x + 2y: linear terms only, no curvature
        let (w, h) = (24, 24);
        let data = (0..h)
            .flat_map(|y| (0..w).map(move |x| (3 * x + 2 * y) as f32))
            .collect();
        let img = Image::from_vec(w, h, 1, data).unwrap();
        let poly = PolyExpansion::new(5, 1.2);
        let r = poly.expand(&img);

        let px = &r.row(12)[12 * 5..12 * 5 + 5];
        assert!((px[0] - 2.0).abs() < 1e-3, "b_y = {}", px[0]);
        assert!((px[1] - 3.0).abs() < 1e-3, "b_x = {}", px[1]);
        assert!(px[2].abs() < 1e-3);
        assert!(px[3].abs() < 1e-3);
        assert!(px[4].abs() < 1e-3);
    }

    #[test]
    fn test_identical_frames_give_zero_interior_flow() {
        let params = FarnebackParams {
            levels: 0,
            iterations: 1,
            ..FarnebackParams::default()
        };
        let fb = Farneback::new(params).unwrap();
        let img = texture(64, 64, 0.0, 0.0);
        let flow = fb.calc(&img, &img).unwrap();

        // Only pixels whose window reaches the last row/column see edge effects
        for y in 8..56 {
            for x in 8..56 {
                assert_eq!(flow.at(x, y), (0.0, 0.0));
            }
        }
    }

    #[test]
    fn test_recovers_horizontal_shift() {
        let fb = Farneback::new(FarnebackParams::default()).unwrap();
        let prev = texture(128, 96, 0.0, 0.0);
        let next = texture(128, 96, 2.0, 0.0);

        let flow = fb.calc(&prev, &next).unwrap();
        let (dx, dy) = interior_mean(&flow, 24);
        assert!((dx - 2.0).abs() < 0.5, "dx = {dx}");
        assert!(dy.abs() < 0.5, "dy = {dy}");
    }

    #[test]
    fn test_recovers_vertical_shift() {
        let fb = Farneback::new(FarnebackParams::default()).unwrap();
        let prev = texture(128, 96, 0.0, 0.0);
        let next = texture(128, 96, 0.0, -1.5);

        let flow = fb.calc(&prev, &next).unwrap();
        let (dx, dy) = interior_mean(&flow, 24);
        assert!(dx.abs() < 0.5, "dx = {dx}");
        assert!((dy + 1.5).abs() < 0.5, "dy = {dy}");
    }

    #[test]
    fn test_motion_exceeds_static_magnitude() {
        let fb = Farneback::new(FarnebackParams::default()).unwrap();
        let still = texture(96, 96, 0.0, 0.0);
        let moved = texture(96, 96, 1.0, 1.0);

        let static_flow = fb.calc(&still, &still).unwrap();
        let moving_flow = fb.calc(&still, &moved).unwrap();
        assert!(moving_flow.mean_magnitude() > static_flow.mean_magnitude());
        assert!(moving_flow.as_slice().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_size_mismatch_is_error() {
        let fb = Farneback::new(FarnebackParams::default()).unwrap();
        let a = texture(64, 64, 0.0, 0.0);
        let b = texture(64, 48, 0.0, 0.0);
        assert!(fb.calc(&a, &b).is_err());
    }

    #[test]
    fn test_flow_reductions() {
        let data = vec![3.0, 4.0, -3.0, -4.0, 0.0, 0.0, 0.0, 0.0];
        let flow = FlowField {
            field: Image::from_vec(2, 2, 2, data).unwrap(),
        };
        assert!((flow.mean_magnitude() - 2.5).abs() < 1e-12);
        assert!(flow.signed_mean().abs() < 1e-12);
    }
}
