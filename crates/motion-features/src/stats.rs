//! Streaming summary of the per-pair motion scalars

use serde::{Deserialize, Serialize};

/// How a flow field is reduced to one scalar per frame pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowReduction {
    /// Mean Euclidean displacement magnitude
    #[default]
    MeanMagnitude,
    /// Mean over both signed flow components; matches checkpoints trained on
    /// `mean(flow)` features
    SignedMean,
}

/// Running mean, population standard deviation and maximum (Welford)
///
/// Produces the same values as collecting the sequence and reducing it in two
/// passes, without holding the sequence in memory.
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    max: f64,
}

impl RunningStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: f64) {
        self.count += 1;
        if self.count == 1 {
            self.max = value;
        } else if value > self.max {
            self.max = value;
        }
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    #[must_use]
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    /// Population standard deviation
    #[must_use]
    pub fn std(&self) -> Option<f64> {
        (self.count > 0).then(|| (self.m2 / self.count as f64).max(0.0).sqrt())
    }

    #[must_use]
    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }

    /// `[mean, std, max]`, or `None` before the first value
    #[must_use]
    pub fn summary(&self) -> Option<[f64; 3]> {
        Some([self.mean()?, self.std()?, self.max()?])
    }
}
