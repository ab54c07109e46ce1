//! Temperature-scaled softmax

use crate::classifier::Logits;
use crate::FusionError;
use emotion_fusion_common::{EmotionLabel, NUM_CLASSES};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Temperature the checkpoint was calibrated with
pub const TEMPERATURE: f64 = 2.5;

/// Divides logits by a temperature and normalises them with softmax
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibrator {
    temperature: f64,
}

impl Default for Calibrator {
    fn default() -> Self {
        Self {
            temperature: TEMPERATURE,
        }
    }
}

impl Calibrator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Calibrator with a non-standard temperature
    ///
    /// # Errors
    ///
    /// `InvalidTemperature` for zero, negative or non-finite values.
    pub fn with_temperature(temperature: f64) -> Result<Self, FusionError> {
        if !(temperature.is_finite() && temperature > 0.0) {
            return Err(FusionError::InvalidTemperature(temperature));
        }
        Ok(Self { temperature })
    }

    #[must_use]
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    #[must_use]
    pub fn calibrate(&self, logits: &Logits) -> ProbabilityDistribution {
        let scaled: Vec<f64> = logits
            .as_slice()
            .iter()
            .map(|&z| f64::from(z) / self.temperature)
            .collect();
        let max = scaled.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let mut probabilities = [0.0; NUM_CLASSES];
        for (p, &s) in probabilities.iter_mut().zip(&scaled) {
            *p = (s - max).exp();
        }
        let sum: f64 = probabilities.iter().sum();
        for p in &mut probabilities {
            *p /= sum;
        }
        ProbabilityDistribution { probabilities }
    }
}

/// Calibrated probability per emotion class
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbabilityDistribution {
    probabilities: [f64; NUM_CLASSES],
}

impl ProbabilityDistribution {
    #[must_use]
    pub fn get(&self, label: EmotionLabel) -> f64 {
        self.probabilities[label.index()]
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.probabilities
    }

    /// `(label, probability)` pairs in class-index order
    pub fn iter(&self) -> impl Iterator<Item = (EmotionLabel, f64)> + '_ {
        EmotionLabel::ALL
            .iter()
            .copied()
            .zip(self.probabilities.iter().copied())
    }

    /// Most probable class; equal maxima resolve to the lowest class index
    #[must_use]
    pub fn argmax(&self) -> (EmotionLabel, f64) {
        let mut best = 0;
        for (i, &p) in self.probabilities.iter().enumerate().skip(1) {
            if p > self.probabilities[best] {
                best = i;
            }
        }
        (EmotionLabel::ALL[best], self.probabilities[best])
    }
}

impl Serialize for ProbabilityDistribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(NUM_CLASSES))?;
        for (label, p) in self.iter() {
            map.serialize_entry(label.as_str(), &p)?;
        }
        map.end()
    }
}
