//! Feed-forward fusion network

use crate::{FusionError, ModelLoadError};
use emotion_fusion_common::{FUSED_DIM, NUM_CLASSES};
use std::fmt;

/// Hidden layer widths
pub const HIDDEN_DIMS: [usize; 2] = [256, 128];

/// Dropout probability used in training; inference ignores it
pub const DROPOUT: f32 = 0.3;

/// Fully connected layer, `y = W x + b` with `W` stored row-major `[out, in]`
#[derive(Debug, Clone, PartialEq)]
pub struct Linear {
    in_features: usize,
    out_features: usize,
    weight: Vec<f32>,
    bias: Vec<f32>,
}

impl Linear {
    /// # Errors
    ///
    /// `ModelLoadError::Shape` if the buffers do not match the declared sizes.
    pub fn new(
        in_features: usize,
        out_features: usize,
        weight: Vec<f32>,
        bias: Vec<f32>,
    ) -> Result<Self, ModelLoadError> {
        if weight.len() != in_features * out_features {
            return Err(ModelLoadError::Shape {
                name: "weight".to_string(),
                expected: vec![out_features, in_features],
                found: vec![weight.len()],
            });
        }
        if bias.len() != out_features {
            return Err(ModelLoadError::Shape {
                name: "bias".to_string(),
                expected: vec![out_features],
                found: vec![bias.len()],
            });
        }
        Ok(Self {
            in_features,
            out_features,
            weight,
            bias,
        })
    }

    #[must_use]
    pub fn in_features(&self) -> usize {
        self.in_features
    }

    #[must_use]
    pub fn out_features(&self) -> usize {
        self.out_features
    }

    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.weight.len() + self.bias.len()
    }

    fn forward(&self, input: &[f32]) -> Vec<f32> {
        self.weight
            .chunks_exact(self.in_features)
            .zip(&self.bias)
            .map(|(row, &b)| row.iter().zip(input).map(|(w, x)| w * x).sum::<f32>() + b)
            .collect()
    }
}

/// One stage of the sequential network
#[derive(Debug, Clone, PartialEq)]
pub enum Layer {
    Linear(Linear),
    ReLU,
    Dropout(f32),
}

impl Layer {
    fn forward(&self, input: Vec<f32>) -> Vec<f32> {
        match self {
            Layer::Linear(linear) => linear.forward(&input),
            Layer::ReLU => input.into_iter().map(|v| v.max(0.0)).collect(),
            Layer::Dropout(_) => input,
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Linear(l) => write!(f, "Linear({}, {})", l.in_features, l.out_features),
            Layer::ReLU => f.write_str("ReLU"),
            Layer::Dropout(p) => write!(f, "Dropout({p})"),
        }
    }
}

/// Raw classifier outputs, one per emotion class in checkpoint order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Logits([f32; NUM_CLASSES]);

impl Logits {
    #[must_use]
    pub fn new(values: [f32; NUM_CLASSES]) -> Self {
        Self(values)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

/// Pre-trained late-fusion classifier (inference only)
#[derive(Debug, Clone)]
pub struct FusionClassifier {
    layers: Vec<Layer>,
}

impl FusionClassifier {
    /// `(in, out)` of the three linear layers
    pub const LINEAR_SHAPES: [(usize, usize); 3] = [
        (FUSED_DIM, HIDDEN_DIMS[0]),
        (HIDDEN_DIMS[0], HIDDEN_DIMS[1]),
        (HIDDEN_DIMS[1], NUM_CLASSES),
    ];

    /// Sequential indices of the linear layers, matching checkpoint names
    pub const LINEAR_INDICES: [usize; 3] = [0, 3, 6];

    /// Assemble the network from its three linear layers
    ///
    /// # Errors
    ///
    /// `ModelLoadError::Shape` if any layer does not match the fixed architecture.
    pub fn from_linears(linears: [Linear; 3]) -> Result<Self, ModelLoadError> {
        for ((linear, &(fan_in, fan_out)), index) in linears
            .iter()
            .zip(&Self::LINEAR_SHAPES)
            .zip(Self::LINEAR_INDICES)
        {
            if linear.in_features != fan_in || linear.out_features != fan_out {
                return Err(ModelLoadError::Shape {
                    name: format!("{index}.weight"),
                    expected: vec![fan_out, fan_in],
                    found: vec![linear.out_features, linear.in_features],
                });
            }
        }

        let [first, second, output] = linears;
        Ok(Self {
            layers: vec![
                Layer::Linear(first),
                Layer::ReLU,
                Layer::Dropout(DROPOUT),
                Layer::Linear(second),
                Layer::ReLU,
                Layer::Dropout(DROPOUT),
                Layer::Linear(output),
            ],
        })
    }

    #[must_use]
    pub fn input_dim(&self) -> usize {
        FUSED_DIM
    }

    #[must_use]
    pub fn num_classes(&self) -> usize {
        NUM_CLASSES
    }

    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Total number of weights and biases
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.layers
            .iter()
            .map(|layer| match layer {
                Layer::Linear(l) => l.parameter_count(),
                _ => 0,
            })
            .sum()
    }

    /// Deterministic forward pass
    ///
    /// # Errors
    ///
    /// `InputShape` when `fused` is not `FUSED_DIM` long, `NonFiniteLogits` when
    /// the output contains NaN or infinity.
    pub fn forward(&self, fused: &[f32]) -> Result<Logits, FusionError> {
        if fused.len() != FUSED_DIM {
            return Err(FusionError::InputShape {
                expected: FUSED_DIM,
                found: fused.len(),
            });
        }

        let output = self
            .layers
            .iter()
            .fold(fused.to_vec(), |x, layer| layer.forward(x));

        let values: [f32; NUM_CLASSES] =
            output
                .try_into()
                .map_err(|v: Vec<f32>| FusionError::InputShape {
                    expected: NUM_CLASSES,
                    found: v.len(),
                })?;
        if values.iter().any(|v| !v.is_finite()) {
            return Err(FusionError::NonFiniteLogits);
        }
        Ok(Logits(values))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Small deterministic `(weight, bias)` buffers for the three linear layers
    pub(crate) fn seeded_buffers(seed: u64) -> [(Vec<f32>, Vec<f32>); 3] {
        let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        let mut next = move || {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((state >> 40) as f32 / (1u64 << 24) as f32 - 0.5) * 0.2
        };
        FusionClassifier::LINEAR_SHAPES.map(|(fan_in, fan_out)| {
            let weight = (0..fan_in * fan_out).map(|_| next()).collect();
            let bias = (0..fan_out).map(|_| next()).collect();
            (weight, bias)
        })
    }

    pub(crate) fn seeded_linears(seed: u64) -> [Linear; 3] {
        let buffers = seeded_buffers(seed);
        let mut shapes = FusionClassifier::LINEAR_SHAPES.into_iter();
        buffers.map(|(weight, bias)| {
            let (fan_in, fan_out) = shapes.next().unwrap();
            Linear::new(fan_in, fan_out, weight, bias).unwrap()
        })
    }

    #[test]
    fn test_architecture_layout() {
        let model = FusionClassifier::from_linears(seeded_linears(1)).unwrap();
        let names: Vec<String> = model.layers().iter().map(ToString::to_string).collect();
        assert_eq!(
            names,
            vec![
                "Linear(555, 256)",
                "ReLU",
                "Dropout(0.3)",
                "Linear(256, 128)",
                "ReLU",
                "Dropout(0.3)",
                "Linear(128, 8)",
            ]
        );
        assert_eq!(
            model.parameter_count(),
            555 * 256 + 256 + 256 * 128 + 128 + 128 * 8 + 8
        );
    }

    #[test]
    fn test_linear_rejects_bad_buffers() {
        assert!(Linear::new(3, 2, vec![0.0; 5], vec![0.0; 2]).is_err());
        assert!(Linear::new(3, 2, vec![0.0; 6], vec![0.0; 3]).is_err());
    }

    #[test]
    fn test_linear_forward() {
        let linear = Linear::new(2, 2, vec![1.0, 2.0, -1.0, 0.5], vec![0.5, 0.0]).unwrap();
        assert_eq!(linear.forward(&[3.0, 4.0]), vec![11.5, -1.0]);
    }

    #[test]
    fn test_from_linears_rejects_swapped_layers() {
        let [a, b, c] = seeded_linears(2);
        let result = FusionClassifier::from_linears([b, a, c]);
        assert!(matches!(result, Err(ModelLoadError::Shape { .. })));
    }

    #[test]
    fn test_forward_rejects_wrong_input_length() {
        let model = FusionClassifier::from_linears(seeded_linears(3)).unwrap();
        let err = model.forward(&[0.0; 554]).unwrap_err();
        assert_eq!(
            err,
            FusionError::InputShape {
                expected: 555,
                found: 554
            }
        );
    }

    #[test]
    fn test_forward_is_deterministic() {
        let model = FusionClassifier::from_linears(seeded_linears(4)).unwrap();
        let input: Vec<f32> = (0..FUSED_DIM).map(|i| (i as f32 * 0.37).sin()).collect();

        let a = model.forward(&input).unwrap();
        let b = model.forward(&input).unwrap();
        assert_eq!(a, b);
        assert!(a.as_slice().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_zero_input_yields_propagated_biases() {
        // With zero input and zeroed hidden weights, the output is exactly the last bias
        let [first, _, output] = seeded_linears(5);
        let second = Linear::new(256, 128, vec![0.0; 256 * 128], vec![0.0; 128]).unwrap();
        let expected = output.bias.clone();

        let model = FusionClassifier::from_linears([first, second, output]).unwrap();
        let logits = model.forward(&[0.0; FUSED_DIM]).unwrap();
        assert_eq!(logits.as_slice(), expected.as_slice());
    }

    #[test]
    fn test_non_finite_logits_rejected() {
        let [first, second, _] = seeded_linears(6);
        let mut bias = vec![0.0; NUM_CLASSES];
        bias[3] = f32::NAN;
        let output = Linear::new(128, 8, vec![0.0; 128 * 8], bias).unwrap();

        let model = FusionClassifier::from_linears([first, second, output]).unwrap();
        assert_eq!(
            model.forward(&[0.0; FUSED_DIM]),
            Err(FusionError::NonFiniteLogits)
        );
    }
}
