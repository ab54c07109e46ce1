//! Loading classifier weights from a safetensors checkpoint

use crate::classifier::{FusionClassifier, Linear};
use crate::ModelLoadError;
use safetensors::{Dtype, SafeTensors};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

/// Prefix of the tensors exported from the `fc` sequential module
const MODULE_PREFIX: &str = "fc.";

impl FusionClassifier {
    /// Load a checkpoint from disk
    ///
    /// # Errors
    ///
    /// Any I/O failure, a malformed file, or tensors that do not exactly match
    /// the architecture.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelLoadError> {
        let path = path.as_ref();
        info!("Loading fusion classifier from: {}", path.display());
        let buffer = std::fs::read(path).map_err(|source| ModelLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let model = Self::from_safetensors_bytes(&buffer)?;
        info!(
            "Fusion classifier loaded: {} parameters",
            model.parameter_count()
        );
        Ok(model)
    }

    /// Parse an in-memory safetensors checkpoint
    pub fn from_safetensors_bytes(buffer: &[u8]) -> Result<Self, ModelLoadError> {
        let tensors = SafeTensors::deserialize(buffer)
            .map_err(|e| ModelLoadError::Format(e.to_string()))?;
        Self::from_tensors(&tensors)
    }

    /// Build the classifier from parsed tensors.
    ///
    /// Names are `fc.{0,3,6}.{weight,bias}`; the same names without the
    /// `fc.` prefix are accepted too. Every expected tensor must be present,
    /// and nothing else may be.
    pub fn from_tensors(tensors: &SafeTensors<'_>) -> Result<Self, ModelLoadError> {
        let names: BTreeSet<String> = tensors.names().into_iter().cloned().collect();
        debug!("Checkpoint holds {} tensors", names.len());

        let first = format!("{MODULE_PREFIX}{}.weight", Self::LINEAR_INDICES[0]);
        let prefix = if names.contains(&first) {
            MODULE_PREFIX
        } else {
            ""
        };

        let expected: BTreeSet<String> = Self::LINEAR_INDICES
            .iter()
            .flat_map(|i| [format!("{prefix}{i}.weight"), format!("{prefix}{i}.bias")])
            .collect();
        if let Some(extra) = names.difference(&expected).next() {
            return Err(ModelLoadError::UnexpectedTensor(extra.clone()));
        }

        let mut linears = Vec::with_capacity(3);
        for (&index, &(fan_in, fan_out)) in Self::LINEAR_INDICES.iter().zip(&Self::LINEAR_SHAPES) {
            let weight_name = format!("{prefix}{index}.weight");
            let weight = read_f32(tensors, &weight_name, &[fan_out, fan_in])?;
            let bias = read_f32(tensors, &format!("{prefix}{index}.bias"), &[fan_out])?;
            linears.push(Linear::new(fan_in, fan_out, weight, bias)?);
        }

        let linears: [Linear; 3] = linears
            .try_into()
            .map_err(|_| ModelLoadError::Format("expected three linear layers".to_string()))?;
        Self::from_linears(linears)
    }
}

fn read_f32(
    tensors: &SafeTensors<'_>,
    name: &str,
    shape: &[usize],
) -> Result<Vec<f32>, ModelLoadError> {
    let view = tensors
        .tensor(name)
        .map_err(|_| ModelLoadError::MissingTensor(name.to_string()))?;

    if view.dtype() != Dtype::F32 {
        return Err(ModelLoadError::Dtype {
            name: name.to_string(),
            dtype: format!("{:?}", view.dtype()),
        });
    }
    if view.shape() != shape {
        return Err(ModelLoadError::Shape {
            name: name.to_string(),
            expected: shape.to_vec(),
            found: view.shape().to_vec(),
        });
    }

    Ok(view
        .data()
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::tests::{seeded_buffers, seeded_linears};
    use emotion_fusion_common::FUSED_DIM;
    use safetensors::tensor::TensorView;
    use std::collections::BTreeMap;

    struct OwnedTensor {
        dtype: Dtype,
        shape: Vec<usize>,
        bytes: Vec<u8>,
    }

    fn f32_tensor(shape: &[usize], values: &[f32]) -> OwnedTensor {
        OwnedTensor {
            dtype: Dtype::F32,
            shape: shape.to_vec(),
            bytes: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    /// Tensors named the way the PyTorch state dict names them
    fn checkpoint_tensors(prefix: &str, seed: u64) -> BTreeMap<String, OwnedTensor> {
        let mut out = BTreeMap::new();
        for (((weight, bias), &index), &(fan_in, fan_out)) in seeded_buffers(seed)
            .iter()
            .zip(&FusionClassifier::LINEAR_INDICES)
            .zip(&FusionClassifier::LINEAR_SHAPES)
        {
            out.insert(
                format!("{prefix}{index}.weight"),
                f32_tensor(&[fan_out, fan_in], weight),
            );
            out.insert(format!("{prefix}{index}.bias"), f32_tensor(&[fan_out], bias));
        }
        out
    }

    fn serialize(tensors: &BTreeMap<String, OwnedTensor>) -> Vec<u8> {
        let views: Vec<(String, TensorView<'_>)> = tensors
            .iter()
            .map(|(name, t)| {
                (
                    name.clone(),
                    TensorView::new(t.dtype, t.shape.clone(), &t.bytes).unwrap(),
                )
            })
            .collect();
        safetensors::serialize(views, &None).unwrap()
    }

    fn probe_input() -> Vec<f32> {
        (0..FUSED_DIM).map(|i| ((i * 7 % 13) as f32 - 6.0) / 6.0).collect()
    }

    #[test]
    fn test_load_prefixed_checkpoint_from_file() {
        let bytes = serialize(&checkpoint_tensors("fc.", 11));
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), &bytes).unwrap();

        let loaded = FusionClassifier::load(file.path()).unwrap();
        let reference = FusionClassifier::from_linears(seeded_linears(11)).unwrap();

        let input = probe_input();
        assert_eq!(
            loaded.forward(&input).unwrap(),
            reference.forward(&input).unwrap()
        );
        assert_eq!(loaded.parameter_count(), reference.parameter_count());
    }

    #[test]
    fn test_unprefixed_names_accepted() {
        let bytes = serialize(&checkpoint_tensors("", 12));
        assert!(FusionClassifier::from_safetensors_bytes(&bytes).is_ok());
    }

    #[test]
    fn test_missing_tensor_rejected() {
        let mut tensors = checkpoint_tensors("fc.", 13);
        tensors.remove("fc.3.bias");

        let result = FusionClassifier::from_safetensors_bytes(&serialize(&tensors));
        match result {
            Err(ModelLoadError::MissingTensor(name)) => assert_eq!(name, "fc.3.bias"),
            other => panic!("expected MissingTensor, got {other:?}"),
        }
    }

    #[test]
    fn test_unexpected_tensor_rejected() {
        let mut tensors = checkpoint_tensors("fc.", 14);
        tensors.insert("fc.9.weight".to_string(), f32_tensor(&[1], &[0.0]));

        let result = FusionClassifier::from_safetensors_bytes(&serialize(&tensors));
        assert!(matches!(result, Err(ModelLoadError::UnexpectedTensor(_))));
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        // Weights exported from a model with a 512-dim input
        let mut tensors = checkpoint_tensors("fc.", 15);
        tensors.insert(
            "fc.0.weight".to_string(),
            f32_tensor(&[256, 512], &vec![0.0; 256 * 512]),
        );

        let result = FusionClassifier::from_safetensors_bytes(&serialize(&tensors));
        match result {
            Err(ModelLoadError::Shape {
                name,
                expected,
                found,
            }) => {
                assert_eq!(name, "fc.0.weight");
                assert_eq!(expected, vec![256, 555]);
                assert_eq!(found, vec![256, 512]);
            }
            other => panic!("expected Shape, got {other:?}"),
        }
    }

    #[test]
    fn test_non_f32_dtype_rejected() {
        let mut tensors = checkpoint_tensors("fc.", 16);
        tensors.insert(
            "fc.6.bias".to_string(),
            OwnedTensor {
                dtype: Dtype::F16,
                shape: vec![8],
                bytes: vec![0; 16],
            },
        );

        let result = FusionClassifier::from_safetensors_bytes(&serialize(&tensors));
        assert!(matches!(result, Err(ModelLoadError::Dtype { .. })));
    }

    #[test]
    fn test_missing_file_and_garbage() {
        assert!(matches!(
            FusionClassifier::load("/nonexistent/model.safetensors"),
            Err(ModelLoadError::Io { .. })
        ));
        assert!(matches!(
            FusionClassifier::from_safetensors_bytes(b"definitely not safetensors"),
            Err(ModelLoadError::Format(_))
        ));
    }
}
