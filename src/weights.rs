//! SafeTensors raw-tensor IO.
//!
//! Checkpoint tensors are kept as raw byte payloads so the CLI can rescale
//! kernels and write them back without routing through a tensor backend.

use anyhow::{bail, Result};
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Raw tensor payload extracted from a SafeTensors file.
#[derive(Debug, Clone)]
pub struct RawTensor {
    /// Scalar dtype in the file.
    pub dtype: Dtype,
    /// Shape as a list of dimensions.
    pub shape: Vec<usize>,
    /// Raw byte buffer in row-major order.
    pub data: Vec<u8>,
}

impl RawTensor {
    /// Create a RawTensor from a safetensors TensorView.
    pub fn from_safetensor(tensor: TensorView<'_>) -> Self {
        Self {
            dtype: tensor.dtype(),
            shape: tensor.shape().to_vec(),
            data: tensor.data().to_vec(),
        }
    }

    /// Create an f32 RawTensor from values in row-major order.
    pub fn from_f32(shape: Vec<usize>, values: &[f32]) -> Self {
        let mut data = Vec::with_capacity(values.len() * 4);
        for value in values {
            data.extend_from_slice(&value.to_le_bytes());
        }
        Self {
            dtype: Dtype::F32,
            shape,
            data,
        }
    }

    /// Decode the payload to f32 values.
    ///
    /// # Errors
    ///
    /// Returns an error for dtypes other than f32 and f64.
    pub fn to_f32(&self) -> Result<Vec<f32>> {
        match self.dtype {
            Dtype::F32 => Ok(self
                .data
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect()),
            Dtype::F64 => Ok(self
                .data
                .chunks_exact(8)
                .map(|b| {
                    f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32
                })
                .collect()),
            other => bail!("unsupported dtype {other:?} (expected f32 or f64)"),
        }
    }
}

/// Load every tensor in a SafeTensors file.
///
/// # Errors
///
/// Returns an error if the file doesn't exist or isn't valid SafeTensors.
pub fn load_tensors(path: impl AsRef<Path>) -> Result<HashMap<String, RawTensor>> {
    let path = path.as_ref();
    if !path.exists() {
        bail!("weights file not found: {}", path.display());
    }

    let bytes = fs::read(path)?;
    let tensors = SafeTensors::deserialize(&bytes)?;
    let mut state = HashMap::new();
    for name in tensors.names() {
        let tensor = tensors.tensor(name)?;
        state.insert(name.to_string(), RawTensor::from_safetensor(tensor));
    }
    Ok(state)
}

/// Write tensors to a SafeTensors file.
pub fn save_tensors(path: impl AsRef<Path>, tensors: &HashMap<String, RawTensor>) -> Result<()> {
    let mut views = Vec::with_capacity(tensors.len());
    for (name, tensor) in tensors {
        views.push((
            name.clone(),
            TensorView::new(tensor.dtype, tensor.shape.clone(), &tensor.data)?,
        ));
    }
    let bytes = safetensors::serialize(views, None)?;
    fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kernels.safetensors");

        let values = vec![1.0f32, -2.0, 3.5, 0.0, 4.0, -1.5];
        let mut tensors = HashMap::new();
        tensors.insert(
            "dense/kernel".to_string(),
            RawTensor::from_f32(vec![2, 3], &values),
        );
        save_tensors(&path, &tensors).unwrap();

        let loaded = load_tensors(&path).unwrap();
        let tensor = &loaded["dense/kernel"];
        assert_eq!(tensor.shape, vec![2, 3]);
        assert_eq!(tensor.to_f32().unwrap(), values);
    }

    #[test]
    fn missing_file_errors() {
        let err = load_tensors("does-not-exist.safetensors").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn non_float_dtype_is_rejected() {
        let tensor = RawTensor {
            dtype: Dtype::I64,
            shape: vec![1],
            data: vec![0; 8],
        };
        assert!(tensor.to_f32().is_err());
    }
}
