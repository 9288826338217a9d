//! Normalization plans for checkpoint tooling.
//!
//! A plan is a YAML file naming the checkpoint tensors to treat as kernels,
//! how to interpret each one, and the spectral-norm bound to enforce. Plans
//! are loaded with [`load_plan`].

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// How a checkpoint tensor should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    /// Rank-2 dense kernel `[input_dim, units]`.
    Dense,
    /// Rank-4 convolution kernel `[out_channels, in_channels, kh, kw]`.
    Conv2d,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
/// One kernel to check or rescale.
pub struct LayerPlan {
    /// Tensor name inside the checkpoint.
    pub name: String,
    /// Kernel kind; decides which estimator applies.
    pub kind: LayerKind,
    /// Input spatial size `[height, width]`; required for conv kernels.
    pub input_size: Option<[usize; 2]>,
    /// Per-layer override of the plan-wide bound.
    pub norm_multiplier: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
/// Normalization plan for a whole checkpoint.
pub struct NormalizePlan {
    /// Bound applied to every layer without an override.
    #[serde(default = "default_norm_multiplier")]
    pub norm_multiplier: f32,
    /// Kernels to check or rescale.
    pub layers: Vec<LayerPlan>,
}

fn default_norm_multiplier() -> f32 {
    0.95
}

impl NormalizePlan {
    /// The bound in effect for one layer.
    pub fn multiplier_for(&self, layer: &LayerPlan) -> f32 {
        layer.norm_multiplier.unwrap_or(self.norm_multiplier)
    }
}

/// Load a normalization plan from a YAML file.
///
/// # Errors
///
/// Returns an error if the file doesn't exist or contains invalid YAML.
pub fn load_plan(path: impl AsRef<Path>) -> anyhow::Result<NormalizePlan> {
    let path = path.as_ref();
    if !path.exists() {
        anyhow::bail!("Plan file not found: {}", path.display());
    }

    let data = fs::read_to_string(path)?;
    let plan: NormalizePlan = serde_yaml::from_str(&data)?;
    Ok(plan)
}
