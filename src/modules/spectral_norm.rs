//! Spectral normalization for dense layers.
//!
//! The wrapper tracks the leading singular pair of the wrapped kernel with
//! power iteration and rescales the kernel whenever its largest singular
//! value exceeds the configured multiplier. A layer normalized this way is
//! `norm_multiplier`-Lipschitz in the L2 norm.
//!
//! Reference: Miyato et al., "Spectral Normalization for Generative
//! Adversarial Networks", ICLR 2018.

use crate::modules::{l2_normalize, Dense};
use burn::tensor::{backend::Backend, Distribution, ElementConversion, Tensor};

/// Configuration shared by the dense and convolutional spectral-norm
/// wrappers.
#[derive(Debug, Clone)]
pub struct SpectralNormConfig {
    /// Number of power-iteration steps per update (minimum 1).
    pub iteration: usize,
    /// Target bound on the kernel's largest singular value.
    pub norm_multiplier: f32,
}

impl Default for SpectralNormConfig {
    fn default() -> Self {
        Self {
            iteration: 1,
            norm_multiplier: 0.95,
        }
    }
}

impl SpectralNormConfig {
    /// Create a config with the defaults (one iteration, multiplier 0.95).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of power-iteration steps per update.
    pub fn with_iteration(mut self, iteration: usize) -> Self {
        self.iteration = iteration;
        self
    }

    /// Set the bound on the largest singular value.
    pub fn with_norm_multiplier(mut self, norm_multiplier: f32) -> Self {
        self.norm_multiplier = norm_multiplier;
        self
    }

    /// Wrap a dense layer, initializing the persisted singular vector.
    pub fn wrap<B: Backend>(&self, layer: Dense<B>) -> SpectralNorm<B> {
        let device = layer.weight.device();
        let units = layer.weight.dims()[1];
        let u = l2_normalize(Tensor::random(
            [1, units],
            Distribution::Normal(0.0, 1.0),
            &device,
        ));
        SpectralNorm {
            layer,
            iteration: self.iteration.max(1),
            norm_multiplier: self.norm_multiplier,
            u,
        }
    }
}

/// Dense layer wrapped with spectral normalization.
#[derive(Debug, Clone)]
pub struct SpectralNorm<B: Backend> {
    /// The wrapped layer; `update_weights` rescales its kernel in place.
    pub layer: Dense<B>,
    iteration: usize,
    norm_multiplier: f32,
    /// Persisted estimate of the leading left singular vector, `[1, units]`.
    u: Tensor<B, 2>,
}

impl<B: Backend> SpectralNorm<B> {
    /// Run power iteration and rescale the kernel if its largest singular
    /// value exceeds the bound. Kernels already inside the bound are left
    /// untouched. Returns the singular-value estimate before rescaling.
    pub fn update_weights(&mut self) -> f32 {
        let weight = self.layer.weight.clone();
        let mut u = self.u.clone();
        let mut v = l2_normalize(u.clone().matmul(weight.clone().transpose()));
        u = l2_normalize(v.clone().matmul(weight.clone()));
        for _ in 1..self.iteration {
            v = l2_normalize(u.clone().matmul(weight.clone().transpose()));
            u = l2_normalize(v.clone().matmul(weight.clone()));
        }

        let sigma: f32 = v
            .clone()
            .matmul(weight)
            .matmul(u.clone().transpose())
            .into_scalar()
            .elem();
        self.u = u;

        let ratio = self.norm_multiplier / sigma;
        if ratio < 1.0 {
            self.layer.weight = self.layer.weight.clone().mul_scalar(ratio);
        }
        sigma
    }

    /// Apply the wrapped layer.
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        self.layer.forward(input)
    }
}
