//! Activation normalization with data-dependent initialization.
//!
//! ActNorm fits a per-channel bias and log-scale from the first batch it
//! sees, so that batch comes out with zero mean and unit variance per
//! channel. Later batches reuse the fitted parameters unchanged.

use crate::modules::channel_moments;
use burn::tensor::{backend::Backend, Tensor};

/// Configuration for creating an [`ActNorm`] layer.
#[derive(Debug, Clone)]
pub struct ActNormConfig {
    /// Variance floor used when fitting the log-scale.
    pub epsilon: f32,
}

impl Default for ActNormConfig {
    fn default() -> Self {
        Self { epsilon: 1e-7 }
    }
}

impl ActNormConfig {
    /// Create a config with the default epsilon.
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize an unfitted ActNorm layer.
    pub fn init<B: Backend>(&self) -> ActNorm<B> {
        ActNorm {
            epsilon: self.epsilon,
            params: None,
        }
    }
}

/// Fitted per-channel parameters.
#[derive(Debug, Clone)]
pub struct ActNormParams<B: Backend> {
    /// Additive shift `[channels]` (the negated channel means).
    pub bias: Tensor<B, 1>,
    /// Log of the multiplicative scale `[channels]`.
    pub log_scale: Tensor<B, 1>,
}

/// Activation normalization layer.
///
/// The last input dimension is treated as channels; any rank of at least 2
/// is supported.
#[derive(Debug, Clone)]
pub struct ActNorm<B: Backend> {
    epsilon: f32,
    /// Fitted parameters, present after the first forward pass.
    pub params: Option<ActNormParams<B>>,
}

impl<B: Backend> ActNorm<B> {
    /// Whether the layer has been fitted to data.
    pub fn is_initialized(&self) -> bool {
        self.params.is_some()
    }

    /// Apply `(x + bias) * exp(log_scale)`, fitting the parameters from this
    /// batch if the layer has not seen data yet.
    pub fn forward<const D: usize>(&mut self, input: Tensor<B, D>) -> Tensor<B, D> {
        let epsilon = self.epsilon;
        let params = self
            .params
            .get_or_insert_with(|| Self::fit(input.clone(), epsilon))
            .clone();

        let dims = input.dims();
        let channels = dims[D - 1];
        let rows: usize = dims[..D - 1].iter().product();
        let flat = input.reshape([rows, channels]);
        let bias = params.bias.reshape([1, channels]);
        let scale = params.log_scale.exp().reshape([1, channels]);
        ((flat + bias) * scale).reshape(dims)
    }

    fn fit<const D: usize>(input: Tensor<B, D>, epsilon: f32) -> ActNormParams<B> {
        let (mean, variance) = channel_moments(input);
        let bias = mean.neg();
        let log_scale = variance.add_scalar(epsilon).log().mul_scalar(-0.5);
        ActNormParams { bias, log_scale }
    }
}
