//! Spectral normalization for 2D convolutions.
//!
//! The singular vectors of a convolution are feature maps, not flat vectors,
//! so power iteration runs the kernel forward with `conv2d` and backward with
//! `conv_transpose2d` over maps shaped like the layer's input and output.
//! Iteration uses SAME padding with the layer's stride, which bounds the
//! valid-padding operator the wrapped layer actually applies.
//!
//! Reference: Farnia, Zhang & Tse, "Generalizable Adversarial Training via
//! Spectral Normalization", ICLR 2019.

use crate::modules::{l2_normalize, Conv2d, SpectralNormConfig};
use anyhow::{bail, Result};
use burn::tensor::{
    backend::Backend,
    module::{conv2d, conv_transpose2d},
    ops::{ConvOptions, ConvTransposeOptions},
    Distribution, ElementConversion, Tensor,
};

impl SpectralNormConfig {
    /// Wrap a convolution, fixing the input spatial size the singular-vector
    /// maps are built against.
    ///
    /// # Errors
    ///
    /// Fails for even kernel sizes (symmetric SAME padding is undefined),
    /// grouped convolutions, and input sizes the stride cannot map back to.
    pub fn wrap_conv2d<B: Backend>(
        &self,
        layer: Conv2d<B>,
        input_size: [usize; 2],
    ) -> Result<SpectralNormConv2d<B>> {
        let device = layer.weight.device();
        let [out_channels, in_channels, kh, kw] = layer.weight.dims();
        if kh % 2 == 0 || kw % 2 == 0 {
            bail!("spectral normalization requires odd kernel sizes, got {kh}x{kw}");
        }
        if layer.config.groups != 1 {
            bail!("grouped convolutions are not supported");
        }

        let stride = layer.config.stride;
        let dilation = layer.config.dilation;
        let padding = [dilation[0] * (kh - 1) / 2, dilation[1] * (kw - 1) / 2];

        let [in_h, in_w] = input_size;
        if in_h == 0 || in_w == 0 {
            bail!("input size must be non-zero, got {in_h}x{in_w}");
        }
        let out_h = in_h.div_ceil(stride[0]);
        let out_w = in_w.div_ceil(stride[1]);
        let out_padding = [
            transpose_out_padding(in_h, out_h, stride[0], padding[0], dilation[0], kh)?,
            transpose_out_padding(in_w, out_w, stride[1], padding[1], dilation[1], kw)?,
        ];

        let u = l2_normalize(Tensor::random(
            [1, out_channels, out_h, out_w],
            Distribution::Normal(0.0, 1.0),
            &device,
        ));
        let v = l2_normalize(Tensor::random(
            [1, in_channels, in_h, in_w],
            Distribution::Normal(0.0, 1.0),
            &device,
        ));

        Ok(SpectralNormConv2d {
            layer,
            iteration: self.iteration.max(1),
            norm_multiplier: self.norm_multiplier,
            padding,
            out_padding,
            u,
            v,
        })
    }
}

/// Extra output padding needed so `conv_transpose2d` lands back on the input
/// length along one dimension.
fn transpose_out_padding(
    input_len: usize,
    output_len: usize,
    stride: usize,
    padding: usize,
    dilation: usize,
    kernel: usize,
) -> Result<usize> {
    let base = ((output_len - 1) * stride + dilation * (kernel - 1) + 1) as isize
        - 2 * padding as isize;
    let out_padding = input_len as isize - base;
    if out_padding < 0 || out_padding as usize >= stride.max(1) {
        bail!("input length {input_len} is incompatible with stride {stride}");
    }
    Ok(out_padding as usize)
}

/// Convolution wrapped with spectral normalization.
#[derive(Debug, Clone)]
pub struct SpectralNormConv2d<B: Backend> {
    /// The wrapped layer; `update_weights` rescales its kernel in place.
    pub layer: Conv2d<B>,
    iteration: usize,
    norm_multiplier: f32,
    /// SAME padding used during power iteration.
    padding: [usize; 2],
    out_padding: [usize; 2],
    /// Output-space singular-vector map `[1, out_channels, out_h, out_w]`.
    u: Tensor<B, 4>,
    /// Input-space singular-vector map `[1, in_channels, in_h, in_w]`.
    v: Tensor<B, 4>,
}

impl<B: Backend> SpectralNormConv2d<B> {
    /// Run power iteration and rescale the kernel if its largest singular
    /// value exceeds the bound. Returns the singular-value estimate before
    /// rescaling.
    pub fn update_weights(&mut self) -> f32 {
        let weight = self.layer.weight.clone();

        let mut u = self.u.clone();
        let mut v = self.v.clone();
        for _ in 0..self.iteration {
            v = l2_normalize(conv_transpose2d(
                u.clone(),
                weight.clone(),
                None,
                self.backward_options(),
            ));
            u = l2_normalize(conv2d(
                v.clone(),
                weight.clone(),
                None,
                self.forward_options(),
            ));
        }

        let forward_v = conv2d(v.clone(), weight, None, self.forward_options());
        let sigma: f32 = (u.clone() * forward_v).sum().into_scalar().elem();
        self.u = u;
        self.v = v;

        let ratio = self.norm_multiplier / sigma;
        if ratio < 1.0 {
            self.layer.weight = self.layer.weight.clone().mul_scalar(ratio);
        }
        sigma
    }

    /// Apply the wrapped layer.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.layer.forward(input)
    }

    fn forward_options(&self) -> ConvOptions<2> {
        ConvOptions::new(
            self.layer.config.stride,
            self.padding,
            self.layer.config.dilation,
            1,
        )
    }

    fn backward_options(&self) -> ConvTransposeOptions<2> {
        ConvTransposeOptions::new(
            self.layer.config.stride,
            self.padding,
            self.out_padding,
            self.layer.config.dilation,
            1,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::Conv2dConfig;
    use burn_ndarray::{NdArray, NdArrayDevice};

    type TestBackend = NdArray<f32>;

    #[test]
    fn pointwise_kernel_sigma_is_its_magnitude() {
        let device = NdArrayDevice::default();
        // A 1x1 single-channel kernel of 2.0 is the operator 2*I.
        let config = Conv2dConfig::new(1, 1, [1, 1]);
        let weight = Tensor::<TestBackend, 4>::from_floats([[[[2.0]]]], &device);
        let layer = Conv2d::new(config, weight, None);

        let mut wrapped = SpectralNormConfig::new()
            .with_iteration(5)
            .with_norm_multiplier(0.95)
            .wrap_conv2d(layer, [4, 4])
            .unwrap();
        let sigma = wrapped.update_weights();
        assert!((sigma - 2.0).abs() < 1e-5, "sigma {sigma} should be ~2");

        let weight = wrapped.layer.weight.to_data();
        let values = weight.as_slice::<f32>().unwrap();
        assert!((values[0] - 0.95).abs() < 1e-5);
    }

    #[test]
    fn even_kernel_is_rejected() {
        let device = NdArrayDevice::default();
        let layer = Conv2dConfig::new(1, 4, [2, 2]).init::<TestBackend>(&device);
        let err = SpectralNormConfig::new().wrap_conv2d(layer, [8, 8]);
        assert!(err.is_err());
    }

    #[test]
    fn strided_wrapper_runs_power_iteration() {
        let device = NdArrayDevice::default();
        let layer = Conv2dConfig::new(2, 4, [3, 3])
            .with_stride([2, 2])
            .init::<TestBackend>(&device);
        let mut wrapped = SpectralNormConfig::new()
            .with_iteration(20)
            .wrap_conv2d(layer, [16, 16])
            .unwrap();
        let sigma = wrapped.update_weights();
        assert!(sigma > 0.0);
    }
}
