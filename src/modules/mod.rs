//! Normalization layer building blocks.
//!
//! These modules implement activation normalization and spectral-norm
//! wrappers over minimal dense and convolution ops. The wrappers rescale a
//! layer's kernel so its largest singular value stays below a configured
//! bound, which in turn bounds the layer's Lipschitz constant.

pub mod act_norm;
pub mod conv2d;
pub mod dense;
pub mod spectral_norm;
pub mod spectral_norm_conv2d;

pub use act_norm::{ActNorm, ActNormConfig};
pub use conv2d::{Conv2d, Conv2dConfig};
pub use dense::{Dense, DenseConfig};
pub use spectral_norm::{SpectralNorm, SpectralNormConfig};
pub use spectral_norm_conv2d::SpectralNormConv2d;

use burn::tensor::{backend::Backend, ElementConversion, Tensor};

/// Rescale a tensor to unit L2 norm (treating it as one flat vector).
pub fn l2_normalize<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Tensor<B, D> {
    let norm: f32 = tensor
        .clone()
        .powf_scalar(2.0)
        .sum()
        .sqrt()
        .into_scalar()
        .elem();
    tensor.div_scalar(norm + 1e-12)
}

/// Per-channel mean and biased variance over all leading axes.
///
/// The last dimension is treated as channels; both outputs have shape
/// `[channels]`.
pub fn channel_moments<B: Backend, const D: usize>(
    input: Tensor<B, D>,
) -> (Tensor<B, 1>, Tensor<B, 1>) {
    let dims = input.dims();
    let channels = dims[D - 1];
    let rows: usize = dims[..D - 1].iter().product();
    let flat = input.reshape([rows, channels]);
    let mean = flat.clone().mean_dim(0);
    let variance = (flat - mean.clone()).powf_scalar(2.0).mean_dim(0);
    (mean.squeeze::<1>(0), variance.squeeze::<1>(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};

    type TestBackend = NdArray<f32>;

    #[test]
    fn l2_normalize_unit_length() {
        let device = NdArrayDevice::default();
        let tensor = Tensor::<TestBackend, 1>::from_floats([3.0, 4.0], &device);
        let normalized = l2_normalize(tensor).to_data();
        assert_eq!(normalized.as_slice::<f32>().unwrap(), &[0.6, 0.8]);
    }

    #[test]
    fn channel_moments_over_leading_axes() {
        let device = NdArrayDevice::default();
        // Channel 0 holds [1, 3], channel 1 holds [2, 6].
        let input =
            Tensor::<TestBackend, 3>::from_floats([[[1.0, 2.0]], [[3.0, 6.0]]], &device);
        let (mean, variance) = channel_moments(input);
        assert_eq!(mean.to_data().as_slice::<f32>().unwrap(), &[2.0, 4.0]);
        assert_eq!(variance.to_data().as_slice::<f32>().unwrap(), &[1.0, 4.0]);
    }
}
