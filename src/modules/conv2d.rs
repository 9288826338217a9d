//! Minimal 2D convolution op used as a spectral-norm wrap target.
//!
//! Data layout is NCHW and the kernel is `[out_channels, in_channels, kh, kw]`.

use burn::tensor::{
    backend::Backend, module::conv2d, ops::ConvOptions, Distribution, Tensor,
};

/// Configuration for creating a [`Conv2d`] op.
#[derive(Debug, Clone)]
pub struct Conv2dConfig {
    /// Number of input channels.
    pub in_channels: usize,
    /// Number of output channels (filters).
    pub out_channels: usize,
    /// Kernel size `[kh, kw]`.
    pub kernel_size: [usize; 2],
    /// Stride `[sh, sw]`.
    pub stride: [usize; 2],
    /// Explicit zero padding `[ph, pw]` (zero for a "valid" convolution).
    pub padding: [usize; 2],
    /// Dilation `[dh, dw]`.
    pub dilation: [usize; 2],
    /// Number of groups.
    pub groups: usize,
    /// Whether to include a bias term.
    pub bias: bool,
}

impl Conv2dConfig {
    /// Create a valid (unpadded), stride-1, biased convolution config.
    pub fn new(in_channels: usize, out_channels: usize, kernel_size: [usize; 2]) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel_size,
            stride: [1, 1],
            padding: [0, 0],
            dilation: [1, 1],
            groups: 1,
            bias: true,
        }
    }

    /// Set the stride.
    pub fn with_stride(mut self, stride: [usize; 2]) -> Self {
        self.stride = stride;
        self
    }

    /// Initialize a Conv2d op on the given device.
    ///
    /// The kernel uses Glorot uniform initialization; the bias starts at zero.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Conv2d<B> {
        let [kh, kw] = self.kernel_size;
        let fan_in = self.in_channels * kh * kw;
        let fan_out = self.out_channels * kh * kw;
        let limit = (6.0 / (fan_in + fan_out) as f64).sqrt();
        let weight = Tensor::random(
            [self.out_channels, self.in_channels / self.groups, kh, kw],
            Distribution::Uniform(-limit, limit),
            device,
        );
        let bias = self.bias.then(|| Tensor::zeros([self.out_channels], device));
        Conv2d {
            config: self.clone(),
            weight,
            bias,
        }
    }
}

/// 2D convolution op.
#[derive(Debug, Clone)]
pub struct Conv2d<B: Backend> {
    /// Convolution config.
    pub config: Conv2dConfig,
    /// Kernel `[out_channels, in_channels / groups, kh, kw]`.
    pub weight: Tensor<B, 4>,
    /// Optional bias `[out_channels]`.
    pub bias: Option<Tensor<B, 1>>,
}

impl<B: Backend> Conv2d<B> {
    /// Create a conv op from an existing kernel and bias.
    pub fn new(config: Conv2dConfig, weight: Tensor<B, 4>, bias: Option<Tensor<B, 1>>) -> Self {
        Self {
            config,
            weight,
            bias,
        }
    }

    /// Apply the convolution to a `[batch, channels, height, width]` tensor.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        conv2d(
            input,
            self.weight.clone(),
            self.bias.clone(),
            ConvOptions::new(
                self.config.stride,
                self.config.padding,
                self.config.dilation,
                self.config.groups,
            ),
        )
    }

    /// Spatial output size for a given input size under this config.
    pub fn output_size(&self, input_size: [usize; 2]) -> [usize; 2] {
        [
            conv_output_len(
                input_size[0],
                self.config.kernel_size[0],
                self.config.stride[0],
                self.config.dilation[0],
                self.config.padding[0],
            ),
            conv_output_len(
                input_size[1],
                self.config.kernel_size[1],
                self.config.stride[1],
                self.config.dilation[1],
                self.config.padding[1],
            ),
        ]
    }
}

/// Compute the output length of a convolution along one dimension.
fn conv_output_len(
    input_len: usize,
    kernel: usize,
    stride: usize,
    dilation: usize,
    padding: usize,
) -> usize {
    let kernel_extent = dilation * (kernel.saturating_sub(1)) + 1;
    let padded = input_len + 2 * padding;
    if padded < kernel_extent {
        return 0;
    }
    (padded - kernel_extent) / stride + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};

    type TestBackend = NdArray<f32>;

    #[test]
    fn conv2d_forward_valid_padding() {
        let device = NdArrayDevice::default();
        let config = Conv2dConfig::new(1, 1, [2, 2]);
        let weight = Tensor::<TestBackend, 4>::from_floats([[[[1.0, 0.0], [0.0, 1.0]]]], &device);
        let bias = Some(Tensor::<TestBackend, 1>::from_floats([1.0], &device));
        let op = Conv2d::new(config, weight, bias);

        let input = Tensor::<TestBackend, 4>::from_floats(
            [[[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]]],
            &device,
        );
        let output = op.forward(input);
        assert_eq!(output.dims(), [1, 1, 2, 2]);
        // Each entry is the sum of the main diagonal of a 2x2 window, plus bias.
        assert_eq!(
            output.to_data().as_slice::<f32>().unwrap(),
            &[7.0, 9.0, 13.0, 15.0]
        );
    }

    #[test]
    fn conv2d_output_size() {
        let device = NdArrayDevice::default();
        let op = Conv2dConfig::new(3, 8, [3, 3]).init::<TestBackend>(&device);
        assert_eq!(op.output_size([32, 32]), [30, 30]);

        let strided = Conv2dConfig::new(3, 8, [3, 3])
            .with_stride([2, 2])
            .init::<TestBackend>(&device);
        assert_eq!(strided.output_size([32, 32]), [15, 15]);
    }
}
