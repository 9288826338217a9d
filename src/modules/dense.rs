//! Minimal dense (fully connected) op used as a spectral-norm wrap target.

use burn::tensor::{backend::Backend, Distribution, Tensor};

/// Configuration for creating a [`Dense`] op.
#[derive(Debug, Clone)]
pub struct DenseConfig {
    /// Number of input features.
    pub input_dim: usize,
    /// Number of output features.
    pub units: usize,
    /// Whether to include a bias term.
    pub bias: bool,
}

impl DenseConfig {
    /// Create a new config with a bias term.
    pub fn new(input_dim: usize, units: usize) -> Self {
        Self {
            input_dim,
            units,
            bias: true,
        }
    }

    /// Disable or enable the bias term.
    pub fn with_bias(mut self, bias: bool) -> Self {
        self.bias = bias;
        self
    }

    /// Initialize a Dense op on the given device.
    ///
    /// The kernel uses Glorot uniform initialization; the bias starts at zero.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Dense<B> {
        let limit = (6.0 / (self.input_dim + self.units) as f64).sqrt();
        let weight = Tensor::random(
            [self.input_dim, self.units],
            Distribution::Uniform(-limit, limit),
            device,
        );
        let bias = self.bias.then(|| Tensor::zeros([self.units], device));
        Dense { weight, bias }
    }
}

/// Dense op computing `y = x W + b`.
#[derive(Debug, Clone)]
pub struct Dense<B: Backend> {
    /// Kernel with shape `[input_dim, units]`.
    pub weight: Tensor<B, 2>,
    /// Optional bias `[units]`.
    pub bias: Option<Tensor<B, 1>>,
}

impl<B: Backend> Dense<B> {
    /// Create a dense op from an existing kernel and bias.
    pub fn new(weight: Tensor<B, 2>, bias: Option<Tensor<B, 1>>) -> Self {
        Self { weight, bias }
    }

    /// Apply the op to a `[batch, input_dim]` tensor.
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let output = input.matmul(self.weight.clone());
        match &self.bias {
            Some(bias) => {
                let units = bias.dims()[0];
                output + bias.clone().reshape([1, units])
            }
            None => output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};

    type TestBackend = NdArray<f32>;

    #[test]
    fn dense_forward_matches_matmul() {
        let device = NdArrayDevice::default();
        let weight = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0], [3.0, 4.0]], &device);
        let bias = Some(Tensor::<TestBackend, 1>::from_floats([10.0, 20.0], &device));
        let layer = Dense::new(weight, bias);

        let input = Tensor::<TestBackend, 2>::from_floats([[1.0, 1.0]], &device);
        let output = layer.forward(input).to_data();
        assert_eq!(output.as_slice::<f32>().unwrap(), &[14.0, 26.0]);
    }

    #[test]
    fn dense_init_shapes() {
        let device = NdArrayDevice::default();
        let layer = DenseConfig::new(7, 3).init::<TestBackend>(&device);
        assert_eq!(layer.weight.dims(), [7, 3]);
        assert_eq!(layer.bias.as_ref().map(|b| b.dims()), Some([3]));

        let no_bias = DenseConfig::new(7, 3)
            .with_bias(false)
            .init::<TestBackend>(&device);
        assert!(no_bias.bias.is_none());
    }
}
