//! # specnorm - Lipschitz-constrained normalization layers
//!
//! Normalization layers built on the burn tensor ecosystem:
//!
//! 1. **ActNorm** ([`modules::ActNorm`]): activation normalization with
//!    data-dependent initialization. The first batch fits a per-channel bias
//!    and scale so activations come out with zero mean and unit variance.
//!
//! 2. **Spectral normalization** ([`modules::SpectralNorm`],
//!    [`modules::SpectralNormConv2d`]): wrappers that rescale a dense or
//!    convolutional kernel via power iteration so its largest singular value
//!    stays below a configured multiplier, bounding the wrapped layer's
//!    Lipschitz constant.
//!
//! 3. **Reference estimators** ([`spectral`]): backend-independent spectral
//!    norms for matrices (power iteration) and convolutions (the FFT method
//!    of Sedghi et al.), also reachable through the `specnorm` CLI for
//!    checking and rescaling safetensors checkpoints.
//!
//! ## Quick Start
//!
//! ```
//! use burn_ndarray::{NdArray, NdArrayDevice};
//! use specnorm::modules::{DenseConfig, SpectralNormConfig};
//!
//! let device = NdArrayDevice::default();
//! let dense = DenseConfig::new(8, 8).init::<NdArray<f32>>(&device);
//!
//! let mut bounded = SpectralNormConfig::new()
//!     .with_iteration(50)
//!     .with_norm_multiplier(0.95)
//!     .wrap(dense);
//!
//! // Rescales the kernel in place; sigma is the pre-rescale estimate.
//! let sigma = bounded.update_weights();
//! assert!(sigma > 0.0);
//! ```

pub mod config;
pub mod modules;
pub mod spectral;
pub mod weights;

// Re-exports forming the public API
pub use config::{load_plan, LayerKind, LayerPlan, NormalizePlan};
pub use modules::{ActNorm, Conv2d, Dense, SpectralNorm, SpectralNormConv2d};
pub use spectral::{conv2d_spectral_norm, matrix_spectral_norm};
