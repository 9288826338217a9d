//! Backend-independent spectral-norm estimators.
//!
//! These work on plain row-major arrays so checkpoints can be inspected
//! without instantiating tensors, and so the tests have a reference that is
//! independent of the tensor-space power iteration inside the wrappers.
//!
//! The convolution estimator follows Sedghi, Gupta & Long, "The Singular
//! Values of Convolutional Layers" (ICLR 2019): take the 2-D FFT of every
//! (out, in) kernel plane zero-padded to the input size, then the spectral
//! norm is the largest singular value over the per-frequency transfer
//! matrices.

use anyhow::{bail, Result};
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

const MAX_ITERATIONS: usize = 500;
const CONVERGENCE_EPS: f64 = 1e-12;

/// Largest singular value of a real `rows x cols` matrix in row-major order.
pub fn matrix_spectral_norm(data: &[f32], rows: usize, cols: usize) -> Result<f32> {
    if data.len() != rows * cols {
        bail!(
            "matrix data has {} elements, expected {rows}x{cols}",
            data.len()
        );
    }
    if rows == 0 || cols == 0 {
        bail!("matrix dimensions must be non-zero");
    }
    let complex: Vec<Complex<f64>> = data
        .iter()
        .map(|&x| Complex::new(f64::from(x), 0.0))
        .collect();
    Ok(complex_spectral_norm(&complex, rows, cols) as f32)
}

/// Largest singular value of a 2-D convolution with circular boundary
/// conditions on inputs of the given spatial size.
///
/// `kernel` is row-major `[out_channels, in_channels, kh, kw]`.
pub fn conv2d_spectral_norm(
    kernel: &[f32],
    dims: [usize; 4],
    input_size: [usize; 2],
) -> Result<f32> {
    let [out_channels, in_channels, kh, kw] = dims;
    let [height, width] = input_size;
    if kernel.len() != out_channels * in_channels * kh * kw {
        bail!(
            "kernel data has {} elements, expected {out_channels}x{in_channels}x{kh}x{kw}",
            kernel.len()
        );
    }
    if out_channels == 0 || in_channels == 0 || kh == 0 || kw == 0 {
        bail!("kernel dimensions must be non-zero");
    }
    if kh > height || kw > width {
        bail!("kernel {kh}x{kw} is larger than the input {height}x{width}");
    }

    // FFT of every kernel plane, zero-padded to the input size.
    let mut planner = FftPlanner::<f64>::new();
    let fft_row = planner.plan_fft_forward(width);
    let fft_col = planner.plan_fft_forward(height);
    let plane_len = height * width;
    let mut spectra = vec![Complex::new(0.0, 0.0); out_channels * in_channels * plane_len];
    let mut column = vec![Complex::new(0.0, 0.0); height];
    for out in 0..out_channels {
        for inp in 0..in_channels {
            let plane = &mut spectra[(out * in_channels + inp) * plane_len..][..plane_len];
            for r in 0..kh {
                for c in 0..kw {
                    let tap = kernel[((out * in_channels + inp) * kh + r) * kw + c];
                    plane[r * width + c] = Complex::new(f64::from(tap), 0.0);
                }
            }
            for r in 0..height {
                fft_row.process(&mut plane[r * width..(r + 1) * width]);
            }
            for c in 0..width {
                for r in 0..height {
                    column[r] = plane[r * width + c];
                }
                fft_col.process(&mut column);
                for r in 0..height {
                    plane[r * width + c] = column[r];
                }
            }
        }
    }

    // Max singular value over the per-frequency transfer matrices.
    let mut max_sigma = 0.0f64;
    let mut transfer = vec![Complex::new(0.0, 0.0); out_channels * in_channels];
    for freq in 0..plane_len {
        for out in 0..out_channels {
            for inp in 0..in_channels {
                transfer[out * in_channels + inp] =
                    spectra[(out * in_channels + inp) * plane_len + freq];
            }
        }
        let sigma = complex_spectral_norm(&transfer, out_channels, in_channels);
        if sigma > max_sigma {
            max_sigma = sigma;
        }
    }
    Ok(max_sigma as f32)
}

/// Largest singular value of a complex matrix via power iteration on AᴴA.
fn complex_spectral_norm(matrix: &[Complex<f64>], rows: usize, cols: usize) -> f64 {
    // Slightly uneven start vector so symmetric matrices cannot cancel it.
    let mut x: Vec<Complex<f64>> = (0..cols)
        .map(|c| Complex::new(1.0 + 0.01 * c as f64, 0.0))
        .collect();
    normalize(&mut x);

    let mut y = vec![Complex::new(0.0, 0.0); rows];
    let mut sigma = 0.0f64;
    for _ in 0..MAX_ITERATIONS {
        // y = A x, with x at unit length: ||y|| estimates sigma.
        for (r, slot) in y.iter_mut().enumerate() {
            let mut acc = Complex::new(0.0, 0.0);
            for c in 0..cols {
                acc += matrix[r * cols + c] * x[c];
            }
            *slot = acc;
        }
        let estimate = l2(&y);
        if estimate <= f64::MIN_POSITIVE {
            return 0.0;
        }

        // x = Aᴴ y, renormalized.
        for (c, slot) in x.iter_mut().enumerate() {
            let mut acc = Complex::new(0.0, 0.0);
            for r in 0..rows {
                acc += matrix[r * cols + c].conj() * y[r];
            }
            *slot = acc;
        }
        normalize(&mut x);

        if (estimate - sigma).abs() <= CONVERGENCE_EPS * estimate.max(1.0) {
            return estimate;
        }
        sigma = estimate;
    }
    sigma
}

fn l2(vector: &[Complex<f64>]) -> f64 {
    vector.iter().map(|z| z.norm_sqr()).sum::<f64>().sqrt()
}

fn normalize(vector: &mut [Complex<f64>]) {
    let norm = l2(vector);
    if norm > f64::MIN_POSITIVE {
        for z in vector.iter_mut() {
            *z /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagonal_matrix() {
        let sigma = matrix_spectral_norm(&[3.0, 0.0, 0.0, 1.0], 2, 2).unwrap();
        assert!((sigma - 3.0).abs() < 1e-6);
    }

    #[test]
    fn rectangular_matrix() {
        // Rank-1: [1, 2]^T [1, 1], singular value sqrt(5) * sqrt(2).
        let sigma = matrix_spectral_norm(&[1.0, 1.0, 2.0, 2.0], 2, 2).unwrap();
        assert!((sigma - 10.0f32.sqrt()).abs() < 1e-5);
    }

    #[test]
    fn matrix_size_mismatch_is_rejected() {
        assert!(matrix_spectral_norm(&[1.0, 2.0, 3.0], 2, 2).is_err());
    }

    #[test]
    fn pointwise_conv_reduces_to_the_channel_matrix() {
        // A 1x1 kernel is the same transfer matrix at every frequency.
        let kernel = [2.0, 0.0, 0.0, 1.0];
        let conv_sigma = conv2d_spectral_norm(&kernel, [2, 2, 1, 1], [8, 8]).unwrap();
        let mat_sigma = matrix_spectral_norm(&kernel, 2, 2).unwrap();
        assert!((conv_sigma - mat_sigma).abs() < 1e-5);
        assert!((conv_sigma - 2.0).abs() < 1e-5);
    }

    #[test]
    fn box_filter_peaks_at_the_zero_frequency() {
        // All-ones 2x2 filter: the transfer function peaks at DC with value 4.
        let kernel = [1.0f32; 4];
        let sigma = conv2d_spectral_norm(&kernel, [1, 1, 2, 2], [4, 4]).unwrap();
        assert!((sigma - 4.0).abs() < 1e-5);
    }

    #[test]
    fn oversized_kernel_is_rejected() {
        let kernel = [0.0f32; 9];
        assert!(conv2d_spectral_norm(&kernel, [1, 1, 3, 3], [2, 2]).is_err());
    }
}
