#![forbid(unsafe_code)]

//! Naive O(n^2) DFTs in f64, the yardstick compiled plans are checked against.

use gfft_device::Direction;
use num_complex::Complex;

/// Unscaled 1-D DFT with the exponent sign of `direction`.
#[must_use]
pub fn naive_dft(input: &[Complex<f64>], direction: Direction) -> Vec<Complex<f64>> {
    let n = input.len();
    let sign = direction.sign();
    (0..n)
        .map(|k| {
            input
                .iter()
                .enumerate()
                .map(|(t, &value)| {
                    let phase = ((k * t) % n) as f64 / n as f64;
                    value * Complex::from_polar(1.0, sign * std::f64::consts::TAU * phase)
                })
                .sum()
        })
        .collect()
}

/// Unscaled DFT over every axis of a packed array (axis 0 fastest).
#[must_use]
pub fn naive_dft_nd(
    input: &[Complex<f64>],
    lengths: &[usize],
    direction: Direction,
) -> Vec<Complex<f64>> {
    let mut data = input.to_vec();
    let mut stride = 1;
    for &len in lengths {
        let block = stride * len;
        for start in (0..data.len()).step_by(block.max(1)) {
            for offset in 0..stride {
                let line: Vec<_> = (0..len).map(|i| data[start + offset + i * stride]).collect();
                for (i, value) in naive_dft(&line, direction).into_iter().enumerate() {
                    data[start + offset + i * stride] = value;
                }
            }
        }
        stride = block;
    }
    data
}

/// Forward DFT of real samples, first `n/2+1` bins per transform along axis 0.
#[must_use]
pub fn naive_real_forward(input: &[f64], lengths: &[usize]) -> Vec<Complex<f64>> {
    let complex: Vec<_> = input.iter().map(|&x| Complex::new(x, 0.0)).collect();
    let full = naive_dft_nd(&complex, lengths, Direction::Forward);
    let n0 = lengths.first().copied().unwrap_or(1);
    full.chunks(n0.max(1))
        .flat_map(|row| row.iter().take(n0 / 2 + 1).copied())
        .collect()
}

#[cfg(test)]
mod tests {
    use gfft_device::Direction;
    use gfft_runtime::assert_close;
    use num_complex::Complex;

    use super::{naive_dft, naive_dft_nd, naive_real_forward};

    #[test]
    fn naive_dft_of_ramp_matches_closed_form() {
        let input: Vec<_> = (0..8).map(|i| Complex::new(f64::from(i), 0.0)).collect();
        let out = naive_dft(&input, Direction::Forward);
        assert_close(out[0].re, 28.0, 1e-12, 0.0);
        for (k, value) in out.iter().enumerate().skip(1) {
            let cot = 1.0 / (std::f64::consts::PI * k as f64 / 8.0).tan();
            assert_close(value.re, -4.0, 1e-12, 0.0);
            assert_close(value.im, 4.0 * cot, 1e-12, 0.0);
        }
    }

    #[test]
    fn nd_dft_of_impulse_is_flat() {
        let mut input = vec![Complex::new(0.0, 0.0); 12];
        input[0] = Complex::new(1.0, 0.0);
        for value in naive_dft_nd(&input, &[3, 4], Direction::Inverse) {
            assert_close(value.re, 1.0, 1e-12, 0.0);
            assert_close(value.im, 0.0, 1e-12, 0.0);
        }
    }

    #[test]
    fn real_forward_keeps_half_spectrum_rows() {
        let out = naive_real_forward(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[3, 2]);
        assert_eq!(out.len(), 4);
        assert_close(out[0].re, 21.0, 1e-12, 0.0);
    }
}
