#![forbid(unsafe_code)]

//! Chirp-z kernels.
//!
//! With `c[n] = exp(s*i*pi*n^2/N)`, `X[k] = c[k] * sum_n (x[n]*c[n]) * conj(c[k-n])`,
//! a linear convolution evaluated through length-`M` transforms, `M >= 2N-1`.

use gfft_device::{KernelArgs, KernelFault, KernelIo, Sample};
use num_complex::Complex;
use num_traits::Zero;

use super::{invalid, load, source, store};

/// `c[k]` reduced modulo `2N` in exact integer arithmetic first.
fn chirp_at<T: Sample>(sign: f64, k: usize, n: usize) -> Complex<T> {
    let period = 2 * n as u128;
    let square = (k as u128 * k as u128) % period;
    T::unit(sign * std::f64::consts::PI * square as f64 / n as f64)
}

fn padded_length(args: &KernelArgs) -> Result<usize, KernelFault> {
    let n = args.length;
    let m = args.shape.first().copied().unwrap_or(0);
    if n == 0 || m < 2 * n - 1 {
        return Err(invalid(format!(
            "bluestein length {n} needs a padded length of at least {}, got {m}",
            (2 * n).saturating_sub(1)
        )));
    }
    Ok(m)
}

/// `KernelChirp`: write the convolution filter `b` (length `M`):
/// `b[m] = b[M-m] = conj(c[m])` for `m < N`, zero elsewhere.
pub fn chirp<T: Sample>(io: &mut KernelIo<'_>, args: &KernelArgs) -> Result<(), KernelFault> {
    let m = padded_length(args)?;
    let n = args.length;
    let sign = args.direction.sign();
    let mut filter = vec![Complex::<T>::zero(); m];
    for k in 0..n {
        let value = chirp_at::<T>(sign, k, n).conj();
        filter[k] = value;
        if k > 0 {
            filter[m - k] = value;
        }
    }
    let batches = args.batch_count();
    let out: Vec<_> = (0..batches).flat_map(|_| filter.iter().copied()).collect();
    store(io, &args.dst, m, args, &out)
}

/// `KernelPadMul`: `a[k] = x[k]*c[k]` for `k < N`, zero up to `M`.
pub fn pad_mul<T: Sample>(io: &mut KernelIo<'_>, args: &KernelArgs) -> Result<(), KernelFault> {
    let m = padded_length(args)?;
    let n = args.length;
    let sign = args.direction.sign();
    let input = load::<T>(io, source(args), n, args)?;
    let mut out = Vec::with_capacity(m * args.batch_count());
    for row in input.chunks_exact(n) {
        out.extend(
            row.iter()
                .enumerate()
                .map(|(k, &x)| x * chirp_at::<T>(sign, k, n)),
        );
        out.extend(std::iter::repeat_n(Complex::<T>::zero(), m - n));
    }
    store(io, &args.dst, m, args, &out)
}

/// `KernelPointwiseMul`: `dst[k] *= src[k]`; a zero batch stride on `src`
/// broadcasts one filter across the batch.
pub fn pointwise_mul<T: Sample>(
    io: &mut KernelIo<'_>,
    args: &KernelArgs,
) -> Result<(), KernelFault> {
    let count = args
        .shape
        .first()
        .copied()
        .ok_or_else(|| invalid("launch shape is empty"))?;
    let Some(src) = args.src.as_ref() else {
        return Err(invalid("pointwise multiply needs a source operand"));
    };
    let filter = load::<T>(io, src, count, args)?;
    let mut values = load::<T>(io, &args.dst, count, args)?;
    for (value, factor) in values.iter_mut().zip(&filter) {
        *value = *value * *factor;
    }
    store(io, &args.dst, count, args, &values)
}

/// `KernelResMul`: `X[k] = c[k] * conv[k]` for `k < N`. The `1/M` of the
/// unscaled convolution arrives through `args.scale`.
pub fn res_mul<T: Sample>(io: &mut KernelIo<'_>, args: &KernelArgs) -> Result<(), KernelFault> {
    let n = args.length;
    if n == 0 || args.shape.first() != Some(&n) {
        return Err(invalid("result multiply must cover N elements"));
    }
    let sign = args.direction.sign();
    let mut values = load::<T>(io, source(args), n, args)?;
    for (flat, value) in values.iter_mut().enumerate() {
        *value = *value * chirp_at::<T>(sign, flat % n, n);
    }
    store(io, &args.dst, n, args, &values)
}
