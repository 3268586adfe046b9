#![forbid(unsafe_code)]

//! Fused mixed-radix Stockham kernel.
//!
//! Decimation in frequency with auto-sorting ping-pong buffers: stage `t`
//! with radix `r` maps `x[q + s*(p + i*m)]` to
//! `y[q + s*(r*p + j)] = (sum_i x[...] * W_r^{ij}) * W_n^{pj}` where
//! `m = n/r`, after which `n = m` and `s *= r`. No bit-reversal pass is
//! needed.

use gfft_device::{Direction, KernelArgs, KernelFault, KernelIo, Sample};
use num_complex::Complex;
use num_traits::Zero;

use super::{invalid, load, root_of_unity, source, store};

struct Stage<T> {
    radix: usize,
    span: usize,
    stride: usize,
    roots: Vec<Complex<T>>,
    twiddles: Vec<Complex<T>>,
}

/// Precomputed factorization and twiddles for one length and direction.
pub(crate) struct StockhamPlan<T> {
    length: usize,
    stages: Vec<Stage<T>>,
}

/// Prime factors of `n` in ascending order.
pub(crate) fn factorize(mut n: usize) -> Vec<usize> {
    let mut factors = Vec::new();
    let mut p = 2;
    while p * p <= n {
        while n.is_multiple_of(p) {
            factors.push(p);
            n /= p;
        }
        p += 1;
    }
    if n > 1 {
        factors.push(n);
    }
    factors
}

impl<T: Sample> StockhamPlan<T> {
    pub(crate) fn new(length: usize, direction: Direction) -> Self {
        let sign = direction.sign();
        let mut stages = Vec::new();
        let mut n = length;
        let mut stride = 1;
        for radix in factorize(length) {
            let span = n / radix;
            let roots = (0..radix).map(|t| root_of_unity(sign, t, radix)).collect();
            let twiddles = (0..span)
                .flat_map(|p| (0..radix).map(move |j| root_of_unity(sign, p * j, n)))
                .collect();
            stages.push(Stage {
                radix,
                span,
                stride,
                roots,
                twiddles,
            });
            n = span;
            stride *= radix;
        }
        Self { length, stages }
    }

    /// Transform `x` in place; `work` is a same-length temporary.
    pub(crate) fn run(&self, x: &mut [Complex<T>], work: &mut [Complex<T>]) {
        let mut in_x = true;
        for stage in &self.stages {
            let (from, to): (&[Complex<T>], &mut [Complex<T>]) = if in_x {
                (&*x, &mut *work)
            } else {
                (&*work, &mut *x)
            };
            let (r, m, s) = (stage.radix, stage.span, stage.stride);
            for p in 0..m {
                for q in 0..s {
                    for j in 0..r {
                        let mut acc: Complex<T> = Complex::zero();
                        for i in 0..r {
                            acc = acc + from[q + s * (p + i * m)] * stage.roots[(i * j) % r];
                        }
                        to[q + s * (r * p + j)] = acc * stage.twiddles[p * r + j];
                    }
                }
            }
            in_x = !in_x;
        }
        if !in_x {
            x.copy_from_slice(work);
        }
    }

    pub(crate) fn length(&self) -> usize {
        self.length
    }
}

/// `KernelStockham`: length-`args.length` DFT along axis 0 of every batch.
pub fn stockham<T: Sample>(io: &mut KernelIo<'_>, args: &KernelArgs) -> Result<(), KernelFault> {
    let n = args.length;
    if n == 0 || args.shape.first() != Some(&n) {
        return Err(invalid(format!(
            "stockham length {n} does not match launch shape {:?}",
            args.shape
        )));
    }
    let mut data = load::<T>(io, source(args), n, args)?;
    let plan = StockhamPlan::<T>::new(n, args.direction);
    let mut work = vec![Complex::<T>::zero(); plan.length()];
    for vector in data.chunks_exact_mut(n) {
        plan.run(vector, &mut work);
    }
    store(io, &args.dst, n, args, &data)
}
