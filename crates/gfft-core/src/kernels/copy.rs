#![forbid(unsafe_code)]

//! Data-movement kernels: strided transposes, twiddle multiplication and the
//! real/complex/hermitian conversions used around complex sub-plans.

use gfft_device::{ElementKind, KernelArgs, KernelFault, KernelIo, Operand, Sample};

use super::{invalid, load, root_of_unity, source, store};

fn expect_kind(op: &Operand, kind: ElementKind) -> Result<(), KernelFault> {
    if op.kind != kind {
        return Err(invalid(format!(
            "{} operand must hold {kind:?} elements",
            op.role
        )));
    }
    Ok(())
}

fn axis_count(args: &KernelArgs) -> Result<usize, KernelFault> {
    args.shape
        .first()
        .copied()
        .ok_or_else(|| invalid("launch shape is empty"))
}

fn strided_copy<T: Sample>(
    io: &mut KernelIo<'_>,
    args: &KernelArgs,
    from: ElementKind,
    to: ElementKind,
) -> Result<(), KernelFault> {
    let src = source(args);
    expect_kind(src, from)?;
    expect_kind(&args.dst, to)?;
    let count = axis_count(args)?;
    let values = load::<T>(io, src, count, args)?;
    store(io, &args.dst, count, args, &values)
}

/// `KernelTranspose`: complex strided copy; the operands' strides encode the
/// permutation.
pub fn transpose<T: Sample>(io: &mut KernelIo<'_>, args: &KernelArgs) -> Result<(), KernelFault> {
    strided_copy::<T>(io, args, ElementKind::Complex, ElementKind::Complex)
}

/// `KernelTwiddle`: copy element `(i, b)` (axis 0, first batch axis)
/// multiplied by `W_N^{i*b}`, `N = args.length`.
pub fn twiddle<T: Sample>(io: &mut KernelIo<'_>, args: &KernelArgs) -> Result<(), KernelFault> {
    let count = axis_count(args)?;
    let rows = args.shape.get(1).copied().unwrap_or(1);
    let n = args.length;
    if n == 0 || count.saturating_mul(rows) > n {
        return Err(invalid(format!(
            "twiddle block {count}x{rows} exceeds length {n}"
        )));
    }
    let src = source(args);
    expect_kind(src, ElementKind::Complex)?;
    expect_kind(&args.dst, ElementKind::Complex)?;
    let sign = args.direction.sign();
    let mut values = load::<T>(io, src, count, args)?;
    for (flat, value) in values.iter_mut().enumerate() {
        let i = flat % count;
        let b = (flat / count) % rows;
        *value = *value * root_of_unity::<T>(sign, i * b, n);
    }
    store(io, &args.dst, count, args, &values)
}

/// `KernelRealToComplex`: widen real samples to complex with zero imaginary part.
pub fn real_to_complex<T: Sample>(
    io: &mut KernelIo<'_>,
    args: &KernelArgs,
) -> Result<(), KernelFault> {
    strided_copy::<T>(io, args, ElementKind::Real, ElementKind::Complex)
}

/// `KernelComplexToReal`: keep the real part.
pub fn complex_to_real<T: Sample>(
    io: &mut KernelIo<'_>,
    args: &KernelArgs,
) -> Result<(), KernelFault> {
    strided_copy::<T>(io, args, ElementKind::Complex, ElementKind::Real)
}

/// `KernelComplexToHermitian`: keep bins `0..=N/2` of a full spectrum.
pub fn complex_to_hermitian<T: Sample>(
    io: &mut KernelIo<'_>,
    args: &KernelArgs,
) -> Result<(), KernelFault> {
    if axis_count(args)? != args.length / 2 + 1 {
        return Err(invalid("hermitian copy must cover N/2+1 bins"));
    }
    strided_copy::<T>(io, args, ElementKind::Complex, ElementKind::Complex)
}

/// `KernelHermitianToComplex`: rebuild the full length-`N` spectrum from
/// bins `0..=N/2` using `X[N-k] = conj(X[k])`.
pub fn hermitian_to_complex<T: Sample>(
    io: &mut KernelIo<'_>,
    args: &KernelArgs,
) -> Result<(), KernelFault> {
    let n = args.length;
    if n == 0 || axis_count(args)? != n {
        return Err(invalid("hermitian expansion must produce N bins"));
    }
    let src = source(args);
    expect_kind(src, ElementKind::Complex)?;
    expect_kind(&args.dst, ElementKind::Complex)?;
    let half = n / 2 + 1;
    let packed = load::<T>(io, src, half, args)?;
    let mut full = Vec::with_capacity(n * args.batch_count());
    for row in packed.chunks_exact(half) {
        full.extend((0..n).map(|k| if k < half { row[k] } else { row[n - k].conj() }));
    }
    store(io, &args.dst, n, args, &full)
}

#[cfg(test)]
mod tests {
    use gfft_device::{
        BufferRole, DeviceBuffer, Direction, ElementKind, KernelArgs, KernelIo, Operand, Precision,
    };
    use gfft_runtime::assert_close;
    use num_complex::Complex;

    use super::{complex_to_real, hermitian_to_complex, real_to_complex, transpose, twiddle};

    fn op(role: BufferRole, kind: ElementKind, strides: Vec<usize>) -> Operand {
        Operand::new(role, kind, 0, strides)
    }

    #[test]
    fn transpose_permutes_a_matrix() {
        let values: Vec<_> = (0..6).map(|i| Complex::new(f64::from(i), 0.0)).collect();
        let mut input = DeviceBuffer::from_complex(Precision::Double, &values);
        let mut output = DeviceBuffer::zeroed(Precision::Double, 12);
        // 2 rows x 3 columns, row-major in; column-major out.
        let args = KernelArgs {
            length: 6,
            shape: vec![3, 2],
            src: Some(op(BufferRole::Input, ElementKind::Complex, vec![1, 3])),
            dst: op(BufferRole::Output, ElementKind::Complex, vec![2, 1]),
            direction: Direction::Forward,
            scale: 1.0,
        };
        transpose::<f64>(&mut KernelIo::new(&mut input, Some(&mut output), None), &args)
            .expect("transpose");
        let re: Vec<_> = output.to_complex().iter().map(|c| c.re).collect();
        assert_eq!(re, vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
    }

    #[test]
    fn twiddle_multiplies_by_index_product_root() {
        let ones = vec![Complex::new(1.0, 0.0); 4];
        let mut buffer = DeviceBuffer::from_complex(Precision::Double, &ones);
        let args = KernelArgs {
            length: 4,
            shape: vec![2, 2],
            src: None,
            dst: op(BufferRole::Input, ElementKind::Complex, vec![1, 2]),
            direction: Direction::Forward,
            scale: 1.0,
        };
        twiddle::<f64>(&mut KernelIo::new(&mut buffer, None, None), &args).expect("twiddle");
        let out = buffer.to_complex();
        // (i=1, b=1) picks up W_4^1 = -i.
        assert_close(out[3].re, 0.0, 1e-15, 0.0);
        assert_close(out[3].im, -1.0, 1e-15, 0.0);
        assert_eq!(out[0], Complex::new(1.0, 0.0));
        assert_eq!(out[1], Complex::new(1.0, 0.0));
    }

    #[test]
    fn real_round_trip_through_complex_copies() {
        let mut real = DeviceBuffer::from_scalars(Precision::Single, &[1.0, -2.0, 3.5]);
        let mut complex = DeviceBuffer::zeroed(Precision::Single, 6);
        let to_complex = KernelArgs {
            length: 3,
            shape: vec![3],
            src: Some(op(BufferRole::Input, ElementKind::Real, vec![1])),
            dst: op(BufferRole::Output, ElementKind::Complex, vec![1]),
            direction: Direction::Forward,
            scale: 1.0,
        };
        real_to_complex::<f32>(&mut KernelIo::new(&mut real, Some(&mut complex), None), &to_complex)
            .expect("widen");
        assert_eq!(complex.to_scalars(), vec![1.0, 0.0, -2.0, 0.0, 3.5, 0.0]);

        let back = KernelArgs {
            src: Some(op(BufferRole::Input, ElementKind::Complex, vec![1])),
            dst: op(BufferRole::Output, ElementKind::Real, vec![1]),
            scale: 2.0,
            ..to_complex
        };
        let mut out = DeviceBuffer::zeroed(Precision::Single, 3);
        complex_to_real::<f32>(&mut KernelIo::new(&mut complex, Some(&mut out), None), &back)
            .expect("narrow");
        assert_eq!(out.to_scalars(), vec![2.0, -4.0, 7.0]);
    }

    #[test]
    fn hermitian_expansion_mirrors_conjugates() {
        let half = [
            Complex::new(1.0, 0.0),
            Complex::new(2.0, 1.0),
            Complex::new(3.0, 0.0),
        ];
        let mut input = DeviceBuffer::from_complex(Precision::Double, &half);
        let mut output = DeviceBuffer::zeroed(Precision::Double, 8);
        let args = KernelArgs {
            length: 4,
            shape: vec![4],
            src: Some(op(BufferRole::Input, ElementKind::Complex, vec![1])),
            dst: op(BufferRole::Output, ElementKind::Complex, vec![1]),
            direction: Direction::Inverse,
            scale: 1.0,
        };
        hermitian_to_complex::<f64>(&mut KernelIo::new(&mut input, Some(&mut output), None), &args)
            .expect("expand");
        assert_eq!(output.to_complex()[3], Complex::new(2.0, -1.0));
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let mut buffer = DeviceBuffer::zeroed(Precision::Double, 8);
        let args = KernelArgs {
            length: 4,
            shape: vec![4],
            src: None,
            dst: op(BufferRole::Input, ElementKind::Real, vec![1]),
            direction: Direction::Forward,
            scale: 1.0,
        };
        assert!(transpose::<f64>(&mut KernelIo::new(&mut buffer, None, None), &args).is_err());
    }
}
