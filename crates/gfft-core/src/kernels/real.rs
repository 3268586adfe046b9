#![forbid(unsafe_code)]

//! Pack/unpack kernels of the half-length real transform.
//!
//! A length-`N` real signal (N even, `H = N/2`) viewed as `z[n] = x[2n] +
//! i*x[2n+1]` has `Z = E + i*O`, where `E`/`O` are the DFTs of the even/odd
//! samples. The post-process recovers `X[k] = E[k] + W_N^k * O[k]`; the
//! pre-process inverts it into `2*Z[k]`, so the unscaled inverse round trip
//! yields `N*x` like every other unscaled inverse.

use gfft_device::{KernelArgs, KernelFault, KernelIo, Sample};
use num_complex::Complex;

use super::{invalid, load, root_of_unity, source, store};

fn half_length(args: &KernelArgs) -> Result<usize, KernelFault> {
    let half = args.shape.first().copied().unwrap_or(0);
    if half == 0 || args.length != 2 * half {
        return Err(invalid(format!(
            "real pack length {} needs launch shape N/2, got {:?}",
            args.length, args.shape
        )));
    }
    Ok(half)
}

/// `KernelRealPost`: `H` complex bins of the packed transform to the
/// `H+1` non-redundant bins of the real transform.
pub fn real_post<T: Sample>(io: &mut KernelIo<'_>, args: &KernelArgs) -> Result<(), KernelFault> {
    let half = half_length(args)?;
    let n = args.length;
    let sign = args.direction.sign();
    let packed = load::<T>(io, source(args), half, args)?;
    let two = T::narrow(2.0);
    let i = Complex::new(T::zero(), T::one());
    let mut out = Vec::with_capacity((half + 1) * args.batch_count());
    for z in packed.chunks_exact(half) {
        for k in 0..=half {
            let zk = z[k % half];
            let zc = z[(half - k) % half].conj();
            let even = (zk + zc) / two;
            let odd = (zk - zc) / (i * two);
            out.push(even + root_of_unity::<T>(sign, k, n) * odd);
        }
    }
    store(io, &args.dst, half + 1, args, &out)
}

/// `KernelRealPre`: `H+1` hermitian bins to `2*Z[k]` for the half-length
/// inverse transform.
pub fn real_pre<T: Sample>(io: &mut KernelIo<'_>, args: &KernelArgs) -> Result<(), KernelFault> {
    let half = half_length(args)?;
    let n = args.length;
    let sign = args.direction.sign();
    let bins = load::<T>(io, source(args), half + 1, args)?;
    let i = Complex::new(T::zero(), T::one());
    let mut out = Vec::with_capacity(half * args.batch_count());
    for x in bins.chunks_exact(half + 1) {
        for k in 0..half {
            let xc = x[half - k].conj();
            let even = x[k] + xc;
            let odd = (x[k] - xc) * root_of_unity::<T>(sign, k, n);
            out.push(even + i * odd);
        }
    }
    store(io, &args.dst, half, args, &out)
}

#[cfg(test)]
mod tests {
    use gfft_device::{
        BufferRole, DeviceBuffer, Direction, ElementKind, KernelArgs, KernelIo, Operand, Precision,
    };
    use gfft_runtime::assert_close;
    use num_complex::Complex;

    use super::{real_post, real_pre};
    use crate::reference::{naive_dft, naive_real_forward};

    fn args(n: usize, direction: Direction) -> KernelArgs {
        KernelArgs {
            length: n,
            shape: vec![n / 2],
            src: Some(Operand::new(BufferRole::Input, ElementKind::Complex, 0, vec![1])),
            dst: Operand::new(BufferRole::Output, ElementKind::Complex, 0, vec![1]),
            direction,
            scale: 1.0,
        }
    }

    #[test]
    fn post_process_recovers_real_spectrum() {
        let x = [0.5, -1.0, 2.0, 0.25, 3.0, 1.5];
        let z: Vec<_> = x.chunks(2).map(|p| Complex::new(p[0], p[1])).collect();
        let packed = naive_dft(&z, Direction::Forward);
        let mut input = DeviceBuffer::from_complex(Precision::Double, &packed);
        let mut output = DeviceBuffer::zeroed(Precision::Double, 8);
        real_post::<f64>(
            &mut KernelIo::new(&mut input, Some(&mut output), None),
            &args(6, Direction::Forward),
        )
        .expect("post");
        let expected = naive_real_forward(&x, &[6]);
        for (a, e) in output.to_complex().iter().zip(&expected) {
            assert_close(a.re, e.re, 1e-12, 1e-12);
            assert_close(a.im, e.im, 1e-12, 1e-12);
        }
    }

    #[test]
    fn pre_process_inverts_post_process_times_two() {
        let x = [1.0, 2.0, -3.0, 0.5];
        let z: Vec<_> = x.chunks(2).map(|p| Complex::new(p[0], p[1])).collect();
        let spectrum = naive_real_forward(&x, &[4]);
        let mut input = DeviceBuffer::from_complex(Precision::Double, &spectrum);
        let mut output = DeviceBuffer::zeroed(Precision::Double, 4);
        real_pre::<f64>(
            &mut KernelIo::new(&mut input, Some(&mut output), None),
            &args(4, Direction::Inverse),
        )
        .expect("pre");
        let expected = naive_dft(&z, Direction::Forward);
        for (a, e) in output.to_complex().iter().zip(&expected) {
            assert_close(a.re, 2.0 * e.re, 1e-12, 1e-12);
            assert_close(a.im, 2.0 * e.im, 1e-12, 1e-12);
        }
    }

    #[test]
    fn odd_lengths_are_rejected() {
        let mut buffer = DeviceBuffer::zeroed(Precision::Double, 8);
        let mut bad = args(4, Direction::Forward);
        bad.length = 5;
        assert!(real_post::<f64>(&mut KernelIo::new(&mut buffer, None, None), &bad).is_err());
    }
}
