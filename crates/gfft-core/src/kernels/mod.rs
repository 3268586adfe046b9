#![forbid(unsafe_code)]

//! Host reference kernel catalog.
//!
//! Every kernel follows the same contract: it first gathers all the elements
//! it reads (for every batch position) and only then scatters its results,
//! so a launch whose source and destination alias the same buffer behaves
//! exactly like an out-of-place launch. Results are multiplied by
//! `args.scale` on store.

pub mod bluestein;
pub mod copy;
pub mod real;
pub mod stockham;

use gfft_device::{
    ElementKind, KernelArgs, KernelFault, KernelFn, KernelIo, Operand, Precision, Sample,
};
use num_complex::Complex;
use num_traits::Zero;

use crate::registry::{KernelHandle, KernelRegistryBuilder, RegistryConfig};
use crate::scheme::{ComputeScheme, KernelKey};

/// Register the fused kernels of every direct length in `config` and all
/// auxiliary kernels, for both precisions.
pub fn register_catalog(builder: &mut KernelRegistryBuilder, config: &RegistryConfig) {
    let direct = config.direct_lengths();
    for precision in Precision::ALL {
        for &n in &direct {
            let key = KernelKey::direct(n, precision);
            if let Some(handle) = catalog_handle(&key) {
                builder.insert(key, handle);
            }
        }
        for scheme in ComputeScheme::AUXILIARY {
            let key = KernelKey::auxiliary(scheme, precision);
            if let Some(handle) = catalog_handle(&key) {
                builder.insert(key, handle);
            }
        }
    }
}

/// Host implementation for `key`, if the catalog has one.
#[must_use]
pub fn catalog_handle(key: &KernelKey) -> Option<KernelHandle> {
    let entry = match key.precision {
        Precision::Single => entry::<f32>(key.scheme)?,
        Precision::Double => entry::<f64>(key.scheme)?,
    };
    Some(KernelHandle::new(
        format!("{}_{}_{}", key.scheme.name(), key.length, key.precision),
        entry,
    ))
}

fn entry<T: Sample>(scheme: ComputeScheme) -> Option<KernelFn> {
    let entry: KernelFn = match scheme {
        ComputeScheme::KernelStockham => stockham::stockham::<T>,
        ComputeScheme::KernelTranspose => copy::transpose::<T>,
        ComputeScheme::KernelTwiddle => copy::twiddle::<T>,
        ComputeScheme::KernelRealToComplex => copy::real_to_complex::<T>,
        ComputeScheme::KernelComplexToHermitian => copy::complex_to_hermitian::<T>,
        ComputeScheme::KernelHermitianToComplex => copy::hermitian_to_complex::<T>,
        ComputeScheme::KernelComplexToReal => copy::complex_to_real::<T>,
        ComputeScheme::KernelChirp => bluestein::chirp::<T>,
        ComputeScheme::KernelPadMul => bluestein::pad_mul::<T>,
        ComputeScheme::KernelPointwiseMul => bluestein::pointwise_mul::<T>,
        ComputeScheme::KernelResMul => bluestein::res_mul::<T>,
        ComputeScheme::KernelRealPost => real::real_post::<T>,
        ComputeScheme::KernelRealPre => real::real_pre::<T>,
        ComputeScheme::Factored
        | ComputeScheme::TransposeLarge
        | ComputeScheme::Bluestein
        | ComputeScheme::RealPacked
        | ComputeScheme::RealEmbedded
        | ComputeScheme::MultiAxis => return None,
    };
    Some(entry)
}

/// Operand read by the launch: `src`, or `dst` for in-place launches.
pub(crate) fn source(args: &KernelArgs) -> &Operand {
    args.src.as_ref().unwrap_or(&args.dst)
}

pub(crate) fn invalid(detail: impl Into<String>) -> KernelFault {
    KernelFault::InvalidArguments {
        detail: detail.into(),
    }
}

/// `exp(sign * 2*pi*i * numerator / denominator)` with the phase reduced
/// modulo the denominator before rounding.
pub(crate) fn root_of_unity<T: Sample>(
    sign: f64,
    numerator: usize,
    denominator: usize,
) -> Complex<T> {
    let reduced = (numerator % denominator) as f64;
    T::unit(sign * std::f64::consts::TAU * reduced / denominator as f64)
}

fn check_rank(op: &Operand, args: &KernelArgs) -> Result<(), KernelFault> {
    if op.strides.len() != args.shape.len() {
        return Err(invalid(format!(
            "{} operand has {} strides for a rank-{} launch",
            op.role,
            op.strides.len(),
            args.shape.len()
        )));
    }
    Ok(())
}

fn read<T: Sample>(data: &[T], op: &Operand, element: usize) -> Result<Complex<T>, KernelFault> {
    let out_of_bounds = |index: usize| KernelFault::OutOfBounds {
        role: op.role,
        index,
        len: data.len(),
    };
    match op.kind {
        ElementKind::Real => data
            .get(element)
            .map(|&re| Complex::new(re, T::zero()))
            .ok_or_else(|| out_of_bounds(element)),
        ElementKind::Complex => {
            let base = element * 2;
            match (data.get(base), data.get(base + 1)) {
                (Some(&re), Some(&im)) => Ok(Complex::new(re, im)),
                _ => Err(out_of_bounds(base + 1)),
            }
        }
    }
}

fn write<T: Sample>(
    data: &mut [T],
    op: &Operand,
    element: usize,
    value: Complex<T>,
) -> Result<(), KernelFault> {
    let len = data.len();
    let out_of_bounds = |index: usize| KernelFault::OutOfBounds {
        role: op.role,
        index,
        len,
    };
    match op.kind {
        ElementKind::Real => {
            let slot = data.get_mut(element).ok_or_else(|| out_of_bounds(element))?;
            *slot = value.re;
        }
        ElementKind::Complex => {
            let base = element * 2;
            if base + 1 >= len {
                return Err(out_of_bounds(base + 1));
            }
            data[base] = value.re;
            data[base + 1] = value.im;
        }
    }
    Ok(())
}

/// Gather `count` elements along axis 0 at every batch position, batch-major.
pub(crate) fn load<T: Sample>(
    io: &KernelIo<'_>,
    op: &Operand,
    count: usize,
    args: &KernelArgs,
) -> Result<Vec<Complex<T>>, KernelFault> {
    check_rank(op, args)?;
    let data = io.scalars::<T>(op.role)?;
    let mut out = Vec::with_capacity(count.saturating_mul(args.batch_count()));
    args.for_each_batch::<KernelFault>(|batch| {
        for i in 0..count {
            out.push(read(data, op, op.locate(i, batch))?);
        }
        Ok(())
    })?;
    Ok(out)
}

/// Scatter `values` (laid out as [`load`] returns them) scaled by `args.scale`.
pub(crate) fn store<T: Sample>(
    io: &mut KernelIo<'_>,
    op: &Operand,
    count: usize,
    args: &KernelArgs,
    values: &[Complex<T>],
) -> Result<(), KernelFault> {
    check_rank(op, args)?;
    if values.len() != count.saturating_mul(args.batch_count()) {
        return Err(invalid(format!(
            "{} values for {count} elements x {} batches",
            values.len(),
            args.batch_count()
        )));
    }
    let scale = T::narrow(args.scale);
    let data = io.scalars_mut::<T>(op.role)?;
    let mut values = values.iter();
    args.for_each_batch::<KernelFault>(|batch| {
        for i in 0..count {
            let value = values.next().copied().unwrap_or_else(Complex::zero);
            write(data, op, op.locate(i, batch), value * scale)?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use gfft_device::Precision;

    use super::{catalog_handle, register_catalog};
    use crate::registry::{KernelRegistryBuilder, RegistryConfig};
    use crate::scheme::{ComputeScheme, KernelKey};

    #[test]
    fn catalog_covers_every_auxiliary_scheme() {
        for precision in Precision::ALL {
            for scheme in ComputeScheme::AUXILIARY {
                let handle = catalog_handle(&KernelKey::auxiliary(scheme, precision))
                    .expect("auxiliary kernel");
                assert!(handle.name().starts_with(scheme.name()));
            }
        }
        let composite = KernelKey::auxiliary(ComputeScheme::Factored, Precision::Single);
        assert!(catalog_handle(&composite).is_none());
    }

    #[test]
    fn catalog_populates_both_precisions() {
        let config = RegistryConfig::default().with_max_direct_length(16);
        let mut builder = KernelRegistryBuilder::new();
        register_catalog(&mut builder, &config);
        let registry = builder.build();
        let per_precision = config.direct_lengths().len() + ComputeScheme::AUXILIARY.len();
        assert_eq!(registry.len(), 2 * per_precision);
        assert!(registry.contains(&KernelKey::direct(16, Precision::Double)));
        assert!(!registry.contains(&KernelKey::direct(17, Precision::Double)));
    }
}
