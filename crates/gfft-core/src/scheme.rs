#![forbid(unsafe_code)]

//! Decomposition scheme tags and the structural registry key.

use std::fmt;

use gfft_device::Precision;
use serde::{Deserialize, Serialize};

/// Decomposition strategy of a plan node.
///
/// `Kernel*` tags name leaf kernels; the rest are composites that only
/// sequence children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeScheme {
    /// Fused single-kernel transform of one exact length.
    KernelStockham,
    KernelTranspose,
    KernelTwiddle,
    KernelChirp,
    KernelPadMul,
    KernelPointwiseMul,
    KernelResMul,
    KernelRealPost,
    KernelRealPre,
    KernelRealToComplex,
    KernelComplexToHermitian,
    KernelHermitianToComplex,
    KernelComplexToReal,
    /// Cooley-Tukey split: inner DFT, twiddle, outer DFT.
    Factored,
    /// Transpose-assisted split for large lengths.
    TransposeLarge,
    /// Chirp-z convolution through a padded power-of-two length.
    Bluestein,
    /// Real transform computed as a half-length complex transform.
    RealPacked,
    /// Real transform embedded in a full-length complex transform.
    RealEmbedded,
    /// One sub-plan per axis of a 2-D/3-D transform.
    MultiAxis,
}

impl ComputeScheme {
    /// Length-generic helper kernels, registered under [`KernelLength::Any`].
    pub const AUXILIARY: [Self; 12] = [
        Self::KernelTranspose,
        Self::KernelTwiddle,
        Self::KernelChirp,
        Self::KernelPadMul,
        Self::KernelPointwiseMul,
        Self::KernelResMul,
        Self::KernelRealPost,
        Self::KernelRealPre,
        Self::KernelRealToComplex,
        Self::KernelComplexToHermitian,
        Self::KernelHermitianToComplex,
        Self::KernelComplexToReal,
    ];

    #[must_use]
    pub const fn is_leaf(self) -> bool {
        !matches!(
            self,
            Self::Factored
                | Self::TransposeLarge
                | Self::Bluestein
                | Self::RealPacked
                | Self::RealEmbedded
                | Self::MultiAxis
        )
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::KernelStockham => "kernel_stockham",
            Self::KernelTranspose => "kernel_transpose",
            Self::KernelTwiddle => "kernel_twiddle",
            Self::KernelChirp => "kernel_chirp",
            Self::KernelPadMul => "kernel_pad_mul",
            Self::KernelPointwiseMul => "kernel_pointwise_mul",
            Self::KernelResMul => "kernel_res_mul",
            Self::KernelRealPost => "kernel_real_post",
            Self::KernelRealPre => "kernel_real_pre",
            Self::KernelRealToComplex => "kernel_real_to_complex",
            Self::KernelComplexToHermitian => "kernel_complex_to_hermitian",
            Self::KernelHermitianToComplex => "kernel_hermitian_to_complex",
            Self::KernelComplexToReal => "kernel_complex_to_real",
            Self::Factored => "factored",
            Self::TransposeLarge => "transpose_large",
            Self::Bluestein => "bluestein",
            Self::RealPacked => "real_packed",
            Self::RealEmbedded => "real_embedded",
            Self::MultiAxis => "multi_axis",
        }
    }
}

impl fmt::Display for ComputeScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Length component of a [`KernelKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelLength {
    Exact(usize),
    /// Kernel code is independent of the transform length.
    Any,
}

impl fmt::Display for KernelLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(n) => write!(f, "{n}"),
            Self::Any => f.write_str("any"),
        }
    }
}

/// Exact-match registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KernelKey {
    pub length: KernelLength,
    pub scheme: ComputeScheme,
    pub precision: Precision,
}

impl KernelKey {
    #[must_use]
    pub const fn new(length: KernelLength, scheme: ComputeScheme, precision: Precision) -> Self {
        Self {
            length,
            scheme,
            precision,
        }
    }

    /// Key of the fused single-kernel transform of length `n`.
    #[must_use]
    pub const fn direct(n: usize, precision: Precision) -> Self {
        Self::new(KernelLength::Exact(n), ComputeScheme::KernelStockham, precision)
    }

    /// Key of a length-generic helper kernel.
    #[must_use]
    pub const fn auxiliary(scheme: ComputeScheme, precision: Precision) -> Self {
        Self::new(KernelLength::Any, scheme, precision)
    }
}

impl fmt::Display for KernelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(length={}, scheme={}, precision={})",
            self.length, self.scheme, self.precision
        )
    }
}
