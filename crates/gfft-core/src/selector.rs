#![forbid(unsafe_code)]

//! Scheme selection policy.
//!
//! Complex axis of length `N`:
//! 1. a fused kernel for `N` is registered: `Direct`;
//! 2. `N` factors over the registry radices: split `N = inner * outer`,
//!    preferring the most balanced pair with both factors fused (ties go to
//!    the larger inner), else the largest fused divisor as inner with the
//!    outer factor decomposed again; `TransposeLarge` from
//!    `transpose_threshold` on, `Factored` below it;
//! 3. otherwise `Bluestein` through the next power of two `>= 2N-1`, or
//!    `NotFound` for the fused key when Bluestein is disabled.
//!
//! Real axis: `RealPacked` for even `N` with a packable real side,
//! `RealEmbedded` otherwise.

use gfft_device::Precision;
use gfft_runtime::{TraceEvent, record_trace};
use serde::{Deserialize, Serialize};

use crate::error::FftError;
use crate::registry::KernelRegistry;
use crate::scheme::{ComputeScheme, KernelKey};

/// Tuning of the selection policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Smallest split length that uses the transpose-assisted scheme.
    pub transpose_threshold: usize,
    pub bluestein: bool,
    pub real_packing: bool,
    /// Deepest allowed nesting of composite nodes.
    pub max_depth: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            transpose_threshold: 1 << 16,
            bluestein: true,
            real_packing: true,
            max_depth: 16,
        }
    }
}

impl SelectorConfig {
    #[must_use]
    pub fn with_transpose_threshold(mut self, threshold: usize) -> Self {
        self.transpose_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_bluestein(mut self, enabled: bool) -> Self {
        self.bluestein = enabled;
        self
    }

    #[must_use]
    pub fn with_real_packing(mut self, enabled: bool) -> Self {
        self.real_packing = enabled;
        self
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// Where in a plan the axis being decided sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisContext {
    pub precision: Precision,
    /// Nesting depth of the node about to be built.
    pub depth: usize,
    /// Axis carries real samples on one side.
    pub real: bool,
    /// Real side is unit stride with even offset and even batch strides.
    pub packable: bool,
}

impl AxisContext {
    #[must_use]
    pub fn complex(precision: Precision, depth: usize) -> Self {
        Self {
            precision,
            depth,
            real: false,
            packable: false,
        }
    }

    #[must_use]
    pub fn real(precision: Precision, depth: usize, packable: bool) -> Self {
        Self {
            precision,
            depth,
            real: true,
            packable,
        }
    }
}

/// Chosen scheme plus the parameters buffer sizing is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum Selection {
    Direct { key: KernelKey },
    Factored { inner: usize, outer: usize },
    TransposeLarge { inner: usize, outer: usize },
    Bluestein { padded: usize },
    RealPacked { half: usize },
    RealEmbedded,
}

impl Selection {
    #[must_use]
    pub const fn scheme(&self) -> ComputeScheme {
        match self {
            Self::Direct { .. } => ComputeScheme::KernelStockham,
            Self::Factored { .. } => ComputeScheme::Factored,
            Self::TransposeLarge { .. } => ComputeScheme::TransposeLarge,
            Self::Bluestein { .. } => ComputeScheme::Bluestein,
            Self::RealPacked { .. } => ComputeScheme::RealPacked,
            Self::RealEmbedded => ComputeScheme::RealEmbedded,
        }
    }
}

/// Pure decision logic over a registry's coverage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemeSelector {
    config: SelectorConfig,
}

impl SchemeSelector {
    #[must_use]
    pub fn new(config: SelectorConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    pub fn select(
        &self,
        registry: &KernelRegistry,
        length: usize,
        ctx: &AxisContext,
    ) -> Result<Selection, FftError> {
        if ctx.depth > self.config.max_depth {
            return Err(FftError::unsupported(format!(
                "decomposition of length {length} exceeds depth {}",
                self.config.max_depth
            )));
        }
        if length == 0 {
            return Err(FftError::invalid("transform length must be non-zero"));
        }
        let (selection, reason) = if ctx.real {
            Self::select_real(&self.config, length, ctx.packable)
        } else {
            self.select_complex(registry, length, ctx.precision)?
        };
        record_trace(TraceEvent::SchemeSelected {
            length,
            precision: ctx.precision.name().to_string(),
            scheme: selection.scheme().name().to_string(),
            reason,
        });
        Ok(selection)
    }

    fn select_real(config: &SelectorConfig, length: usize, packable: bool) -> (Selection, String) {
        if config.real_packing && length.is_multiple_of(2) && packable {
            (
                Selection::RealPacked { half: length / 2 },
                format!("even length packed into a length-{} complex transform", length / 2),
            )
        } else {
            let why = if !config.real_packing {
                "real packing disabled"
            } else if !length.is_multiple_of(2) {
                "odd length"
            } else {
                "real side not unit-stride with even offsets"
            };
            (Selection::RealEmbedded, format!("{why}; embedded in a full complex transform"))
        }
    }

    fn select_complex(
        &self,
        registry: &KernelRegistry,
        length: usize,
        precision: Precision,
    ) -> Result<(Selection, String), FftError> {
        let key = KernelKey::direct(length, precision);
        if registry.contains(&key) {
            return Ok((Selection::Direct { key }, "fused kernel registered".to_string()));
        }
        if registry.is_smooth(length)
            && let Some((inner, outer, balanced)) = Self::split(registry, length, precision)
        {
            let large = length >= self.config.transpose_threshold;
            let selection = if large {
                Selection::TransposeLarge { inner, outer }
            } else {
                Selection::Factored { inner, outer }
            };
            let how = if balanced {
                "balanced split with both factors fused"
            } else {
                "largest fused divisor, outer factor decomposed again"
            };
            return Ok((selection, format!("{inner} x {outer}: {how}")));
        }
        if !self.config.bluestein {
            return Err(FftError::NotFound { key });
        }
        let padded = length
            .checked_mul(2)
            .and_then(|twice| (twice - 1).checked_next_power_of_two())
            .ok_or_else(|| {
                FftError::unsupported(format!(
                    "convolution length for {length} exceeds the addressable size"
                ))
            })?;
        Ok((
            Selection::Bluestein { padded },
            format!("no fused factorization; convolution padded to {padded}"),
        ))
    }

    /// `(inner, outer, both_fused)` for a smooth length without a fused kernel.
    fn split(
        registry: &KernelRegistry,
        length: usize,
        precision: Precision,
    ) -> Option<(usize, usize, bool)> {
        let fused = |n: usize| registry.contains(&KernelKey::direct(n, precision));
        let mut divisors = Vec::new();
        let mut d = 2;
        while d * d <= length {
            if length.is_multiple_of(d) {
                divisors.push(d);
                divisors.push(length / d);
            }
            d += 1;
        }
        divisors.retain(|&d| d > 1 && d < length);

        let balanced = divisors
            .iter()
            .copied()
            .filter(|&d| fused(d) && fused(length / d))
            .max_by_key(|&d| (d.min(length / d), d));
        if let Some(inner) = balanced {
            return Some((inner, length / inner, true));
        }
        divisors
            .into_iter()
            .filter(|&d| fused(d))
            .max()
            .map(|inner| (inner, length / inner, false))
    }
}
