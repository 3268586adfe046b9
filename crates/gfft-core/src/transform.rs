#![forbid(unsafe_code)]

//! User-level transform description and its resolved data layouts.
//!
//! Axis 0 is the fastest-varying axis. Strides, distances and offsets count
//! elements of the buffer's element kind: real scalars on the real side of a
//! real transform, complex values everywhere else.

use gfft_device::{Direction, ElementKind, Precision};
use serde::{Deserialize, Serialize};

use crate::error::FftError;
use crate::{Placement, TransformKind};

/// Largest supported dimension count.
pub const MAX_DIMENSIONS: usize = 3;

/// Strided placement of a batch of multi-dimensional arrays in one buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Layout {
    /// One stride per axis.
    pub strides: Vec<usize>,
    /// Distance between consecutive batch entries.
    pub distance: usize,
    #[serde(default)]
    pub offset: usize,
}

impl Layout {
    #[must_use]
    pub fn new(strides: Vec<usize>, distance: usize) -> Self {
        Self {
            strides,
            distance,
            offset: 0,
        }
    }

    #[must_use]
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Densely packed layout for arrays of `counts` elements per axis.
    #[must_use]
    pub fn contiguous(counts: &[usize]) -> Self {
        let mut strides = Vec::with_capacity(counts.len());
        let mut running = 1usize;
        for &count in counts {
            strides.push(running);
            running = running.saturating_mul(count);
        }
        Self::new(strides, running)
    }

    /// One past the last element touched by `batch` arrays of `counts`.
    fn extent(&self, counts: &[usize], batch: usize) -> Option<usize> {
        let mut last = self.offset;
        for (&count, &stride) in counts.iter().zip(&self.strides) {
            last = last.checked_add(count.checked_sub(1)?.checked_mul(stride)?)?;
        }
        last = last.checked_add(batch.checked_sub(1)?.checked_mul(self.distance)?)?;
        last.checked_add(1)
    }
}

/// Immutable description of one transform request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransformSpec {
    pub kind: TransformKind,
    pub precision: Precision,
    pub placement: Placement,
    /// Logical (real-side, for real transforms) length per axis.
    pub lengths: Vec<usize>,
    pub batch: usize,
    /// Caller layout of the input; `None` selects the packed default.
    pub input_layout: Option<Layout>,
    /// Caller layout of the output; `None` selects the packed default.
    pub output_layout: Option<Layout>,
}

impl TransformSpec {
    #[must_use]
    pub fn new(kind: TransformKind, precision: Precision, lengths: Vec<usize>) -> Self {
        Self {
            kind,
            precision,
            placement: Placement::NotInPlace,
            lengths,
            batch: 1,
            input_layout: None,
            output_layout: None,
        }
    }

    #[must_use]
    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    #[must_use]
    pub fn with_batch(mut self, batch: usize) -> Self {
        self.batch = batch;
        self
    }

    #[must_use]
    pub fn with_input_layout(mut self, layout: Layout) -> Self {
        self.input_layout = Some(layout);
        self
    }

    #[must_use]
    pub fn with_output_layout(mut self, layout: Layout) -> Self {
        self.output_layout = Some(layout);
        self
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.lengths.len()
    }

    /// Product of the logical lengths; the `N` of the `1/N` normalization.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.lengths.iter().product()
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        match self.kind {
            TransformKind::ComplexForward | TransformKind::RealForward => Direction::Forward,
            TransformKind::ComplexInverse | TransformKind::RealInverse => Direction::Inverse,
        }
    }

    #[must_use]
    pub fn is_real(&self) -> bool {
        matches!(
            self.kind,
            TransformKind::RealForward | TransformKind::RealInverse
        )
    }

    #[must_use]
    pub fn is_in_place(&self) -> bool {
        self.placement == Placement::InPlace
    }

    #[must_use]
    pub fn input_kind(&self) -> ElementKind {
        match self.kind {
            TransformKind::RealForward => ElementKind::Real,
            _ => ElementKind::Complex,
        }
    }

    #[must_use]
    pub fn output_kind(&self) -> ElementKind {
        match self.kind {
            TransformKind::RealInverse => ElementKind::Real,
            _ => ElementKind::Complex,
        }
    }

    /// Element counts per axis of the half-complex side: `lengths[0]/2+1`
    /// along axis 0.
    #[must_use]
    pub fn half_counts(&self) -> Vec<usize> {
        let mut counts = self.lengths.clone();
        if let Some(first) = counts.first_mut() {
            *first = *first / 2 + 1;
        }
        counts
    }

    /// Element counts per axis on the input side.
    #[must_use]
    pub fn input_counts(&self) -> Vec<usize> {
        match self.kind {
            TransformKind::RealInverse => self.half_counts(),
            _ => self.lengths.clone(),
        }
    }

    /// Element counts per axis on the output side.
    #[must_use]
    pub fn output_counts(&self) -> Vec<usize> {
        match self.kind {
            TransformKind::RealForward => self.half_counts(),
            _ => self.lengths.clone(),
        }
    }

    #[must_use]
    pub fn resolved_input_layout(&self) -> Layout {
        self.input_layout
            .clone()
            .unwrap_or_else(|| self.default_layout(self.input_kind(), &self.input_counts()))
    }

    #[must_use]
    pub fn resolved_output_layout(&self) -> Layout {
        self.output_layout
            .clone()
            .unwrap_or_else(|| self.default_layout(self.output_kind(), &self.output_counts()))
    }

    /// Packed layout; the real side of an in-place real transform pads axis 0
    /// to `2*(lengths[0]/2+1)` scalars so the complex side fits in place.
    fn default_layout(&self, kind: ElementKind, counts: &[usize]) -> Layout {
        if kind == ElementKind::Real && self.is_in_place() {
            let mut padded = counts.to_vec();
            if let Some(first) = padded.first_mut() {
                *first = 2 * (*first / 2 + 1);
            }
            return Layout::contiguous(&padded);
        }
        Layout::contiguous(counts)
    }

    /// Scalars the input buffer must hold.
    #[must_use]
    pub fn input_scalars(&self) -> usize {
        self.resolved_input_layout()
            .extent(&self.input_counts(), self.batch)
            .unwrap_or(usize::MAX)
            .saturating_mul(self.input_kind().scalars())
    }

    /// Scalars the output buffer must hold (the input buffer, in place).
    #[must_use]
    pub fn output_scalars(&self) -> usize {
        self.resolved_output_layout()
            .extent(&self.output_counts(), self.batch)
            .unwrap_or(usize::MAX)
            .saturating_mul(self.output_kind().scalars())
    }

    /// Reject descriptions no plan can be built for.
    pub fn validate(&self) -> Result<(), FftError> {
        let dims = self.dimension();
        if dims == 0 || dims > MAX_DIMENSIONS {
            return Err(FftError::invalid(format!(
                "dimension must be 1..={MAX_DIMENSIONS}, got {dims}"
            )));
        }
        if self.lengths.contains(&0) {
            return Err(FftError::invalid("lengths must be non-zero"));
        }
        if self.batch == 0 {
            return Err(FftError::invalid("batch must be at least 1"));
        }
        self.lengths
            .iter()
            .try_fold(self.batch, |acc, &len| acc.checked_mul(len))
            .ok_or_else(|| FftError::invalid("total element count overflows"))?;

        for (layout, counts, side) in [
            (&self.input_layout, self.input_counts(), "input"),
            (&self.output_layout, self.output_counts(), "output"),
        ] {
            let Some(layout) = layout else { continue };
            if layout.strides.len() != dims {
                return Err(FftError::invalid(format!(
                    "{side} layout has {} strides for {dims} axes",
                    layout.strides.len()
                )));
            }
            if layout.strides.contains(&0) || layout.distance == 0 {
                return Err(FftError::invalid(format!(
                    "{side} strides and distance must be non-zero"
                )));
            }
            if layout.extent(&counts, self.batch).is_none() {
                return Err(FftError::invalid(format!("{side} extent overflows")));
            }
        }

        if self.is_in_place() {
            if self.is_real() {
                if self.input_layout.is_some() || self.output_layout.is_some() {
                    return Err(FftError::unsupported(
                        "in-place real transforms require the padded default layout",
                    ));
                }
            } else if self.resolved_input_layout() != self.resolved_output_layout() {
                return Err(FftError::unsupported(
                    "in-place complex transforms require identical input and output layouts",
                ));
            }
        }
        Ok(())
    }
}
