#![forbid(unsafe_code)]

//! Calling contract shared by every precompiled kernel.
//!
//! A kernel is a plain function pointer taking the buffer set of one launch
//! ([`KernelIo`]) and its length/batch parameters ([`KernelArgs`]). Operands
//! address buffers by [`BufferRole`] plus an element offset and one stride
//! per axis of the launch's iteration shape.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::buffer::{BufferRole, DeviceBuffer, ElementKind, Precision, Sample};

/// Transform direction; the exponent sign of the DFT kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Inverse,
}

impl Direction {
    #[must_use]
    pub const fn sign(self) -> f64 {
        match self {
            Self::Forward => -1.0,
            Self::Inverse => 1.0,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Inverse => "inverse",
        }
    }
}

/// Strided view of one buffer as seen by a kernel.
///
/// `strides[axis]` is measured in elements of `kind`; `offset` likewise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Operand {
    pub role: BufferRole,
    pub kind: ElementKind,
    pub offset: usize,
    pub strides: Vec<usize>,
}

impl Operand {
    #[must_use]
    pub fn new(role: BufferRole, kind: ElementKind, offset: usize, strides: Vec<usize>) -> Self {
        Self {
            role,
            kind,
            offset,
            strides,
        }
    }

    /// Element index of `first` along axis 0 at batch position `rest`.
    #[must_use]
    pub fn locate(&self, first: usize, rest: &[usize]) -> usize {
        let base = self.offset + first * self.strides.first().copied().unwrap_or(0);
        rest.iter()
            .zip(self.strides.iter().skip(1))
            .fold(base, |acc, (&idx, &stride)| acc + idx * stride)
    }

    /// One past the largest element index reachable over `shape`; 0 for an empty shape.
    #[must_use]
    pub fn extent(&self, shape: &[usize]) -> usize {
        if shape.contains(&0) {
            return 0;
        }
        let last = shape
            .iter()
            .zip(&self.strides)
            .fold(self.offset, |acc, (&count, &stride)| acc + (count - 1) * stride);
        last + 1
    }

    /// [`Self::extent`] in scalars.
    #[must_use]
    pub fn scalar_extent(&self, shape: &[usize]) -> usize {
        self.extent(shape) * self.kind.scalars()
    }
}

/// Length and batch parameters of one launch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelArgs {
    /// Transform length the kernel realizes (its registry length for direct kernels).
    pub length: usize,
    /// Iteration shape: axis 0 is the kernel's vector axis, the rest are batch axes.
    pub shape: Vec<usize>,
    pub src: Option<Operand>,
    pub dst: Operand,
    pub direction: Direction,
    /// Multiplier applied to every written element.
    pub scale: f64,
}

impl KernelArgs {
    /// Number of independent vectors (product of batch axes).
    #[must_use]
    pub fn batch_count(&self) -> usize {
        self.shape.iter().skip(1).product()
    }

    /// Visit every batch position in row order (axis 1 fastest).
    pub fn for_each_batch<E>(
        &self,
        mut visit: impl FnMut(&[usize]) -> Result<(), E>,
    ) -> Result<(), E> {
        let tail = self.shape.get(1..).unwrap_or(&[]);
        if tail.contains(&0) {
            return Ok(());
        }
        let mut index = vec![0usize; tail.len()];
        loop {
            visit(&index)?;
            let mut axis = 0;
            loop {
                if axis == tail.len() {
                    return Ok(());
                }
                index[axis] += 1;
                if index[axis] < tail[axis] {
                    break;
                }
                index[axis] = 0;
                axis += 1;
            }
        }
    }
}

/// Faults a kernel reports instead of touching memory it does not own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelFault {
    #[error("{role} buffer holds {found} samples, kernel expects {expected}")]
    PrecisionMismatch {
        role: BufferRole,
        expected: Precision,
        found: Precision,
    },
    #[error("{role} access at scalar {index} exceeds buffer of {len} scalars")]
    OutOfBounds {
        role: BufferRole,
        index: usize,
        len: usize,
    },
    #[error("no {role} buffer bound for this launch")]
    MissingBuffer { role: BufferRole },
    #[error("invalid kernel arguments: {detail}")]
    InvalidArguments { detail: String },
}

/// Buffers bound to one launch. In-place launches bind no separate output:
/// [`BufferRole::Output`] then resolves to the input buffer.
pub struct KernelIo<'a> {
    input: &'a mut DeviceBuffer,
    output: Option<&'a mut DeviceBuffer>,
    scratch: Option<&'a mut DeviceBuffer>,
}

impl fmt::Debug for KernelIo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelIo")
            .field("input_len", &self.input.len())
            .field("output_len", &self.output.as_ref().map(|b| b.len()))
            .field("scratch_len", &self.scratch.as_ref().map(|b| b.len()))
            .finish()
    }
}

impl<'a> KernelIo<'a> {
    #[must_use]
    pub fn new(
        input: &'a mut DeviceBuffer,
        output: Option<&'a mut DeviceBuffer>,
        scratch: Option<&'a mut DeviceBuffer>,
    ) -> Self {
        Self {
            input,
            output,
            scratch,
        }
    }

    pub fn buffer(&self, role: BufferRole) -> Result<&DeviceBuffer, KernelFault> {
        match role {
            BufferRole::Input => Ok(&*self.input),
            BufferRole::Output => Ok(self.output.as_deref().unwrap_or(&*self.input)),
            BufferRole::Scratch => self
                .scratch
                .as_deref()
                .ok_or(KernelFault::MissingBuffer { role }),
        }
    }

    pub fn buffer_mut(&mut self, role: BufferRole) -> Result<&mut DeviceBuffer, KernelFault> {
        match role {
            BufferRole::Input => Ok(&mut *self.input),
            BufferRole::Output => match self.output.as_deref_mut() {
                Some(output) => Ok(output),
                None => Ok(&mut *self.input),
            },
            BufferRole::Scratch => self
                .scratch
                .as_deref_mut()
                .ok_or(KernelFault::MissingBuffer { role }),
        }
    }

    /// Typed scalar view of the buffer behind `role`.
    pub fn scalars<T: Sample>(&self, role: BufferRole) -> Result<&[T], KernelFault> {
        let buffer = self.buffer(role)?;
        T::scalars(buffer).ok_or(KernelFault::PrecisionMismatch {
            role,
            expected: T::PRECISION,
            found: buffer.precision(),
        })
    }

    /// Mutable typed scalar view of the buffer behind `role`.
    pub fn scalars_mut<T: Sample>(&mut self, role: BufferRole) -> Result<&mut [T], KernelFault> {
        let buffer = self.buffer_mut(role)?;
        let found = buffer.precision();
        T::scalars_mut(buffer).ok_or(KernelFault::PrecisionMismatch {
            role,
            expected: T::PRECISION,
            found,
        })
    }
}

/// Entry point of a precompiled kernel.
pub type KernelFn = fn(&mut KernelIo<'_>, &KernelArgs) -> Result<(), KernelFault>;
