#![forbid(unsafe_code)]

//! Precision-tagged device buffers and the scalar trait kernels are written against.

use std::fmt;

use num_complex::Complex;
use num_traits::Float;
use serde::{Deserialize, Serialize};

/// Numeric precision of samples, twiddles and scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Precision {
    Single,
    Double,
}

impl Precision {
    pub const ALL: [Self; 2] = [Self::Single, Self::Double];

    #[must_use]
    pub const fn scalar_bytes(self) -> usize {
        match self {
            Self::Single => 4,
            Self::Double => 8,
        }
    }

    #[must_use]
    pub const fn complex_bytes(self) -> usize {
        2 * self.scalar_bytes()
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Double => "double",
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Logical buffer a kernel operand refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BufferRole {
    Input,
    Output,
    Scratch,
}

impl BufferRole {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Scratch => "scratch",
        }
    }
}

impl fmt::Display for BufferRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether an operand's elements are real scalars or interleaved complex pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    Real,
    Complex,
}

impl ElementKind {
    /// Scalars per element.
    #[must_use]
    pub const fn scalars(self) -> usize {
        match self {
            Self::Real => 1,
            Self::Complex => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Storage {
    Single(Vec<f32>),
    Double(Vec<f64>),
}

/// Device-resident storage of scalars. Complex data is interleaved `re, im`.
///
/// The host reference device keeps the scalars in host memory; other
/// runtimes are free to back the same API with real device allocations.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceBuffer {
    storage: Storage,
}

impl DeviceBuffer {
    #[must_use]
    pub fn zeroed(precision: Precision, scalars: usize) -> Self {
        let storage = match precision {
            Precision::Single => Storage::Single(vec![0.0; scalars]),
            Precision::Double => Storage::Double(vec![0.0; scalars]),
        };
        Self { storage }
    }

    /// Upload real scalars, rounding to the buffer precision.
    #[must_use]
    pub fn from_scalars(precision: Precision, values: &[f64]) -> Self {
        let storage = match precision {
            Precision::Single => Storage::Single(values.iter().map(|&v| v as f32).collect()),
            Precision::Double => Storage::Double(values.to_vec()),
        };
        Self { storage }
    }

    /// Upload complex values as interleaved scalars.
    #[must_use]
    pub fn from_complex(precision: Precision, values: &[Complex<f64>]) -> Self {
        let scalars = values
            .iter()
            .flat_map(|value| [value.re, value.im])
            .collect::<Vec<_>>();
        Self::from_scalars(precision, &scalars)
    }

    #[must_use]
    pub fn precision(&self) -> Precision {
        match self.storage {
            Storage::Single(_) => Precision::Single,
            Storage::Double(_) => Precision::Double,
        }
    }

    /// Length in scalars.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Single(values) => values.len(),
            Storage::Double(values) => values.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.len() * self.precision().scalar_bytes()
    }

    /// Download every scalar widened to f64.
    #[must_use]
    pub fn to_scalars(&self) -> Vec<f64> {
        match &self.storage {
            Storage::Single(values) => values.iter().map(|&v| f64::from(v)).collect(),
            Storage::Double(values) => values.clone(),
        }
    }

    /// Download interleaved pairs as complex values; a trailing odd scalar is dropped.
    #[must_use]
    pub fn to_complex(&self) -> Vec<Complex<f64>> {
        self.to_scalars()
            .chunks_exact(2)
            .map(|pair| Complex::new(pair[0], pair[1]))
            .collect()
    }

    /// True when every scalar is finite.
    #[must_use]
    pub fn all_finite(&self) -> bool {
        match &self.storage {
            Storage::Single(values) => values.iter().all(|v| v.is_finite()),
            Storage::Double(values) => values.iter().all(|v| v.is_finite()),
        }
    }
}

/// Scalar type a kernel instantiation operates on.
pub trait Sample: Float + Default + Send + Sync + fmt::Debug + 'static {
    const PRECISION: Precision;

    /// Round an f64 (twiddles, scale factors) to this precision.
    fn narrow(value: f64) -> Self;

    fn widen(self) -> f64;

    fn scalars(buffer: &DeviceBuffer) -> Option<&[Self]>;

    fn scalars_mut(buffer: &mut DeviceBuffer) -> Option<&mut [Self]>;

    /// `exp(i * angle)` evaluated in f64 and rounded once.
    fn unit(angle: f64) -> Complex<Self> {
        Complex::new(Self::narrow(angle.cos()), Self::narrow(angle.sin()))
    }
}

impl Sample for f32 {
    const PRECISION: Precision = Precision::Single;

    fn narrow(value: f64) -> Self {
        value as f32
    }

    fn widen(self) -> f64 {
        f64::from(self)
    }

    fn scalars(buffer: &DeviceBuffer) -> Option<&[Self]> {
        match &buffer.storage {
            Storage::Single(values) => Some(values.as_slice()),
            Storage::Double(_) => None,
        }
    }

    fn scalars_mut(buffer: &mut DeviceBuffer) -> Option<&mut [Self]> {
        match &mut buffer.storage {
            Storage::Single(values) => Some(values.as_mut_slice()),
            Storage::Double(_) => None,
        }
    }
}

impl Sample for f64 {
    const PRECISION: Precision = Precision::Double;

    fn narrow(value: f64) -> Self {
        value
    }

    fn widen(self) -> f64 {
        self
    }

    fn scalars(buffer: &DeviceBuffer) -> Option<&[Self]> {
        match &buffer.storage {
            Storage::Double(values) => Some(values.as_slice()),
            Storage::Single(_) => None,
        }
    }

    fn scalars_mut(buffer: &mut DeviceBuffer) -> Option<&mut [Self]> {
        match &mut buffer.storage {
            Storage::Double(values) => Some(values.as_mut_slice()),
            Storage::Single(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use num_complex::Complex;

    use super::{DeviceBuffer, Precision, Sample};

    #[test]
    fn precision_sizes_match_ieee_widths() {
        assert_eq!(Precision::Single.complex_bytes(), 8);
        assert_eq!(Precision::Double.complex_bytes(), 16);
    }

    #[test]
    fn single_buffer_rounds_on_upload() {
        let buffer = DeviceBuffer::from_scalars(Precision::Single, &[0.1, 2.0]);
        assert_eq!(buffer.precision(), Precision::Single);
        assert_eq!(buffer.byte_len(), 8);
        assert_eq!(buffer.to_scalars()[0], f64::from(0.1f32));
    }

    #[test]
    fn complex_upload_interleaves() {
        let buffer = DeviceBuffer::from_complex(
            Precision::Double,
            &[Complex::new(1.0, -1.0), Complex::new(2.0, 0.5)],
        );
        assert_eq!(buffer.to_scalars(), vec![1.0, -1.0, 2.0, 0.5]);
        assert_eq!(buffer.to_complex()[1], Complex::new(2.0, 0.5));
    }

    #[test]
    fn typed_views_reject_other_precision() {
        let mut buffer = DeviceBuffer::zeroed(Precision::Double, 4);
        assert!(f32::scalars(&buffer).is_none());
        assert!(f64::scalars_mut(&mut buffer).is_some());
    }

    #[test]
    fn finite_screen_flags_nan() {
        let buffer = DeviceBuffer::from_scalars(Precision::Double, &[1.0, f64::NAN]);
        assert!(!buffer.all_finite());
    }
}
