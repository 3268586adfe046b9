#![forbid(unsafe_code)]

use gfft_device::{BufferRole, DeviceError, Precision};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scheme::KernelKey;

/// The five failure classes callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    NotFound,
    Unsupported,
    IntegrityFailure,
    ResourceError,
    DeviceError,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FftError {
    #[error("no kernel registered for {key}")]
    NotFound { key: KernelKey },
    #[error("unsupported transform: {detail}")]
    Unsupported { detail: String },
    #[error("invalid transform description: {detail}")]
    InvalidShape { detail: String },
    #[error("registry integrity failure: {} key(s) resolve to a missing handle", .keys.len())]
    IntegrityFailure { keys: Vec<KernelKey> },
    #[error("scratch buffer holds {provided} bytes, plan requires {required}")]
    ScratchTooSmall { required: usize, provided: usize },
    #[error("{role} buffer holds {provided} scalars, plan requires {required}")]
    BufferTooSmall {
        role: BufferRole,
        required: usize,
        provided: usize,
    },
    #[error("{role} buffer holds {found} samples, plan expects {expected}")]
    PrecisionMismatch {
        role: BufferRole,
        expected: Precision,
        found: Precision,
    },
    #[error("plan needs a {role} buffer")]
    MissingBuffer { role: BufferRole },
    #[error("non-finite input rejected by policy")]
    NonFiniteInput,
    #[error("launch of `{node}` failed: {source}")]
    Device {
        node: String,
        #[source]
        source: DeviceError,
    },
}

impl FftError {
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound { .. } => ErrorClass::NotFound,
            Self::Unsupported { .. } | Self::InvalidShape { .. } => ErrorClass::Unsupported,
            Self::IntegrityFailure { .. } => ErrorClass::IntegrityFailure,
            Self::ScratchTooSmall { .. }
            | Self::BufferTooSmall { .. }
            | Self::PrecisionMismatch { .. }
            | Self::MissingBuffer { .. }
            | Self::NonFiniteInput => ErrorClass::ResourceError,
            Self::Device { .. } => ErrorClass::DeviceError,
        }
    }

    pub(crate) fn unsupported(detail: impl Into<String>) -> Self {
        Self::Unsupported {
            detail: detail.into(),
        }
    }

    pub(crate) fn invalid(detail: impl Into<String>) -> Self {
        Self::InvalidShape {
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use gfft_device::{DeviceError, Precision};

    use super::{ErrorClass, FftError};
    use crate::scheme::KernelKey;

    #[test]
    fn not_found_carries_the_requested_key() {
        let err = FftError::NotFound {
            key: KernelKey::direct(4099, Precision::Single),
        };
        assert_eq!(err.class(), ErrorClass::NotFound);
        let text = err.to_string();
        assert!(text.contains("4099"));
        assert!(text.contains("kernel_stockham"));
        assert!(text.contains("single"));
    }

    #[test]
    fn every_variant_maps_to_a_class() {
        assert_eq!(FftError::invalid("x").class(), ErrorClass::Unsupported);
        assert_eq!(
            FftError::IntegrityFailure { keys: vec![] }.class(),
            ErrorClass::IntegrityFailure
        );
        assert_eq!(
            FftError::ScratchTooSmall {
                required: 16,
                provided: 8
            }
            .class(),
            ErrorClass::ResourceError
        );
        assert_eq!(
            FftError::Device {
                node: "kernel_twiddle".into(),
                source: DeviceError::OutOfMemory { bytes: 1 },
            }
            .class(),
            ErrorClass::DeviceError
        );
    }
}
