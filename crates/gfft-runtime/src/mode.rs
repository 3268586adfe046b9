#![forbid(unsafe_code)]

//! Runtime mode definitions for Strict and Hardened operation.

use serde::{Deserialize, Serialize};

/// Operational mode governing how eagerly the library fails closed.
///
/// - **Strict**: kernel-table integrity is verified when a library context is
///   set up and any violation aborts setup. Execution validates buffer
///   precision and sizes but trusts sample values.
/// - **Hardened**: everything Strict does, plus every execution rejects
///   non-finite input samples before the first launch is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RuntimeMode {
    #[default]
    Strict,
    Hardened,
}

impl RuntimeMode {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Hardened => "Hardened",
        }
    }

    /// Whether input samples are screened for NaN/Inf before launch.
    #[must_use]
    pub const fn checks_finite_input(self) -> bool {
        matches!(self, Self::Hardened)
    }
}
