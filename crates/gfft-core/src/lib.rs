#![forbid(unsafe_code)]

//! gfft: transform-plan compiler and kernel-dispatch engine.
//!
//! A [`TransformSpec`] is compiled into a [`Plan`], a tree of nodes whose
//! leaves are bound to kernels resolved through the [`KernelRegistry`]. The
//! engine walks the leaves in their compiled order and issues one launch per
//! leaf on a caller-supplied [`gfft_device::Stream`].
//!
//! ## Module layout
//!
//! | Module       | Contents                                                    |
//! |--------------|-------------------------------------------------------------|
//! | `scheme`     | [`ComputeScheme`] tags, [`KernelKey`]                       |
//! | `transform`  | [`TransformSpec`], [`Layout`]                               |
//! | `registry`   | [`KernelRegistry`], integrity verification                  |
//! | `kernels`    | host reference kernel catalog                               |
//! | `selector`   | [`SchemeSelector`] decision policy                          |
//! | `plan`       | [`PlanNode`], [`Plan`], [`PlanFingerprint`]                 |
//! | `compiler`   | [`PlanCompiler`]                                            |
//! | `engine`     | plan traversal, [`ExecutionBuffers`], [`ExecutionReport`]   |
//! | `plan_cache` | [`PlanCacheConfig`], LRU plan cache                         |
//! | `api`        | [`Library`] lifecycle API and default-library free functions |
//! | `reference`  | naive DFT used to check compiled plans                      |

pub mod api;
pub mod compiler;
pub mod engine;
pub mod error;
pub mod kernels;
pub mod plan;
pub mod plan_cache;
pub mod reference;
pub mod registry;
pub mod scheme;
pub mod selector;
pub mod transform;

use serde::{Deserialize, Serialize};

pub use api::{
    ExecutionContext, Library, LibraryOptions, create_execution_context, create_plan,
    default_library, destroy_plan, execute, required_scratch_size,
};
pub use compiler::PlanCompiler;
pub use engine::{ExecutionBuffers, ExecutionReport};
pub use error::{ErrorClass, FftError};
pub use plan::{LeafStep, NodeBody, NodeSignature, Plan, PlanFingerprint, PlanNode};
pub use plan_cache::{CacheAdmissionPolicy, LruPlanCache, PlanCacheBackend, PlanCacheConfig};
pub use registry::{
    IntegrityReport, KernelHandle, KernelRegistry, KernelRegistryBuilder, RegistryConfig,
    ResolvedKernel,
};
pub use scheme::{ComputeScheme, KernelKey, KernelLength};
pub use selector::{AxisContext, SchemeSelector, Selection, SelectorConfig};
pub use transform::{Layout, TransformSpec};

pub use gfft_device::{Direction, Precision};
pub use gfft_runtime::RuntimeMode;

/// Transform kinds accepted by the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    ComplexForward,
    ComplexInverse,
    RealForward,
    RealInverse,
}

impl TransformKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ComplexForward => "complex_forward",
            Self::ComplexInverse => "complex_inverse",
            Self::RealForward => "real_forward",
            Self::RealInverse => "real_inverse",
        }
    }
}

/// Whether the result overwrites the input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    InPlace,
    #[default]
    NotInPlace,
}
