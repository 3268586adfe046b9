#![forbid(unsafe_code)]

//! Device-runtime surface consumed by the gfft plan compiler and engine.
//!
//! ## Module layout
//!
//! | Module   | Contents                                                       |
//! |----------|----------------------------------------------------------------|
//! | `buffer` | [`Precision`], [`DeviceBuffer`], [`BufferRole`], [`Sample`]    |
//! | `kernel` | kernel calling contract: [`KernelFn`], [`KernelIo`], [`KernelArgs`] |
//! | `stream` | [`Stream`] / [`Device`] traits and the host reference runtime  |

pub mod buffer;
pub mod kernel;
pub mod stream;

pub use buffer::{BufferRole, DeviceBuffer, ElementKind, Precision, Sample};
pub use kernel::{Direction, KernelArgs, KernelFault, KernelFn, KernelIo, Operand};
pub use stream::{
    DEFAULT_LAUNCH_LOG_CAPACITY, Device, DeviceError, HostDevice, HostStream, Launch, LaunchRecord,
    Stream,
};
