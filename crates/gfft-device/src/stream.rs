#![forbid(unsafe_code)]

//! Streams, devices and the host reference runtime.
//!
//! A [`Stream`] accepts kernel launches in submission order. Launches on one
//! stream observe the effects of every launch submitted before them; nothing
//! is promised across streams.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::buffer::{DeviceBuffer, Precision};
use crate::kernel::{KernelArgs, KernelFault, KernelFn, KernelIo};

/// Failures reported by the device runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("launch of `{kernel}` rejected: {reason}")]
    LaunchRejected { kernel: String, reason: String },
    #[error("kernel `{kernel}` faulted: {source}")]
    KernelFault {
        kernel: String,
        #[source]
        source: KernelFault,
    },
    #[error("out of device memory allocating {bytes} bytes")]
    OutOfMemory { bytes: usize },
}

/// One kernel launch request.
#[derive(Clone, Copy)]
pub struct Launch<'k> {
    pub name: &'k str,
    pub entry: KernelFn,
    pub args: &'k KernelArgs,
}

impl fmt::Debug for Launch<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Launch")
            .field("name", &self.name)
            .field("args", self.args)
            .finish_non_exhaustive()
    }
}

/// Ordered submission queue.
pub trait Stream: Send + Sync + fmt::Debug {
    fn id(&self) -> u64;

    /// Enqueue one launch behind every launch already submitted.
    fn launch(&self, launch: Launch<'_>, io: &mut KernelIo<'_>) -> Result<(), DeviceError>;

    /// Block until every submitted launch has completed.
    fn synchronize(&self) -> Result<(), DeviceError>;
}

/// Device runtime: stream creation and memory allocation.
pub trait Device: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn create_stream(&self) -> Arc<dyn Stream>;

    fn allocate(&self, precision: Precision, scalars: usize) -> Result<DeviceBuffer, DeviceError>;
}

/// What a host stream remembers about each accepted launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchRecord {
    pub kernel: String,
    pub length: usize,
    pub batch: usize,
}

/// Launch records a host stream keeps by default.
pub const DEFAULT_LAUNCH_LOG_CAPACITY: usize = 256;

/// Stream that runs every launch synchronously on the calling thread.
///
/// Completion at submission trivially satisfies stream order. An optional
/// launch limit makes the stream reject every launch after the first
/// `limit`, which is how tests provoke runtime rejections mid-plan. Only the
/// most recent launches are logged.
#[derive(Debug)]
pub struct HostStream {
    id: u64,
    launch_limit: Option<usize>,
    issued: AtomicUsize,
    log_capacity: usize,
    log: Mutex<VecDeque<LaunchRecord>>,
}

impl HostStream {
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self {
            id,
            launch_limit: None,
            issued: AtomicUsize::new(0),
            log_capacity: DEFAULT_LAUNCH_LOG_CAPACITY,
            log: Mutex::new(VecDeque::new()),
        }
    }

    /// Reject every launch after the first `limit`.
    #[must_use]
    pub fn with_launch_limit(mut self, limit: usize) -> Self {
        self.launch_limit = Some(limit);
        self
    }

    /// Keep at most `capacity` launch records (at least one).
    #[must_use]
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity.max(1);
        self
    }

    /// Retained launch records, oldest first.
    #[must_use]
    pub fn launches(&self) -> Vec<LaunchRecord> {
        self.log
            .lock()
            .map_or_else(|_| Vec::new(), |log| log.iter().cloned().collect())
    }

    /// Remove and return the retained launch records, oldest first.
    pub fn take_launches(&self) -> Vec<LaunchRecord> {
        self.log
            .lock()
            .map_or_else(|_| Vec::new(), |mut log| log.drain(..).collect())
    }

    /// Launches accepted so far, including those no longer logged.
    #[must_use]
    pub fn launch_count(&self) -> usize {
        self.issued.load(Ordering::Acquire)
    }

    fn admit(&self) -> bool {
        self.issued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |issued| {
                match self.launch_limit {
                    Some(limit) if issued >= limit => None,
                    _ => Some(issued + 1),
                }
            })
            .is_ok()
    }

    fn remember(&self, launch: &Launch<'_>) {
        if let Ok(mut log) = self.log.lock() {
            if log.len() >= self.log_capacity {
                let _ = log.pop_front();
            }
            log.push_back(LaunchRecord {
                kernel: launch.name.to_string(),
                length: launch.args.length,
                batch: launch.args.batch_count(),
            });
        }
    }
}

impl Stream for HostStream {
    fn id(&self) -> u64 {
        self.id
    }

    fn launch(&self, launch: Launch<'_>, io: &mut KernelIo<'_>) -> Result<(), DeviceError> {
        if !self.admit() {
            return Err(DeviceError::LaunchRejected {
                kernel: launch.name.to_string(),
                reason: format!(
                    "stream {} accepts at most {} launches",
                    self.id,
                    self.launch_limit.unwrap_or(usize::MAX)
                ),
            });
        }
        self.remember(&launch);
        (launch.entry)(io, launch.args).map_err(|source| DeviceError::KernelFault {
            kernel: launch.name.to_string(),
            source,
        })
    }

    fn synchronize(&self) -> Result<(), DeviceError> {
        Ok(())
    }
}

/// Host reference device. Buffers live in host memory.
#[derive(Debug)]
pub struct HostDevice {
    memory_limit: Option<usize>,
    launch_limit: Option<usize>,
    next_stream: AtomicU64,
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HostDevice {
    #[must_use]
    pub fn new() -> Self {
        Self {
            memory_limit: None,
            launch_limit: None,
            next_stream: AtomicU64::new(1),
        }
    }

    /// Refuse single allocations larger than `bytes`.
    #[must_use]
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    /// Streams created by this device reject launches after the first `limit`.
    #[must_use]
    pub fn with_launch_limit(mut self, limit: usize) -> Self {
        self.launch_limit = Some(limit);
        self
    }

    /// Create a concrete host stream (for callers that want its launch log).
    #[must_use]
    pub fn host_stream(&self) -> HostStream {
        let id = self.next_stream.fetch_add(1, Ordering::Relaxed);
        let stream = HostStream::new(id);
        match self.launch_limit {
            Some(limit) => stream.with_launch_limit(limit),
            None => stream,
        }
    }
}

impl Device for HostDevice {
    fn name(&self) -> &str {
        "host-reference"
    }

    fn create_stream(&self) -> Arc<dyn Stream> {
        Arc::new(self.host_stream())
    }

    fn allocate(&self, precision: Precision, scalars: usize) -> Result<DeviceBuffer, DeviceError> {
        let bytes = scalars.saturating_mul(precision.scalar_bytes());
        if let Some(limit) = self.memory_limit
            && bytes > limit
        {
            return Err(DeviceError::OutOfMemory { bytes });
        }
        Ok(DeviceBuffer::zeroed(precision, scalars))
    }
}
