#![forbid(unsafe_code)]

//! Plan lifecycle API.
//!
//! A [`Library`] is the application-level context: it owns (a shared handle
//! to) a verified kernel registry, the device, the compiler and a plan cache.
//! The free functions at the bottom delegate to a lazily set up default
//! library on the process-wide registry and the host device.

use std::sync::{Arc, Mutex, OnceLock};

use gfft_device::{Device, DeviceBuffer, DeviceError, HostDevice, Stream};
use gfft_runtime::{RuntimeMode, record_trace};
use serde::{Deserialize, Serialize};

use crate::compiler::{PlanCompiler, compiled_event};
use crate::engine::{self, ExecutionBuffers, ExecutionReport};
use crate::error::FftError;
use crate::plan::Plan;
use crate::plan_cache::{LruPlanCache, PlanCacheBackend, PlanCacheConfig};
use crate::registry::{KernelRegistry, RegistryConfig};
use crate::selector::SelectorConfig;
use crate::transform::TransformSpec;

/// Everything a [`Library`] is configured with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryOptions {
    pub mode: RuntimeMode,
    pub registry: RegistryConfig,
    pub selector: SelectorConfig,
    pub cache: PlanCacheConfig,
}

impl LibraryOptions {
    #[must_use]
    pub fn with_mode(mut self, mode: RuntimeMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn with_selector(mut self, selector: SelectorConfig) -> Self {
        self.selector = selector;
        self
    }

    #[must_use]
    pub fn with_cache(mut self, cache: PlanCacheConfig) -> Self {
        self.cache = cache;
        self
    }
}

fn device_error(node: &str, source: DeviceError) -> FftError {
    FftError::Device {
        node: node.to_string(),
        source,
    }
}

/// Stream plus the caller-managed work buffer used for plan scratch.
#[derive(Debug)]
pub struct ExecutionContext {
    stream: Arc<dyn Stream>,
    work_buffer: Option<DeviceBuffer>,
}

impl ExecutionContext {
    #[must_use]
    pub fn new(stream: Arc<dyn Stream>) -> Self {
        Self {
            stream,
            work_buffer: None,
        }
    }

    #[must_use]
    pub fn stream(&self) -> &Arc<dyn Stream> {
        &self.stream
    }

    /// Install the scratch buffer; returns the one it replaces.
    pub fn set_work_buffer(&mut self, buffer: DeviceBuffer) -> Option<DeviceBuffer> {
        self.work_buffer.replace(buffer)
    }

    pub fn take_work_buffer(&mut self) -> Option<DeviceBuffer> {
        self.work_buffer.take()
    }

    #[must_use]
    pub fn work_buffer(&self) -> Option<&DeviceBuffer> {
        self.work_buffer.as_ref()
    }

    /// Wait for every launch submitted on this context's stream.
    pub fn synchronize(&self) -> Result<(), FftError> {
        self.stream
            .synchronize()
            .map_err(|source| device_error("synchronize", source))
    }
}

/// Application-level library context.
pub struct Library {
    options: LibraryOptions,
    compiler: PlanCompiler,
    device: Arc<dyn Device>,
    cache: Mutex<Box<dyn PlanCacheBackend>>,
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("options", &self.options)
            .field("device", &self.device.name())
            .field("cached_plans", &self.cached_plans())
            .finish_non_exhaustive()
    }
}

impl Library {
    /// Set up on the host device. The default registry configuration shares
    /// the process-wide registry; any other builds a private one.
    pub fn setup(options: LibraryOptions) -> Result<Self, FftError> {
        let registry = if options.registry == RegistryConfig::default() {
            KernelRegistry::global()
        } else {
            Arc::new(KernelRegistry::with_config(&options.registry))
        };
        Self::with_registry(registry, Arc::new(HostDevice::new()), options)
    }

    /// Set up on an injected registry and device. The registry is verified
    /// first; any entry without a handle fails setup.
    pub fn with_registry(
        registry: Arc<KernelRegistry>,
        device: Arc<dyn Device>,
        options: LibraryOptions,
    ) -> Result<Self, FftError> {
        registry.verify_integrity().into_result()?;
        let cache: Box<dyn PlanCacheBackend> = Box::new(LruPlanCache::new(options.cache.clone()));
        Ok(Self {
            compiler: PlanCompiler::new(registry, options.selector.clone()),
            options,
            device,
            cache: Mutex::new(cache),
        })
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<KernelRegistry> {
        self.compiler.registry()
    }

    #[must_use]
    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    #[must_use]
    pub fn options(&self) -> &LibraryOptions {
        &self.options
    }

    #[must_use]
    pub fn mode(&self) -> RuntimeMode {
        self.options.mode
    }

    /// Compile `spec`, or hand out the cached plan compiled from an equal spec.
    pub fn create_plan(&self, spec: &TransformSpec) -> Result<Arc<Plan>, FftError> {
        if let Ok(mut cache) = self.cache.lock()
            && let Some(plan) = cache.lookup(spec)
        {
            record_trace(compiled_event(&plan, true));
            return Ok(plan);
        }
        let plan = Arc::new(self.compiler.compile(spec)?);
        if let Ok(mut cache) = self.cache.lock() {
            cache.store(Arc::clone(&plan));
        }
        Ok(plan)
    }

    /// Release the caller's handle and drop the plan from the cache. Other
    /// holders of the same plan keep a valid handle.
    pub fn destroy_plan(&self, plan: Arc<Plan>) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.evict(plan.id());
        }
        drop(plan);
    }

    /// Scratch bytes `plan` needs in the execution context's work buffer.
    #[must_use]
    pub fn required_scratch_size(&self, plan: &Plan) -> usize {
        plan.scratch_bytes()
    }

    #[must_use]
    pub fn cached_plans(&self) -> usize {
        self.cache.lock().map_or(0, |cache| cache.len())
    }

    pub fn clear_plan_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    #[must_use]
    pub fn create_execution_context(&self) -> ExecutionContext {
        ExecutionContext::new(self.device.create_stream())
    }

    /// Allocate a work buffer sized for `plan` on this library's device.
    pub fn allocate_work_buffer(&self, plan: &Plan) -> Result<DeviceBuffer, FftError> {
        self.device
            .allocate(plan.precision(), plan.scratch_scalars())
            .map_err(|source| device_error("allocate", source))
    }

    /// Run `plan` on the context's stream with its work buffer as scratch.
    /// `output` is ignored by in-place plans.
    pub fn execute(
        &self,
        plan: &Plan,
        context: &mut ExecutionContext,
        input: &mut DeviceBuffer,
        output: Option<&mut DeviceBuffer>,
    ) -> Result<ExecutionReport, FftError> {
        let ExecutionContext {
            stream,
            work_buffer,
        } = context;
        let buffers = ExecutionBuffers {
            input,
            output,
            scratch: work_buffer.as_mut(),
        };
        engine::execute(plan, buffers, &**stream, self.options.mode)
    }
}

static DEFAULT_LIBRARY: OnceLock<Result<Library, FftError>> = OnceLock::new();

/// Library behind the free functions, set up with default options on first use.
pub fn default_library() -> Result<&'static Library, FftError> {
    DEFAULT_LIBRARY
        .get_or_init(|| Library::setup(LibraryOptions::default()))
        .as_ref()
        .map_err(Clone::clone)
}

pub fn create_plan(spec: &TransformSpec) -> Result<Arc<Plan>, FftError> {
    default_library()?.create_plan(spec)
}

pub fn destroy_plan(plan: Arc<Plan>) {
    match default_library() {
        Ok(library) => library.destroy_plan(plan),
        Err(_) => drop(plan),
    }
}

pub fn create_execution_context() -> Result<ExecutionContext, FftError> {
    Ok(default_library()?.create_execution_context())
}

#[must_use]
pub fn required_scratch_size(plan: &Plan) -> usize {
    plan.scratch_bytes()
}

pub fn execute(
    plan: &Plan,
    context: &mut ExecutionContext,
    input: &mut DeviceBuffer,
    output: Option<&mut DeviceBuffer>,
) -> Result<ExecutionReport, FftError> {
    default_library()?.execute(plan, context, input, output)
}
