#![forbid(unsafe_code)]

//! Plan execution.
//!
//! Execution validates the caller's buffers against the plan once, then
//! submits the plan's leaves to one stream in execution order. The plan is
//! only read, so one plan may run on several streams concurrently as long as
//! each execution brings its own buffers.

use std::time::Instant;

use gfft_device::{BufferRole, DeviceBuffer, KernelIo, Launch, Precision, Stream};
use gfft_runtime::{RuntimeMode, TraceEvent, TraceOutcome, record_trace};
use serde::{Deserialize, Serialize};

use crate::error::FftError;
use crate::plan::Plan;

/// Buffers bound to one execution.
///
/// `output` is ignored by in-place plans. `scratch` may be omitted when the
/// plan needs none.
#[derive(Debug)]
pub struct ExecutionBuffers<'a> {
    pub input: &'a mut DeviceBuffer,
    pub output: Option<&'a mut DeviceBuffer>,
    pub scratch: Option<&'a mut DeviceBuffer>,
}

impl<'a> ExecutionBuffers<'a> {
    #[must_use]
    pub fn new(input: &'a mut DeviceBuffer) -> Self {
        Self {
            input,
            output: None,
            scratch: None,
        }
    }

    #[must_use]
    pub fn with_output(mut self, output: &'a mut DeviceBuffer) -> Self {
        self.output = Some(output);
        self
    }

    #[must_use]
    pub fn with_scratch(mut self, scratch: &'a mut DeviceBuffer) -> Self {
        self.scratch = Some(scratch);
        self
    }
}

/// Summary of a completed execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub plan_id: String,
    pub stream: u64,
    pub launches: usize,
    pub timing_ns: u64,
}

fn check_precision(
    role: BufferRole,
    buffer: &DeviceBuffer,
    expected: Precision,
) -> Result<(), FftError> {
    if buffer.precision() != expected {
        return Err(FftError::PrecisionMismatch {
            role,
            expected,
            found: buffer.precision(),
        });
    }
    Ok(())
}

fn check_len(role: BufferRole, buffer: &DeviceBuffer, required: usize) -> Result<(), FftError> {
    if buffer.len() < required {
        return Err(FftError::BufferTooSmall {
            role,
            required,
            provided: buffer.len(),
        });
    }
    Ok(())
}

fn validate(plan: &Plan, buffers: &ExecutionBuffers<'_>, mode: RuntimeMode) -> Result<(), FftError> {
    let precision = plan.precision();
    check_precision(BufferRole::Input, &*buffers.input, precision)?;
    if plan.is_in_place() {
        let required = plan.input_scalars().max(plan.output_scalars());
        check_len(BufferRole::Input, &*buffers.input, required)?;
    } else {
        check_len(BufferRole::Input, &*buffers.input, plan.input_scalars())?;
        let output = buffers.output.as_deref().ok_or(FftError::MissingBuffer {
            role: BufferRole::Output,
        })?;
        check_precision(BufferRole::Output, output, precision)?;
        check_len(BufferRole::Output, output, plan.output_scalars())?;
    }

    let required = plan.scratch_bytes();
    if required > 0 {
        let scratch = buffers.scratch.as_deref();
        let provided = scratch.map_or(0, DeviceBuffer::byte_len);
        if provided < required {
            return Err(FftError::ScratchTooSmall { required, provided });
        }
        if let Some(scratch) = scratch {
            check_precision(BufferRole::Scratch, scratch, precision)?;
        }
    }

    if mode.checks_finite_input() && !buffers.input.all_finite() {
        return Err(FftError::NonFiniteInput);
    }
    Ok(())
}

fn executed_event(
    plan: &Plan,
    stream: &dyn Stream,
    launches: usize,
    started: Instant,
    result: Result<(), &FftError>,
) -> TraceEvent {
    let (outcome, error) = match result {
        Ok(()) => (TraceOutcome::Completed, None),
        Err(err) if launches == 0 && !matches!(err, FftError::Device { .. }) => {
            (TraceOutcome::Rejected, Some(err.to_string()))
        }
        Err(err) => (TraceOutcome::Aborted, Some(err.to_string())),
    };
    TraceEvent::PlanExecuted {
        plan_id: plan.id().to_string(),
        stream: stream.id(),
        launches,
        timing_ns: u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX),
        outcome,
        error,
    }
}

/// Run `plan` on `stream`.
///
/// Nothing is launched unless every buffer check passes. A failed launch
/// stops the execution; the output contents are then unspecified.
pub fn execute(
    plan: &Plan,
    buffers: ExecutionBuffers<'_>,
    stream: &dyn Stream,
    mode: RuntimeMode,
) -> Result<ExecutionReport, FftError> {
    let started = Instant::now();
    if let Err(err) = validate(plan, &buffers, mode) {
        record_trace(executed_event(plan, stream, 0, started, Err(&err)));
        return Err(err);
    }

    let ExecutionBuffers {
        input,
        output,
        scratch,
    } = buffers;
    let output = if plan.is_in_place() { None } else { output };
    let mut io = KernelIo::new(input, output, scratch);

    let mut launches = 0;
    for node in plan.leaves() {
        let Some(step) = node.leaf() else { continue };
        let launch = Launch {
            name: step.kernel.name(),
            entry: step.kernel.entry(),
            args: &step.args,
        };
        if let Err(source) = stream.launch(launch, &mut io) {
            let err = FftError::Device {
                node: step.kernel.name().to_string(),
                source,
            };
            record_trace(executed_event(plan, stream, launches, started, Err(&err)));
            return Err(err);
        }
        launches += 1;
    }

    let event = executed_event(plan, stream, launches, started, Ok(()));
    let timing_ns = match &event {
        TraceEvent::PlanExecuted { timing_ns, .. } => *timing_ns,
        _ => 0,
    };
    record_trace(event);
    Ok(ExecutionReport {
        plan_id: plan.id().to_string(),
        stream: stream.id(),
        launches,
        timing_ns,
    })
}
