#![forbid(unsafe_code)]

//! Plan tree compiler.
//!
//! Each transform pass is described by a length, a list of batch axis counts
//! and two [`Operand`]s whose strides are `[vector stride, batch strides...]`.
//! Composite schemes rewrite those operands for their children and carve
//! their intermediates out of the scratch buffer. Scratch is a stack: a node
//! pushes its own regions, its children push above them, and everything is
//! popped when the node is finished, so a node's requirement is its own
//! regions plus the peak of its children.
//!
//! Child orders:
//! - `Factored` (`N = N1*N2`, `n = N2*n1 + n2`, `k = k1 + N1*k2`):
//!   inner DFT `N1` src->Y, twiddle `W_N^{k1*n2}` on Y, outer DFT `N2` Y->dst.
//! - `TransposeLarge`: transpose src->S, DFT `N1` on S, twiddled transpose
//!   S->dst, DFT `N2` dst->S, transpose S->dst.
//! - `Bluestein`: chirp, FFT(chirp), pad-multiply, FFT(work), pointwise
//!   multiply, inverse FFT(work), result-multiply.
//! - `RealPacked`: half-length DFT then post-process (forward), pre-process
//!   then half-length DFT (inverse). `RealEmbedded`: widen, full DFT, keep
//!   half (forward); expand, full DFT, keep real part (inverse).
//! - `MultiAxis`: axes 0, 1, 2 in order; real inverse runs its complex axes
//!   into a scratch half-complex volume first and the real axis last.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use gfft_device::{BufferRole, Direction, ElementKind, KernelArgs, Operand, Precision};
use gfft_runtime::{TraceEvent, record_trace};

use crate::error::FftError;
use crate::plan::{LeafStep, NodeBody, Plan, PlanNode};
use crate::registry::KernelRegistry;
use crate::scheme::{ComputeScheme, KernelKey, KernelLength};
use crate::selector::{AxisContext, SchemeSelector, Selection, SelectorConfig};
use crate::transform::{Layout, TransformSpec};

static PLAN_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_plan_id() -> String {
    format!("gfft-plan-{:016x}", PLAN_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Trace event describing a plan handed to a caller.
pub(crate) fn compiled_event(plan: &Plan, cache_hit: bool) -> TraceEvent {
    TraceEvent::PlanCompiled {
        plan_id: plan.id().to_string(),
        kind: plan.spec().kind.name().to_string(),
        precision: plan.precision().name().to_string(),
        lengths: plan.spec().lengths.clone(),
        batch: plan.spec().batch,
        nodes: plan.node_count(),
        leaves: plan.leaves().len(),
        scratch_bytes: plan.scratch_bytes(),
        cache_hit,
    }
}

/// Compiles [`TransformSpec`]s against one registry and selection policy.
#[derive(Debug, Clone)]
pub struct PlanCompiler {
    registry: Arc<KernelRegistry>,
    selector: SchemeSelector,
}

impl PlanCompiler {
    #[must_use]
    pub fn new(registry: Arc<KernelRegistry>, config: SelectorConfig) -> Self {
        Self {
            registry,
            selector: SchemeSelector::new(config),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<KernelRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn selector(&self) -> &SchemeSelector {
        &self.selector
    }

    /// Compile `spec`. On error no partial plan exists.
    pub fn compile(&self, spec: &TransformSpec) -> Result<Plan, FftError> {
        match self.compile_tree(spec) {
            Ok(plan) => {
                record_trace(compiled_event(&plan, false));
                Ok(plan)
            }
            Err(err) => {
                record_trace(TraceEvent::PlanRejected {
                    kind: spec.kind.name().to_string(),
                    lengths: spec.lengths.clone(),
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    fn compile_tree(&self, spec: &TransformSpec) -> Result<Plan, FftError> {
        spec.validate()?;
        let mut builder = Builder {
            registry: &self.registry,
            selector: &self.selector,
            precision: spec.precision,
            top: 0,
            peak: 0,
        };
        let mut root = builder.root(spec)?;
        if spec.direction() == Direction::Inverse {
            let factor = 1.0 / spec.element_count() as f64;
            let last = root
                .last_leaf_mut()
                .ok_or_else(|| FftError::unsupported("plan has no kernel launches"))?;
            if let NodeBody::Leaf(step) = &mut last.body {
                step.args.scale *= factor;
            }
            last.applies_normalization = true;
        }
        Ok(Plan {
            id: next_plan_id(),
            spec: spec.clone(),
            root,
            input_scalars: spec.input_scalars(),
            output_scalars: spec.output_scalars(),
        })
    }
}

/// Scratch stack position saved when a node starts.
struct Frame {
    top: usize,
    peak: usize,
}

fn operand(base: &Operand, strides: Vec<usize>) -> Operand {
    Operand::new(base.role, base.kind, base.offset, strides)
}

fn scratch(offset: usize, strides: Vec<usize>) -> Operand {
    Operand::new(BufferRole::Scratch, ElementKind::Complex, offset, strides)
}

/// Batch strides of a packed volume whose vectors are `base` apart.
fn packed(base: usize, batch: &[usize]) -> Vec<usize> {
    let mut strides = Vec::with_capacity(batch.len());
    let mut running = base;
    for &count in batch {
        strides.push(running);
        running *= count;
    }
    strides
}

fn concat(head: &[usize], tail: &[usize]) -> Vec<usize> {
    head.iter().chain(tail).copied().collect()
}

fn vector_stride(op: &Operand) -> (usize, &[usize]) {
    match op.strides.split_first() {
        Some((&first, rest)) => (first, rest),
        None => (1, &[]),
    }
}

/// Same storage, read as complex pairs. Only called on packable operands:
/// consecutive real samples become consecutive pairs, so the vector stride
/// stays 1 while the offset and batch strides halve.
fn complex_view(real: &Operand) -> Operand {
    let (_, batch) = vector_stride(real);
    Operand::new(
        real.role,
        ElementKind::Complex,
        real.offset / 2,
        concat(&[1], &batch.iter().map(|s| s / 2).collect::<Vec<_>>()),
    )
}

fn packable(real: &Operand) -> bool {
    let (stride, batch) = vector_stride(real);
    stride == 1 && real.offset.is_multiple_of(2) && batch.iter().all(|s| s.is_multiple_of(2))
}

/// Operand for a pass along `axis`: that axis first, the other axes next,
/// the batch distance last.
fn axis_operand(role: BufferRole, kind: ElementKind, layout: &Layout, axis: usize) -> Operand {
    let mut strides = vec![layout.strides[axis]];
    strides.extend(
        (0..layout.strides.len())
            .filter(|&i| i != axis)
            .map(|i| layout.strides[i]),
    );
    strides.push(layout.distance);
    Operand::new(role, kind, layout.offset, strides)
}

fn axis_batch(counts: &[usize], axis: usize, batch: usize) -> Vec<usize> {
    let mut out: Vec<_> = (0..counts.len())
        .filter(|&i| i != axis)
        .map(|i| counts[i])
        .collect();
    out.push(batch);
    out
}

struct Builder<'c> {
    registry: &'c KernelRegistry,
    selector: &'c SchemeSelector,
    precision: Precision,
    top: usize,
    peak: usize,
}

impl Builder<'_> {
    fn begin(&mut self) -> Frame {
        let frame = Frame {
            top: self.top,
            peak: self.peak,
        };
        self.peak = self.top;
        frame
    }

    fn alloc(&mut self, elements: usize) -> usize {
        let offset = self.top;
        self.top += elements;
        self.peak = self.peak.max(self.top);
        offset
    }

    /// Pop the frame; returns the scratch the frame needed.
    fn end(&mut self, frame: Frame) -> usize {
        let need = self.peak - frame.top;
        self.top = frame.top;
        self.peak = self.peak.max(frame.peak);
        need
    }

    fn leaf(&self, key: KernelKey, mut args: KernelArgs) -> Result<PlanNode, FftError> {
        let kernel = self.registry.lookup(&key)?;
        if args.src.as_ref() == Some(&args.dst) {
            args.src = None;
        }
        Ok(PlanNode {
            scheme: key.scheme,
            lengths: vec![args.length],
            src: args.src.as_ref().map(|op| op.role),
            dst: args.dst.role,
            scratch_elements: 0,
            applies_normalization: false,
            body: NodeBody::Leaf(LeafStep { kernel, args }),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn aux(
        &self,
        scheme: ComputeScheme,
        length: usize,
        shape: Vec<usize>,
        src: &Operand,
        dst: &Operand,
        direction: Direction,
        scale: f64,
    ) -> Result<PlanNode, FftError> {
        let key = KernelKey::new(KernelLength::Any, scheme, self.precision);
        self.leaf(
            key,
            KernelArgs {
                length,
                shape,
                src: Some(src.clone()),
                dst: dst.clone(),
                direction,
                scale,
            },
        )
    }

    fn composite(
        scheme: ComputeScheme,
        lengths: Vec<usize>,
        src: &Operand,
        dst: &Operand,
        scratch_elements: usize,
        children: Vec<PlanNode>,
    ) -> PlanNode {
        PlanNode {
            scheme,
            lengths,
            src: (src != dst).then_some(src.role),
            dst: dst.role,
            scratch_elements,
            applies_normalization: false,
            body: NodeBody::Composite(children),
        }
    }

    fn root(&mut self, spec: &TransformSpec) -> Result<PlanNode, FftError> {
        let output_role = if spec.is_in_place() {
            BufferRole::Input
        } else {
            BufferRole::Output
        };
        let input = spec.resolved_input_layout();
        let output = spec.resolved_output_layout();
        let in_op = |axis| axis_operand(BufferRole::Input, spec.input_kind(), &input, axis);
        let out_op = |axis| axis_operand(output_role, spec.output_kind(), &output, axis);
        let dims = spec.dimension();
        let direction = spec.direction();
        let lengths = &spec.lengths;

        if dims == 1 {
            let batch = [spec.batch];
            return if spec.is_real() {
                self.real_pass(lengths[0], direction, &batch, &in_op(0), &out_op(0), 0)
            } else {
                self.complex_pass(lengths[0], direction, &batch, &in_op(0), &out_op(0), 0)
            };
        }

        let frame = self.begin();
        let mut children = Vec::new();
        if !spec.is_real() {
            for axis in 0..dims {
                let from = if axis == 0 { in_op(axis) } else { out_op(axis) };
                let batch = axis_batch(lengths, axis, spec.batch);
                children.extend(self.complex_axis(
                    lengths[axis],
                    direction,
                    &batch,
                    &from,
                    &out_op(axis),
                )?);
            }
        } else if direction == Direction::Forward {
            let batch = axis_batch(lengths, 0, spec.batch);
            children.push(self.real_pass(lengths[0], direction, &batch, &in_op(0), &out_op(0), 1)?);
            let counts = spec.output_counts();
            for axis in 1..dims {
                let batch = axis_batch(&counts, axis, spec.batch);
                children.extend(self.complex_axis(
                    lengths[axis],
                    direction,
                    &batch,
                    &out_op(axis),
                    &out_op(axis),
                )?);
            }
        } else {
            let counts = spec.input_counts();
            let volume: usize = counts.iter().product();
            let offset = self.alloc(volume * spec.batch);
            let work = Layout::contiguous(&counts).with_offset(offset);
            let work_op = |axis| axis_operand(BufferRole::Scratch, ElementKind::Complex, &work, axis);
            for axis in 1..dims {
                let from = if axis == 1 { in_op(axis) } else { work_op(axis) };
                let batch = axis_batch(&counts, axis, spec.batch);
                children.extend(self.complex_axis(
                    lengths[axis],
                    direction,
                    &batch,
                    &from,
                    &work_op(axis),
                )?);
            }
            let batch = axis_batch(&counts, 0, spec.batch);
            children.push(self.real_pass(
                lengths[0],
                direction,
                &batch,
                &work_op(0),
                &out_op(0),
                1,
            )?);
        }
        let need = self.end(frame);
        Ok(Self::composite(
            ComputeScheme::MultiAxis,
            lengths.clone(),
            &in_op(0),
            &out_op(0),
            need,
            children,
        ))
    }

    /// One complex axis of a multi-axis plan. A strided pass that is not a
    /// single fused kernel runs on a contiguous scratch copy.
    fn complex_axis(
        &mut self,
        n: usize,
        direction: Direction,
        batch: &[usize],
        from: &Operand,
        to: &Operand,
    ) -> Result<Vec<PlanNode>, FftError> {
        let selection = self.select(n, AxisContext::complex(self.precision, 1))?;
        let unit = vector_stride(from).0 == 1 && vector_stride(to).0 == 1;
        if unit || matches!(selection, Selection::Direct { .. }) {
            return Ok(vec![self.build_complex(n, selection, direction, batch, from, to, 1)?]);
        }
        let mark = self.top;
        let total: usize = batch.iter().product();
        let offset = self.alloc(n * total);
        let contiguous = scratch(offset, concat(&[1], &packed(n, batch)));
        let shape = concat(&[n], batch);
        let gather = self.aux(
            ComputeScheme::KernelTranspose,
            n,
            shape.clone(),
            from,
            &contiguous,
            direction,
            1.0,
        )?;
        let pass =
            self.build_complex(n, selection, direction, batch, &contiguous, &contiguous, 2)?;
        let scatter = self.aux(
            ComputeScheme::KernelTranspose,
            n,
            shape,
            &contiguous,
            to,
            direction,
            1.0,
        )?;
        self.top = mark;
        Ok(vec![gather, pass, scatter])
    }

    fn select(&self, n: usize, ctx: AxisContext) -> Result<Selection, FftError> {
        self.selector.select(self.registry, n, &ctx)
    }

    fn complex_pass(
        &mut self,
        n: usize,
        direction: Direction,
        batch: &[usize],
        src: &Operand,
        dst: &Operand,
        depth: usize,
    ) -> Result<PlanNode, FftError> {
        let selection = self.select(n, AxisContext::complex(self.precision, depth))?;
        self.build_complex(n, selection, direction, batch, src, dst, depth)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_complex(
        &mut self,
        n: usize,
        selection: Selection,
        direction: Direction,
        batch: &[usize],
        src: &Operand,
        dst: &Operand,
        depth: usize,
    ) -> Result<PlanNode, FftError> {
        match selection {
            Selection::Direct { key } => self.leaf(
                key,
                KernelArgs {
                    length: n,
                    shape: concat(&[n], batch),
                    src: Some(src.clone()),
                    dst: dst.clone(),
                    direction,
                    scale: 1.0,
                },
            ),
            Selection::Factored { inner, outer } => {
                self.factored(n, inner, outer, direction, batch, src, dst, depth)
            }
            Selection::TransposeLarge { inner, outer } => {
                self.transpose_large(n, inner, outer, direction, batch, src, dst, depth)
            }
            Selection::Bluestein { padded } => {
                self.bluestein(n, padded, direction, batch, src, dst, depth)
            }
            Selection::RealPacked { .. } | Selection::RealEmbedded => Err(FftError::unsupported(
                "real scheme selected for a complex pass",
            )),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn factored(
        &mut self,
        n: usize,
        n1: usize,
        n2: usize,
        direction: Direction,
        batch: &[usize],
        src: &Operand,
        dst: &Operand,
        depth: usize,
    ) -> Result<PlanNode, FftError> {
        let frame = self.begin();
        let total: usize = batch.iter().product();
        let y = self.alloc(n * total);
        let (s, src_batch) = vector_stride(src);
        let (ds, dst_batch) = vector_stride(dst);
        let volume = packed(n, batch);

        let inner_src = operand(src, concat(&[n2 * s, s], src_batch));
        let y_rows = scratch(y, concat(&[1, n1], &volume));
        let inner = self.complex_pass(
            n1,
            direction,
            &concat(&[n2], batch),
            &inner_src,
            &y_rows,
            depth + 1,
        )?;
        let twiddle = self.aux(
            ComputeScheme::KernelTwiddle,
            n,
            concat(&[n1, n2], batch),
            &y_rows,
            &y_rows,
            direction,
            1.0,
        )?;
        let y_columns = scratch(y, concat(&[n1, 1], &volume));
        let outer_dst = operand(dst, concat(&[n1 * ds, ds], dst_batch));
        let outer = self.complex_pass(
            n2,
            direction,
            &concat(&[n1], batch),
            &y_columns,
            &outer_dst,
            depth + 1,
        )?;
        let need = self.end(frame);
        Ok(Self::composite(
            ComputeScheme::Factored,
            vec![n],
            src,
            dst,
            need,
            vec![inner, twiddle, outer],
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn transpose_large(
        &mut self,
        n: usize,
        n1: usize,
        n2: usize,
        direction: Direction,
        batch: &[usize],
        src: &Operand,
        dst: &Operand,
        depth: usize,
    ) -> Result<PlanNode, FftError> {
        let frame = self.begin();
        let total: usize = batch.iter().product();
        let base = self.alloc(n * total);
        let (s, src_batch) = vector_stride(src);
        let (ds, dst_batch) = vector_stride(dst);
        let volume = packed(n, batch);

        // S[n2][n1]
        let by_n2 = scratch(base, concat(&[1, n1], &volume));
        let gather = self.aux(
            ComputeScheme::KernelTranspose,
            n,
            concat(&[n1, n2], batch),
            &operand(src, concat(&[n2 * s, s], src_batch)),
            &by_n2,
            direction,
            1.0,
        )?;
        let rows = self.complex_pass(
            n1,
            direction,
            &concat(&[n2], batch),
            &by_n2,
            &by_n2,
            depth + 1,
        )?;
        // dst[k1*N2 + n2] = S[n2][k1] * W_N^{k1*n2}
        let spread = operand(dst, concat(&[n2 * ds, ds], dst_batch));
        let twiddle = self.aux(
            ComputeScheme::KernelTwiddle,
            n,
            concat(&[n1, n2], batch),
            &by_n2,
            &spread,
            direction,
            1.0,
        )?;
        // S[k1][k2]
        let by_k1 = scratch(base, concat(&[1, n2], &volume));
        let columns = self.complex_pass(
            n2,
            direction,
            &concat(&[n1], batch),
            &operand(dst, concat(&[ds, n2 * ds], dst_batch)),
            &by_k1,
            depth + 1,
        )?;
        let scatter = self.aux(
            ComputeScheme::KernelTranspose,
            n,
            concat(&[n2, n1], batch),
            &by_k1,
            &operand(dst, concat(&[n1 * ds, ds], dst_batch)),
            direction,
            1.0,
        )?;
        let need = self.end(frame);
        Ok(Self::composite(
            ComputeScheme::TransposeLarge,
            vec![n],
            src,
            dst,
            need,
            vec![gather, rows, twiddle, columns, scatter],
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn bluestein(
        &mut self,
        n: usize,
        m: usize,
        direction: Direction,
        batch: &[usize],
        src: &Operand,
        dst: &Operand,
        depth: usize,
    ) -> Result<PlanNode, FftError> {
        let frame = self.begin();
        let total: usize = batch.iter().product();
        let filter_at = self.alloc(m);
        let work_at = self.alloc(m * total);
        let filter = scratch(filter_at, vec![1]);
        let broadcast = scratch(filter_at, concat(&[1], &vec![0; batch.len()]));
        let work = scratch(work_at, concat(&[1], &packed(m, batch)));
        let shape = concat(&[m], batch);

        let chirp = self.aux(
            ComputeScheme::KernelChirp,
            n,
            vec![m],
            &filter,
            &filter,
            direction,
            1.0,
        )?;
        let filter_fft =
            self.complex_pass(m, Direction::Forward, &[], &filter, &filter, depth + 1)?;
        let pad = self.aux(
            ComputeScheme::KernelPadMul,
            n,
            shape.clone(),
            src,
            &work,
            direction,
            1.0,
        )?;
        let work_fft = self.complex_pass(m, Direction::Forward, batch, &work, &work, depth + 1)?;
        let multiply = self.aux(
            ComputeScheme::KernelPointwiseMul,
            m,
            shape,
            &broadcast,
            &work,
            direction,
            1.0,
        )?;
        let work_ifft = self.complex_pass(m, Direction::Inverse, batch, &work, &work, depth + 1)?;
        let result = self.aux(
            ComputeScheme::KernelResMul,
            n,
            concat(&[n], batch),
            &work,
            dst,
            direction,
            1.0 / m as f64,
        )?;
        let need = self.end(frame);
        Ok(Self::composite(
            ComputeScheme::Bluestein,
            vec![n],
            src,
            dst,
            need,
            vec![chirp, filter_fft, pad, work_fft, multiply, work_ifft, result],
        ))
    }

    /// Real axis of length `n`: real `src` to half-complex `dst` (forward) or
    /// half-complex `src` to real `dst` (inverse).
    fn real_pass(
        &mut self,
        n: usize,
        direction: Direction,
        batch: &[usize],
        src: &Operand,
        dst: &Operand,
        depth: usize,
    ) -> Result<PlanNode, FftError> {
        let real_side = match direction {
            Direction::Forward => src,
            Direction::Inverse => dst,
        };
        let ctx = AxisContext::real(self.precision, depth, packable(real_side));
        let selection = self.select(n, ctx)?;
        let frame = self.begin();
        let total: usize = batch.iter().product();
        let (scheme, children) = match selection {
            Selection::RealPacked { half } => {
                let z_at = self.alloc(half * total);
                let z = scratch(z_at, concat(&[1], &packed(half, batch)));
                let shape = concat(&[half], batch);
                let children = match direction {
                    Direction::Forward => {
                        let dft =
                            self.complex_pass(half, direction, batch, &complex_view(src), &z, depth + 1)?;
                        let post = self.aux(
                            ComputeScheme::KernelRealPost,
                            n,
                            shape,
                            &z,
                            dst,
                            direction,
                            1.0,
                        )?;
                        vec![dft, post]
                    }
                    Direction::Inverse => {
                        let pre = self.aux(
                            ComputeScheme::KernelRealPre,
                            n,
                            shape,
                            src,
                            &z,
                            direction,
                            1.0,
                        )?;
                        let dft =
                            self.complex_pass(half, direction, batch, &z, &complex_view(dst), depth + 1)?;
                        vec![pre, dft]
                    }
                };
                (ComputeScheme::RealPacked, children)
            }
            Selection::RealEmbedded => {
                let c_at = self.alloc(n * total);
                let c = scratch(c_at, concat(&[1], &packed(n, batch)));
                let shape = concat(&[n], batch);
                let children = match direction {
                    Direction::Forward => {
                        let widen = self.aux(
                            ComputeScheme::KernelRealToComplex,
                            n,
                            shape,
                            src,
                            &c,
                            direction,
                            1.0,
                        )?;
                        let dft = self.complex_pass(n, direction, batch, &c, &c, depth + 1)?;
                        let keep = self.aux(
                            ComputeScheme::KernelComplexToHermitian,
                            n,
                            concat(&[n / 2 + 1], batch),
                            &c,
                            dst,
                            direction,
                            1.0,
                        )?;
                        vec![widen, dft, keep]
                    }
                    Direction::Inverse => {
                        let expand = self.aux(
                            ComputeScheme::KernelHermitianToComplex,
                            n,
                            shape.clone(),
                            src,
                            &c,
                            direction,
                            1.0,
                        )?;
                        let dft = self.complex_pass(n, direction, batch, &c, &c, depth + 1)?;
                        let narrow = self.aux(
                            ComputeScheme::KernelComplexToReal,
                            n,
                            shape,
                            &c,
                            dst,
                            direction,
                            1.0,
                        )?;
                        vec![expand, dft, narrow]
                    }
                };
                (ComputeScheme::RealEmbedded, children)
            }
            other => {
                return Err(FftError::unsupported(format!(
                    "{} selected for a real axis",
                    other.scheme()
                )));
            }
        };
        let need = self.end(frame);
        Ok(Self::composite(scheme, vec![n], src, dst, need, children))
    }
}
