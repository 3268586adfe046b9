#![no_main]

use std::sync::{Arc, OnceLock};

use arbitrary::Arbitrary;
use gfft_core::{
    ExecutionBuffers, KernelRegistry, Layout, Placement, PlanCompiler, RegistryConfig,
    SelectorConfig, TransformKind, TransformSpec, engine,
};
use gfft_device::{DeviceBuffer, HostStream, Precision};
use gfft_runtime::RuntimeMode;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct PlanInput {
    kind: u8,
    single: bool,
    in_place: bool,
    hardened: bool,
    lengths: Vec<u8>,
    batch: u8,
    input_stride: Option<u8>,
    transpose_threshold: u8,
    values: Vec<f64>,
}

fn registry() -> Arc<KernelRegistry> {
    static REGISTRY: OnceLock<Arc<KernelRegistry>> = OnceLock::new();
    Arc::clone(REGISTRY.get_or_init(|| {
        Arc::new(KernelRegistry::with_config(
            &RegistryConfig::default().with_max_direct_length(16),
        ))
    }))
}

fuzz_target!(|input: PlanInput| {
    let kind = match input.kind % 4 {
        0 => TransformKind::ComplexForward,
        1 => TransformKind::ComplexInverse,
        2 => TransformKind::RealForward,
        _ => TransformKind::RealInverse,
    };
    let precision = if input.single {
        Precision::Single
    } else {
        Precision::Double
    };
    let lengths: Vec<usize> = input
        .lengths
        .iter()
        .take(3)
        .map(|&n| usize::from(n % 72))
        .collect();
    let mut spec = TransformSpec::new(kind, precision, lengths)
        .with_batch(usize::from(input.batch % 4))
        .with_placement(if input.in_place {
            Placement::InPlace
        } else {
            Placement::NotInPlace
        });
    if let Some(stride) = input.input_stride {
        let stride = usize::from(stride % 4) + 1;
        let counts = spec.input_counts();
        let mut layout = Layout::contiguous(&counts);
        for s in &mut layout.strides {
            *s *= stride;
        }
        layout.distance *= stride;
        spec = spec.with_input_layout(layout);
    }

    let threshold = 16 + usize::from(input.transpose_threshold);
    let compiler = PlanCompiler::new(
        registry(),
        SelectorConfig::default().with_transpose_threshold(threshold),
    );
    let Ok(plan) = compiler.compile(&spec) else {
        return;
    };

    let scalars: Vec<f64> = (0..plan.input_scalars().max(plan.output_scalars()))
        .map(|i| input.values.get(i).copied().unwrap_or(0.0))
        .collect();
    let mut data = DeviceBuffer::from_scalars(precision, &scalars);
    let finite = data.all_finite();
    let mut output = DeviceBuffer::zeroed(precision, plan.output_scalars());
    let mut scratch = DeviceBuffer::zeroed(precision, plan.scratch_scalars());
    let mut buffers = ExecutionBuffers::new(&mut data).with_scratch(&mut scratch);
    if !plan.is_in_place() {
        buffers = buffers.with_output(&mut output);
    }
    let mode = if input.hardened {
        RuntimeMode::Hardened
    } else {
        RuntimeMode::Strict
    };
    let result = engine::execute(&plan, buffers, &HostStream::new(1), mode);
    if finite || mode == RuntimeMode::Strict {
        assert!(result.is_ok(), "{spec:?}: {result:?}");
    }
});
