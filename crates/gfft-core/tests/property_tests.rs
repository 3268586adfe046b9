//! Property tests for the plan compiler and engine.
//!
//! Seed replay: `PROPTEST_CASES=1000 cargo test -p gfft-core --test property_tests`
//! Reproduce: `PROPTEST_SEED=<seed> cargo test -p gfft-core --test property_tests`

use std::sync::Arc;

use gfft_core::reference::naive_dft_nd;
use gfft_core::{
    ExecutionBuffers, KernelRegistry, Plan, PlanCompiler, RegistryConfig, SelectorConfig,
    TransformKind, TransformSpec, engine,
};
use gfft_device::{DeviceBuffer, Direction, HostStream, Precision};
use gfft_runtime::{RuntimeMode, max_abs_diff};
use num_complex::Complex;
use proptest::prelude::*;

fn compiler(transpose_threshold: usize) -> PlanCompiler {
    PlanCompiler::new(
        Arc::new(KernelRegistry::with_config(
            &RegistryConfig::default().with_max_direct_length(16),
        )),
        SelectorConfig::default().with_transpose_threshold(transpose_threshold),
    )
}

fn run(plan: &Plan, input: &mut DeviceBuffer) -> DeviceBuffer {
    let mut output = DeviceBuffer::zeroed(plan.precision(), plan.output_scalars());
    let mut scratch = DeviceBuffer::zeroed(plan.precision(), plan.scratch_scalars());
    engine::execute(
        plan,
        ExecutionBuffers::new(input)
            .with_output(&mut output)
            .with_scratch(&mut scratch),
        &HostStream::new(1),
        RuntimeMode::Strict,
    )
    .expect("execute");
    output
}

fn samples(count: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-1.0f64..1.0, count)
}

// ═══════════════════════════════════════════════════════════════
// Property 1: complex forward then inverse reproduces the input
// ═══════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_round_trip_complex_1d(
        (n, batch, threshold, values) in (1usize..=140, 1usize..=3, prop::sample::select(vec![64usize, 1 << 16]))
            .prop_flat_map(|(n, batch, threshold)| {
                (Just(n), Just(batch), Just(threshold), samples(2 * n * batch))
            }),
    ) {
        let compiler = compiler(threshold);
        let spec = |kind| TransformSpec::new(kind, Precision::Double, vec![n]).with_batch(batch);
        let forward = compiler.compile(&spec(TransformKind::ComplexForward)).expect("forward");
        let inverse = compiler.compile(&spec(TransformKind::ComplexInverse)).expect("inverse");

        let mut input = DeviceBuffer::from_scalars(Precision::Double, &values);
        let mut spectrum = run(&forward, &mut input);
        let recovered = run(&inverse, &mut spectrum).to_scalars();
        let err = max_abs_diff(&recovered, &values);
        prop_assert!(err < 1e-10, "n={n} batch={batch}: round trip error {err}");
    }
}

// ═══════════════════════════════════════════════════════════════
// Property 2: multi-axis forward agrees with the naive transform
// ═══════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_multi_axis_matches_naive(
        (lengths, values) in prop::collection::vec(1usize..=20, 2..=3)
            .prop_flat_map(|lengths| {
                let count: usize = lengths.iter().product();
                (Just(lengths), samples(2 * count))
            }),
    ) {
        let spec = TransformSpec::new(TransformKind::ComplexForward, Precision::Double, lengths.clone());
        let plan = compiler(1 << 16).compile(&spec).expect("plan");
        let x: Vec<_> = values.chunks_exact(2).map(|p| Complex::new(p[0], p[1])).collect();
        let mut input = DeviceBuffer::from_scalars(Precision::Double, &values);
        let actual = run(&plan, &mut input).to_scalars();
        let expected: Vec<f64> = naive_dft_nd(&x, &lengths, Direction::Forward)
            .into_iter()
            .flat_map(|v| [v.re, v.im])
            .collect();
        let err = max_abs_diff(&actual, &expected);
        prop_assert!(err < 1e-9, "lengths={lengths:?}: error {err}");
    }
}

// ═══════════════════════════════════════════════════════════════
// Property 3: real forward then real inverse reproduces the samples
// ═══════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_round_trip_real(
        (lengths, batch, values) in (prop::collection::vec(1usize..=40, 1..=2), 1usize..=2)
            .prop_flat_map(|(lengths, batch)| {
                let count: usize = lengths.iter().product();
                (Just(lengths), Just(batch), samples(count * batch))
            }),
    ) {
        let compiler = compiler(1 << 16);
        let spec = |kind| {
            TransformSpec::new(kind, Precision::Double, lengths.clone()).with_batch(batch)
        };
        let forward = compiler.compile(&spec(TransformKind::RealForward)).expect("forward");
        let inverse = compiler.compile(&spec(TransformKind::RealInverse)).expect("inverse");

        let mut input = DeviceBuffer::from_scalars(Precision::Double, &values);
        let mut spectrum = run(&forward, &mut input);
        let recovered = run(&inverse, &mut spectrum).to_scalars();
        let err = max_abs_diff(&recovered, &values);
        prop_assert!(err < 1e-10, "lengths={lengths:?}: round trip error {err}");
    }
}

// ═══════════════════════════════════════════════════════════════
// Property 4: normalization happens exactly once, and only on inverses
// ═══════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn test_normalization_applied_once(
        lengths in prop::collection::vec(1usize..=300, 1..=3),
        kind in prop::sample::select(vec![
            TransformKind::ComplexForward,
            TransformKind::ComplexInverse,
            TransformKind::RealForward,
            TransformKind::RealInverse,
        ]),
    ) {
        let spec = TransformSpec::new(kind, Precision::Single, lengths.clone());
        let plan = compiler(256).compile(&spec).expect("plan");
        let expected = usize::from(spec.direction() == Direction::Inverse);
        prop_assert_eq!(plan.normalizing_nodes().len(), expected);
        if expected == 1 {
            let leaves = plan.leaves();
            prop_assert!(leaves.last().is_some_and(|leaf| leaf.applies_normalization));
        }
    }
}

// ═══════════════════════════════════════════════════════════════
// Property 5: compilation is deterministic
// ═══════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn test_compile_is_deterministic(
        lengths in prop::collection::vec(1usize..=500, 1..=3),
        batch in 1usize..=4,
    ) {
        let spec = TransformSpec::new(TransformKind::ComplexInverse, Precision::Double, lengths)
            .with_batch(batch);
        let a = compiler(128).compile(&spec).expect("plan");
        let b = compiler(128).compile(&spec).expect("plan");
        prop_assert_eq!(a.fingerprint(), b.fingerprint());
    }
}
