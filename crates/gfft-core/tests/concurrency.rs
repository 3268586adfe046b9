//! Shared-state tests: process-wide registry construction, one plan on many
//! streams, and partial completion when a stream rejects a launch.

use std::sync::{Arc, Barrier};
use std::thread;

use gfft_core::{
    ErrorClass, ExecutionBuffers, FftError, KernelRegistry, Library, LibraryOptions, Plan,
    TransformKind, TransformSpec, create_execution_context, create_plan, default_library,
    destroy_plan, engine, execute, required_scratch_size,
};
use gfft_device::{DeviceBuffer, HostDevice, HostStream, Precision};
use gfft_runtime::RuntimeMode;
use num_complex::Complex;

fn signal(n: usize, seed: f64) -> Vec<Complex<f64>> {
    (0..n)
        .map(|i| Complex::new((i as f64 * 0.3 + seed).sin(), (i as f64 * 0.7 - seed).cos()))
        .collect()
}

#[test]
fn concurrent_first_use_populates_the_registry_once() {
    let threads = 8;
    let barrier = Barrier::new(threads);
    let plans: Vec<Arc<Plan>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|i| {
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    let spec = TransformSpec::new(
                        TransformKind::ComplexForward,
                        Precision::Double,
                        vec![64 + 8 * i],
                    );
                    create_plan(&spec).expect("plan")
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("thread"))
            .collect()
    });
    assert_eq!(plans.len(), threads);
    assert_eq!(KernelRegistry::global_populations(), 1);
    let library = default_library().expect("default library");
    assert!(Arc::ptr_eq(library.registry(), &KernelRegistry::global()));
    assert!(library.registry().verify_integrity().is_clean());
    for plan in plans {
        destroy_plan(plan);
    }
}

#[test]
fn default_library_free_functions_run_a_plan() {
    let spec = TransformSpec::new(TransformKind::ComplexInverse, Precision::Double, vec![6000]);
    let plan = create_plan(&spec).expect("plan");
    let mut context = create_execution_context().expect("context");
    if required_scratch_size(&plan) > 0 {
        let work = default_library()
            .expect("library")
            .allocate_work_buffer(&plan)
            .expect("work buffer");
        context.set_work_buffer(work);
    }
    let mut input = DeviceBuffer::from_complex(Precision::Double, &vec![Complex::new(1.0, 0.0); 6000]);
    let mut output = DeviceBuffer::zeroed(Precision::Double, 12000);
    let report = execute(&plan, &mut context, &mut input, Some(&mut output)).expect("execute");
    assert_eq!(report.launches, plan.leaves().len());
    let out = output.to_complex();
    assert!((out[0].re - 1.0).abs() < 1e-9);
    assert!(out[1..].iter().all(|v| v.norm() < 1e-9));
    destroy_plan(plan);
}

#[test]
fn one_plan_runs_on_two_streams_at_once() {
    let library = Library::setup(
        LibraryOptions::default()
            .with_registry(gfft_core::RegistryConfig::default().with_max_direct_length(16)),
    )
    .expect("setup");
    let spec = TransformSpec::new(TransformKind::ComplexForward, Precision::Double, vec![97])
        .with_batch(2);
    let plan = library.create_plan(&spec).expect("plan");

    let run_alone = |seed: f64| {
        let mut input = DeviceBuffer::from_complex(Precision::Double, &signal(194, seed));
        let mut output = DeviceBuffer::zeroed(Precision::Double, plan.output_scalars());
        let mut scratch = DeviceBuffer::zeroed(Precision::Double, plan.scratch_scalars());
        let stream = HostStream::new(seed.to_bits());
        engine::execute(
            &plan,
            ExecutionBuffers::new(&mut input)
                .with_output(&mut output)
                .with_scratch(&mut scratch),
            &stream,
            RuntimeMode::Strict,
        )
        .expect("execute");
        output
    };
    let sequential = [run_alone(1.0), run_alone(2.0)];

    let concurrent: Vec<DeviceBuffer> = thread::scope(|scope| {
        let handles: Vec<_> = [1.0, 2.0]
            .into_iter()
            .map(|seed| scope.spawn(move || run_alone(seed)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("thread"))
            .collect()
    });
    assert_eq!(concurrent[0], sequential[0]);
    assert_eq!(concurrent[1], sequential[1]);
    assert_ne!(concurrent[0], concurrent[1]);
}

#[test]
fn rejected_launch_keeps_effects_of_earlier_launches() {
    let library = Library::with_registry(
        Arc::new(KernelRegistry::with_config(
            &gfft_core::RegistryConfig::default().with_max_direct_length(16),
        )),
        Arc::new(HostDevice::new().with_launch_limit(2)),
        LibraryOptions::default(),
    )
    .expect("setup");
    let spec = TransformSpec::new(TransformKind::ComplexForward, Precision::Double, vec![64]);
    let plan = library.create_plan(&spec).expect("plan");
    assert_eq!(plan.leaves().len(), 3);

    let mut context = library.create_execution_context();
    context.set_work_buffer(library.allocate_work_buffer(&plan).expect("work"));
    let mut input = DeviceBuffer::from_complex(Precision::Double, &signal(64, 0.5));
    let mut output = DeviceBuffer::zeroed(Precision::Double, 128);
    let err = library
        .execute(&plan, &mut context, &mut input, Some(&mut output))
        .expect_err("third launch rejected");
    assert_eq!(err.class(), ErrorClass::DeviceError);
    assert!(matches!(err, FftError::Device { .. }));

    // the inner pass and the twiddle ran; only the outer pass is missing
    let work = context.take_work_buffer().expect("work buffer");
    assert!(work.to_scalars().iter().any(|&v| v != 0.0));
    assert!(output.to_scalars().iter().all(|&v| v == 0.0));
}
