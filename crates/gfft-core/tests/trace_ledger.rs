//! The shared trace ledger records selection, compilation and execution as
//! JSON lines. Kept in its own test binary so no other test drains it.

use std::sync::Arc;

use gfft_core::{
    ExecutionBuffers, KernelRegistry, PlanCompiler, RegistryConfig, SelectorConfig, TransformKind,
    TransformSpec, engine,
};
use gfft_device::{DeviceBuffer, HostStream, Precision};
use gfft_runtime::{RuntimeMode, TestLogEntry, TestResult, take_traces};
use serde_json::Value;

#[test]
fn compile_and_execute_leave_json_line_records() {
    let _ = take_traces();
    let compiler = PlanCompiler::new(
        Arc::new(KernelRegistry::with_config(
            &RegistryConfig::default().with_max_direct_length(16),
        )),
        SelectorConfig::default(),
    );
    let spec = TransformSpec::new(TransformKind::ComplexForward, Precision::Double, vec![48]);
    let plan = compiler.compile(&spec).expect("plan");

    let mut input = DeviceBuffer::zeroed(Precision::Double, plan.input_scalars());
    let mut output = DeviceBuffer::zeroed(Precision::Double, plan.output_scalars());
    let mut scratch = DeviceBuffer::zeroed(Precision::Double, plan.scratch_scalars());
    engine::execute(
        &plan,
        ExecutionBuffers::new(&mut input)
            .with_output(&mut output)
            .with_scratch(&mut scratch),
        &HostStream::new(7),
        RuntimeMode::Strict,
    )
    .expect("execute");

    let lines: Vec<Value> = take_traces()
        .iter()
        .map(|record| serde_json::from_str(&record.to_json_line()).expect("json line"))
        .collect();
    let events: Vec<&str> = lines
        .iter()
        .filter_map(|line| line["event"].as_str())
        .collect();

    let selected = events.iter().position(|e| *e == "scheme_selected");
    let compiled = events.iter().position(|e| *e == "plan_compiled");
    let executed = events.iter().position(|e| *e == "plan_executed");
    assert!(selected.is_some(), "events: {events:?}");
    assert!(selected < compiled && compiled < executed, "events: {events:?}");

    let compiled = &lines[compiled.expect("compiled")];
    assert_eq!(compiled["plan_id"], plan.id());
    assert_eq!(compiled["cache_hit"], false);
    assert_eq!(compiled["lengths"], serde_json::json!([48]));

    let executed = &lines[executed.expect("executed")];
    assert_eq!(executed["plan_id"], plan.id());
    assert_eq!(executed["stream"], 7);
    assert_eq!(executed["outcome"], "completed");
    assert_eq!(executed["launches"], plan.leaves().len());
    assert!(lines.iter().all(|line| line["operation_id"].is_string()));

    let log = TestLogEntry::new(
        "trace_ledger::compile_and_execute",
        "gfft-core",
        format!("{} trace records", lines.len()),
    )
    .with_mode(RuntimeMode::Strict)
    .with_result(TestResult::Pass);
    assert!(log.to_json_line().contains("\"result\":\"pass\""));
    log.emit();
}
