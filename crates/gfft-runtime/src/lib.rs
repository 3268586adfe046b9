#![forbid(unsafe_code)]

//! gfft runtime: operating mode, structured trace ledger, and the shared
//! assertion/logging helpers used by every crate's tests.
//!
//! ## Module layout
//!
//! | Module  | Contents                                                  |
//! |---------|-----------------------------------------------------------|
//! | `mode`  | [`RuntimeMode`] enum (Strict / Hardened)                  |
//! | `trace` | [`TraceEvent`], [`TraceLedger`], shared JSON-line trace log |

pub mod mode;
pub mod trace;

// ── Re-exports: preserve the flat public API ────────────────────────
pub use mode::RuntimeMode;
pub use trace::{
    DEFAULT_TRACE_CAPACITY, TraceEvent, TraceLedger, TraceOutcome, TraceRecord, next_operation_id,
    record_trace, record_trace_with_id, take_traces,
};

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Wall-clock milliseconds since the Unix epoch (0 if the clock is before it).
#[must_use]
pub fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

// ═══════════════════════════════════════════════════════════════════
// Test Helpers: shared assertion and logging utilities
// ═══════════════════════════════════════════════════════════════════

/// One JSON line per checked case, written to stderr by the test suites so a
/// failing run can be compared against a passing one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestLogEntry {
    pub test_id: String,
    pub timestamp_ms: u64,
    pub module: String,
    /// What was checked, e.g. the transform kind and lengths.
    pub case: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<RuntimeMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TestResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_abs_error: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestResult {
    Pass,
    Fail,
}

impl TestResult {
    #[must_use]
    pub const fn from_pass(pass: bool) -> Self {
        if pass { Self::Pass } else { Self::Fail }
    }
}

impl TestLogEntry {
    #[must_use]
    pub fn new(
        test_id: impl Into<String>,
        module: impl Into<String>,
        case: impl Into<String>,
    ) -> Self {
        Self {
            test_id: test_id.into(),
            timestamp_ms: now_unix_ms(),
            module: module.into(),
            case: case.into(),
            seed: None,
            mode: None,
            result: None,
            max_abs_error: None,
        }
    }

    #[must_use]
    pub fn with_result(mut self, result: TestResult) -> Self {
        self.result = Some(result);
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: RuntimeMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Record the observed error and mark the case passed when it is
    /// within `tolerance`.
    #[must_use]
    pub fn with_error_bound(mut self, max_abs_error: f64, tolerance: f64) -> Self {
        self.max_abs_error = Some(max_abs_error);
        self.result = Some(TestResult::from_pass(max_abs_error <= tolerance));
        self
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.result == Some(TestResult::Pass)
    }

    #[must_use]
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }

    /// Write the JSON line to stderr.
    pub fn emit(&self) {
        eprintln!("{}", self.to_json_line());
    }
}

/// `|actual - expected| <= atol + rtol * |expected|`.
pub fn assert_close(actual: f64, expected: f64, atol: f64, rtol: f64) {
    let tol = atol + rtol * expected.abs();
    assert!(
        (actual - expected).abs() <= tol,
        "assert_close failed: actual={actual} expected={expected} diff={} tol={tol}",
        (actual - expected).abs()
    );
}

/// Element-wise [`assert_close`] over two equally long slices.
pub fn assert_close_slice(actual: &[f64], expected: &[f64], atol: f64, rtol: f64) {
    assert_eq!(actual.len(), expected.len(), "assert_close_slice: length mismatch");
    for (idx, (a, e)) in actual.iter().zip(expected).enumerate() {
        let tol = atol + rtol * e.abs();
        assert!(
            (a - e).abs() <= tol,
            "assert_close_slice[{idx}]: actual={a} expected={e} tol={tol}"
        );
    }
}

/// Largest absolute element-wise difference; `f64::INFINITY` on length mismatch.
#[must_use]
pub fn max_abs_diff(actual: &[f64], expected: &[f64]) -> f64 {
    if actual.len() != expected.len() {
        return f64::INFINITY;
    }
    actual
        .iter()
        .zip(expected)
        .map(|(a, e)| (a - e).abs())
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_is_the_default_mode() {
        assert_eq!(RuntimeMode::default(), RuntimeMode::Strict);
        assert!(!RuntimeMode::Strict.checks_finite_input());
        assert!(RuntimeMode::Hardened.checks_finite_input());
    }

    #[test]
    fn assert_close_accepts_within_atol() {
        assert_close(1.0 + 1e-13, 1.0, 1e-12, 0.0);
    }

    #[test]
    #[should_panic(expected = "assert_close failed")]
    fn assert_close_rejects_far_values() {
        assert_close(1.0, 2.0, 1e-12, 1e-12);
    }

    #[test]
    #[should_panic(expected = "length mismatch")]
    fn assert_close_slice_rejects_length_mismatch() {
        assert_close_slice(&[1.0, 2.0], &[1.0], 1e-12, 1e-12);
    }

    #[test]
    fn max_abs_diff_reports_largest_gap() {
        assert_eq!(max_abs_diff(&[1.0, 2.5], &[1.0, 2.0]), 0.5);
        assert!(max_abs_diff(&[1.0], &[]).is_infinite());
    }

    #[test]
    fn error_bound_decides_the_result() {
        let entry = TestLogEntry::new("roundtrip_8", "gfft_core", "c2c [8]")
            .with_seed(42)
            .with_mode(RuntimeMode::Strict)
            .with_error_bound(1e-7, 1e-6);
        assert!(entry.passed());
        let parsed: serde_json::Value =
            serde_json::from_str(&entry.to_json_line()).expect("valid JSON");
        assert_eq!(parsed["test_id"], "roundtrip_8");
        assert_eq!(parsed["result"], "pass");
        assert_eq!(parsed["seed"], 42);
        assert_eq!(parsed["mode"], "Strict");

        let failed =
            TestLogEntry::new("roundtrip_8", "gfft_core", "c2c [8]").with_error_bound(1e-3, 1e-6);
        assert!(!failed.passed());
    }

    #[test]
    fn log_entry_omits_unset_fields() {
        let entry = TestLogEntry::new("compile_17", "gfft_core", "bluestein selected");
        let parsed: serde_json::Value =
            serde_json::from_str(&entry.to_json_line()).expect("valid JSON");
        assert!(parsed.get("seed").is_none());
        assert!(parsed.get("mode").is_none());
        assert!(parsed.get("result").is_none());
        assert!(parsed.get("max_abs_error").is_none());
    }
}
