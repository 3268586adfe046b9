#![forbid(unsafe_code)]

//! Bounded FIFO trace ledger for planner and dispatch events.
//!
//! Every record serializes to one JSON line. The process-wide ledger is
//! shared by all library contexts; [`take_traces`] drains it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

use serde::{Deserialize, Serialize};

use crate::now_unix_ms;

/// Default number of records retained by the shared ledger.
pub const DEFAULT_TRACE_CAPACITY: usize = 4096;

/// Outcome attached to execution events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceOutcome {
    Completed,
    Rejected,
    Aborted,
}

/// Structured events emitted by the registry, selector, compiler and engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    RegistryPopulated {
        single_entries: usize,
        double_entries: usize,
    },
    IntegrityChecked {
        entries: usize,
        violations: Vec<String>,
    },
    SchemeSelected {
        length: usize,
        precision: String,
        scheme: String,
        reason: String,
    },
    PlanCompiled {
        plan_id: String,
        kind: String,
        precision: String,
        lengths: Vec<usize>,
        batch: usize,
        nodes: usize,
        leaves: usize,
        scratch_bytes: usize,
        cache_hit: bool,
    },
    PlanRejected {
        kind: String,
        lengths: Vec<usize>,
        error: String,
    },
    PlanExecuted {
        plan_id: String,
        stream: u64,
        launches: usize,
        timing_ns: u64,
        outcome: TraceOutcome,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// One ledger entry: a monotonic operation id, wall-clock stamp, and event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub operation_id: String,
    pub timestamp_ms: u64,
    #[serde(flatten)]
    pub event: TraceEvent,
}

impl TraceRecord {
    /// Serialize to a single JSON line.
    #[must_use]
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

/// Bounded FIFO trace buffer.
///
/// Capacity is enforced via `capacity.max(1)`. When full, the oldest
/// record is evicted before a new one is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceLedger {
    capacity: usize,
    entries: VecDeque<TraceRecord>,
}

impl TraceLedger {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    /// Append a record, evicting the oldest if at capacity.
    pub fn record(&mut self, entry: TraceRecord) {
        if self.entries.len() == self.capacity {
            let _ = self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&TraceRecord> {
        self.entries.back()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remove and return every retained record, oldest first.
    pub fn drain(&mut self) -> Vec<TraceRecord> {
        self.entries.drain(..).collect()
    }

    /// Serialize the retained records as JSON lines.
    #[must_use]
    pub fn serialize_jsonl(&self) -> String {
        self.entries
            .iter()
            .map(TraceRecord::to_json_line)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

static TRACE_LOG: OnceLock<Mutex<TraceLedger>> = OnceLock::new();
static OPERATION_COUNTER: AtomicU64 = AtomicU64::new(1);

fn trace_log() -> &'static Mutex<TraceLedger> {
    TRACE_LOG.get_or_init(|| Mutex::new(TraceLedger::new(DEFAULT_TRACE_CAPACITY)))
}

/// Next process-unique operation id, e.g. `gfft-op-000000000000002a`.
#[must_use]
pub fn next_operation_id() -> String {
    let next = OPERATION_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("gfft-op-{next:016x}")
}

/// Record an event in the shared ledger under a fresh operation id.
pub fn record_trace(event: TraceEvent) {
    record_trace_with_id(next_operation_id(), event);
}

/// Record an event under a caller-chosen operation id.
pub fn record_trace_with_id(operation_id: String, event: TraceEvent) {
    if let Ok(mut log) = trace_log().lock() {
        log.record(TraceRecord {
            operation_id,
            timestamp_ms: now_unix_ms(),
            event,
        });
    }
}

/// Drain the shared ledger.
#[must_use]
pub fn take_traces() -> Vec<TraceRecord> {
    trace_log().lock().map_or_else(|_| Vec::new(), |mut log| log.drain())
}
