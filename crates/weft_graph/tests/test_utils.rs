//! Shared test utilities for `weft_graph` integration tests.
//!
//! Import via `mod test_utils;` in test files.

#![allow(
    dead_code,
    missing_docs,
    reason = "shared test utilities, not all items used in every test binary"
)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use weft_graph::prelude::*;
use weft_graph::{ExecutionResult, RegistryBuilder};

pub const TIMEOUT: Duration = Duration::from_secs(5);

// ═══════════════════════════════════════════════════════════════════════════════
// VALUES
// ═══════════════════════════════════════════════════════════════════════════════

pub fn int(value: i64) -> Value {
    Value::new(value)
}

/// Extracts an `i64` from a successful execution.
pub fn int_of(result: &ExecutionResult) -> i64 {
    result
        .as_ref()
        .expect("execution succeeds")
        .as_ref()
        .and_then(|value| value.downcast_ref::<i64>())
        .copied()
        .expect("execution produced an i64")
}

/// Sums the `i64` values of the dependency results under `name`.
pub fn sum_results(inputs: &Inputs, name: &str) -> i64 {
    inputs
        .results(name)
        .expect("dependency results")
        .values()
        .filter_map(|outcome| outcome.value()?.downcast_ref::<i64>().copied())
        .sum()
}

// ═══════════════════════════════════════════════════════════════════════════════
// CALL PROBES
// ═══════════════════════════════════════════════════════════════════════════════

/// Records every input set a main logic was called with.
#[derive(Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<Inputs>>>,
}

impl CallLog {
    pub fn record(&self, inputs: &Inputs) {
        self.calls.lock().expect("call log").push(inputs.clone());
    }

    pub fn count(&self) -> usize {
        self.calls.lock().expect("call log").len()
    }

    pub fn calls(&self) -> Vec<Inputs> {
        self.calls.lock().expect("call log").clone()
    }
}

/// A compute logic that records its calls in `log`.
pub fn probed<F>(logic_id: &str, log: &CallLog, f: F) -> MainLogicDefinition
where
    F: Fn(&Inputs) -> ValueOrError + Send + Sync + 'static,
{
    let log = log.clone();
    MainLogicDefinition::compute(logic_id, move |inputs| {
        log.record(inputs);
        f(inputs)
    })
}

/// Shared, ordered log of string events.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().expect("event log").push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().expect("event log").clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().expect("event log").len()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// GRAPH SETUP
// ═══════════════════════════════════════════════════════════════════════════════

pub fn graph_of(builder: RegistryBuilder) -> ExecutionGraph {
    ExecutionGraph::builder(builder.build().expect("valid registry")).build()
}

pub fn executor_of(graph: &ExecutionGraph) -> GraphExecutor {
    graph
        .create_executor(ExecutorConfig::new("req"))
        .expect("executor")
}

// ═══════════════════════════════════════════════════════════════════════════════
// ASYNC HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn resolve(future: ExecutionFuture) -> ExecutionResult {
    tokio::time::timeout(TIMEOUT, future)
        .await
        .expect("execution timed out")
}

/// Waits until `condition` holds, failing the test after [`TIMEOUT`].
pub async fn eventually(condition: impl Fn() -> bool) {
    let waited = tokio::time::timeout(TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not reached in time");
}
