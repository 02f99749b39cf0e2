//! Metrics emitted by the execution engine (`metrics` feature).
//!
//! The crate only records; installing a recorder/exporter is up to the application.

use metrics::{counter, histogram};

/// Count a terminal operation run, labelled by operation and execution mode.
pub(crate) fn record_terminal(operation: &'static str, parallelism: usize) {
    let mode = if parallelism > 1 { "parallel" } else { "sequential" };
    counter!("parastream_terminal_runs_total", "operation" => operation, "mode" => mode)
        .increment(1);
}

/// Count fan-out workers spawned by a terminal operation.
pub(crate) fn record_workers(operation: &'static str, workers: usize) {
    counter!("parastream_workers_spawned_total", "operation" => operation)
        .increment(workers as u64);
}

/// Count workers that ended with a panic or cancellation.
pub(crate) fn record_worker_failure(operation: &'static str) {
    counter!("parastream_worker_failures_total", "operation" => operation).increment(1);
}

/// Record the size of a buffer materialized by the sort stage.
pub(crate) fn record_sort(len: usize, parallel: bool) {
    let mode = if parallel { "parallel" } else { "sequential" };
    histogram!("parastream_sort_buffer_len", "mode" => mode).record(len as f64);
}
