// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Direct vs queued mutations
//! - Queue depth and dead letters
//! - Connectivity transitions and probe latency
//! - Drain passes
//! - Table cache hits
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `offline_sync_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration, size)
//!
//! No recorder is installed by this crate; the host application decides
//! whether (and where) these are exported.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record a remote call made by the executor.
pub fn record_remote_call(table: &str, kind: &str, status: &str, duration: Duration) {
    counter!(
        "offline_sync_remote_calls_total",
        "table" => table.to_string(),
        "kind" => kind.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("offline_sync_remote_call_duration_seconds", "kind" => kind.to_string())
        .record(duration.as_secs_f64());
}

/// Record how `execute_operation` resolved: `applied`, `queued` or `rejected`.
pub fn record_operation_outcome(table: &str, outcome: &str) {
    counter!(
        "offline_sync_operations_total",
        "table" => table.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record an operation appended to the local queue.
pub fn record_enqueue(table: &str, kind: &str) {
    counter!(
        "offline_sync_queue_enqueued_total",
        "table" => table.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Set number of entries awaiting replay.
pub fn set_pending_count(count: u64) {
    gauge!("offline_sync_queue_pending").set(count as f64);
}

/// Record a queue entry moved to dead letters.
pub fn record_abandoned(table: &str, reason: &str) {
    counter!(
        "offline_sync_queue_abandoned_total",
        "table" => table.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record SQLite busy retries in the local store.
pub fn store_retries_total(operation: &str) {
    counter!("offline_sync_store_retries_total", "operation" => operation.to_string()).increment(1);
}

/// Record a cache snapshot write.
pub fn record_cache_write(table: &str, rows: usize) {
    counter!("offline_sync_cache_writes_total", "table" => table.to_string()).increment(1);
    histogram!("offline_sync_cache_rows", "table" => table.to_string()).record(rows as f64);
}

/// Record a cache read.
pub fn record_cache_read(table: &str, hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!(
        "offline_sync_cache_reads_total",
        "table" => table.to_string(),
        "result" => result
    )
    .increment(1);
}

/// Set current connectivity (1 = online, 0 = offline).
pub fn set_online(online: bool) {
    gauge!("offline_sync_online").set(if online { 1.0 } else { 0.0 });
}

/// Record a connectivity transition.
pub fn record_connectivity_transition(online: bool) {
    let to = if online { "online" } else { "offline" };
    counter!("offline_sync_connectivity_transitions_total", "to" => to).increment(1);
    set_online(online);
}

/// Record a reachability probe.
pub fn record_probe(reachable: bool, duration: Duration) {
    let result = if reachable { "reachable" } else { "unreachable" };
    counter!("offline_sync_probes_total", "result" => result).increment(1);
    histogram!("offline_sync_probe_duration_seconds").record(duration.as_secs_f64());
}

/// Record a trigger delivered to the coordinator.
pub fn record_trigger(trigger: &str) {
    counter!("offline_sync_triggers_total", "trigger" => trigger.to_string()).increment(1);
}

/// Record a drain request that did not run (`already_running` or `offline`).
pub fn record_drain_skipped(reason: &str) {
    counter!("offline_sync_drains_skipped_total", "reason" => reason.to_string()).increment(1);
}

/// Record a completed drain pass.
pub fn record_drain(
    applied: usize,
    failed: usize,
    abandoned: usize,
    interrupted: bool,
    duration: Duration,
) {
    let status = if interrupted { "interrupted" } else { "completed" };
    counter!("offline_sync_drains_total", "status" => status).increment(1);
    counter!("offline_sync_drain_applied_total").increment(applied as u64);
    if failed > 0 {
        counter!("offline_sync_drain_failed_total").increment(failed as u64);
    }
    if abandoned > 0 {
        counter!("offline_sync_drain_abandoned_total").increment(abandoned as u64);
    }
    histogram!("offline_sync_drain_duration_seconds").record(duration.as_secs_f64());
}

/// Set engine lifecycle state.
pub fn set_engine_state(state: &str) {
    let value = match state {
        "Created" => 0.0,
        "Running" => 1.0,
        "ShuttingDown" => 2.0,
        "Stopped" => 3.0,
        _ => -1.0,
    };
    gauge!("offline_sync_engine_state").set(value);
}

/// Record a payment reminder fired.
pub fn record_reminder_fired(days_before: u32) {
    counter!("offline_sync_reminders_fired_total", "days_before" => days_before.to_string())
        .increment(1);
}
