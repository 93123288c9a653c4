// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync coordinator.
//!
//! The single facade domain code uses instead of talking to the backend:
//! - Mutations via [`SyncCoordinator::execute_operation`] (direct when
//!   online, queued when not)
//! - Queue replay via [`SyncCoordinator::sync_pending_operations`]
//! - Read fallback via the table cache
//! - Connectivity triggers via [`SyncCoordinator::handle_trigger`]
//!
//! # Architecture
//!
//! ```text
//! execute_operation(op)
//!     │ offline? ──yes──→ enqueue ──→ Queued { temp_id }
//!     │ no
//!     ↓
//! executor.perform(op) ──ok──→ Applied { data }
//!     │ network-shaped failure ──→ mark offline, enqueue ──→ Queued
//!     │ domain failure ──→ Err(Rejected) to caller, never queued
//!
//! trigger ──→ monitor.handle() ──CameOnline + pending > 0──→ drain pass
//! ```
//!
//! # Drain Passes
//!
//! At most one pass runs at a time (`is_syncing` single-flight flag; callers
//! that find it held return [`DrainOutcome::AlreadyRunning`] immediately).
//! Entries are replayed one by one in FIFO order. A network-shaped failure,
//! an OS offline flag or shutdown stops the pass and leaves the rest queued;
//! a domain failure bumps the entry's retry counter and moves on.

mod types;

pub use types::{DrainOutcome, DrainReport, EngineState, SyncStatus};

use crate::config::SyncConfig;
use crate::connectivity::{ConnectivityMonitor, NetworkSignal, Transition, Trigger};
use crate::error::{Result, SyncError};
use crate::executor::OperationExecutor;
use crate::metrics;
use crate::model::{CacheEntry, DeadLetter, EntryStatus, Operation, OperationOutcome, QueueEntry};
use crate::remote::RemoteStore;
use crate::session::SessionProvider;
use crate::store::LocalStore;
use chrono::Utc;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, debug_span, error, info, info_span, warn, Instrument};

/// How long `shutdown()` waits for the event loop and an in-flight drain.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Cloneable sender platform glue uses to report OS and app events.
#[derive(Debug, Clone)]
pub struct TriggerHandle {
    tx: mpsc::UnboundedSender<Trigger>,
}

impl TriggerHandle {
    /// Deliver a trigger to the running coordinator. Non-blocking.
    pub fn notify(&self, trigger: Trigger) -> Result<()> {
        self.tx.send(trigger).map_err(|_| SyncError::Shutdown)
    }

    pub fn network_lost(&self) -> Result<()> {
        self.notify(Trigger::NetworkLost)
    }

    pub fn network_available(&self) -> Result<()> {
        self.notify(Trigger::NetworkAvailable)
    }

    pub fn foregrounded(&self) -> Result<()> {
        self.notify(Trigger::Foregrounded)
    }
}

struct Shared {
    config: SyncConfig,
    store: LocalStore,
    executor: OperationExecutor,
    monitor: ConnectivityMonitor,
    /// Single-flight flag for drain passes.
    syncing: AtomicBool,
    status_tx: watch::Sender<SyncStatus>,
    state_tx: watch::Sender<EngineState>,
    shutdown_tx: watch::Sender<bool>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
    /// Serializes count-then-publish so a stale read never lands last.
    count_lock: Mutex<()>,
}

/// Clears the single-flight flag when a drain pass ends, however it ends.
struct SyncingGuard<'a> {
    shared: &'a Shared,
}

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.shared.syncing.store(false, Ordering::Release);
        self.shared.status_tx.send_modify(|s| s.is_syncing = false);
    }
}

/// The offline-first sync engine.
///
/// Cheap to clone; clones share one store, one monitor and one drain flag.
#[derive(Clone)]
pub struct SyncCoordinator {
    shared: Arc<Shared>,
}

impl SyncCoordinator {
    /// Open the local store and wire up the collaborators.
    ///
    /// The coordinator starts in `Created` state with the believed
    /// connectivity mirroring the OS flag. Call [`start()`](Self::start) to
    /// run the poll timer and accept triggers.
    pub async fn new(
        config: SyncConfig,
        remote: Arc<dyn RemoteStore>,
        session: Arc<dyn SessionProvider>,
        signal: Arc<dyn NetworkSignal>,
    ) -> Result<Self> {
        config.validate()?;

        let store = LocalStore::open(&config.store).await?;
        let executor = OperationExecutor::new(
            Arc::clone(&remote),
            session,
            config.executor.operation_timeout_duration(),
        );
        let monitor = ConnectivityMonitor::new(remote, signal, config.connectivity.clone());

        let pending_count = store.count_pending().await?;
        let (status_tx, _) = watch::channel(SyncStatus {
            is_online: monitor.is_online(),
            is_syncing: false,
            pending_count,
            last_sync_time: None,
        });
        let (state_tx, _) = watch::channel(EngineState::Created);
        let (shutdown_tx, _) = watch::channel(false);
        metrics::set_engine_state("Created");

        info!(
            path = %store.path(),
            pending = pending_count,
            online = monitor.is_online(),
            "Sync coordinator created"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                store,
                executor,
                monitor,
                syncing: AtomicBool::new(false),
                status_tx,
                state_tx,
                shutdown_tx,
                loop_handle: Mutex::new(None),
                count_lock: Mutex::new(()),
            }),
        })
    }

    // =========================================================================
    // State
    // =========================================================================

    pub fn state(&self) -> EngineState {
        *self.shared.state_tx.borrow()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state(), EngineState::Running)
    }

    pub fn is_online(&self) -> bool {
        self.shared.monitor.is_online()
    }

    pub fn is_syncing(&self) -> bool {
        self.shared.syncing.load(Ordering::Acquire)
    }

    /// Current status snapshot.
    pub fn status(&self) -> SyncStatus {
        self.shared.status_tx.borrow().clone()
    }

    /// Watch status changes.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.shared.status_tx.subscribe()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }

    fn ensure_accepting(&self) -> Result<()> {
        if self.state().accepts_work() {
            Ok(())
        } else {
            Err(SyncError::Shutdown)
        }
    }

    fn publish_online(&self) {
        let online = self.shared.monitor.is_online();
        self.shared.status_tx.send_if_modified(|s| {
            if s.is_online == online {
                false
            } else {
                s.is_online = online;
                true
            }
        });
    }

    fn mark_offline(&self) {
        self.shared.monitor.mark_offline();
        self.publish_online();
    }

    /// Re-read the backlog size into the status and metrics.
    pub async fn refresh_pending_count(&self) -> Result<u64> {
        let _serialized = self.shared.count_lock.lock().await;
        let count = self.shared.store.count_pending().await?;
        self.shared
            .status_tx
            .send_if_modified(|s| {
                if s.pending_count == count {
                    false
                } else {
                    s.pending_count = count;
                    true
                }
            });
        metrics::set_pending_count(count);
        Ok(count)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Apply `operation` against the backend, or queue it when that is not
    /// possible.
    ///
    /// Network-shaped failures never reach the caller: the operation is
    /// queued and the coordinator goes offline. Domain rejections are
    /// returned as errors and are not queued.
    pub async fn execute_operation(&self, operation: Operation) -> Result<OperationOutcome> {
        self.ensure_accepting()?;

        let os_online = self.shared.monitor.os_online();
        if !os_online && self.is_online() {
            self.mark_offline();
        }
        if !self.is_online() {
            debug!(op = %operation.describe(), "Offline, queueing operation");
            return self.enqueue(operation).await;
        }

        match self.shared.executor.perform(&operation).await {
            Ok(data) => {
                metrics::record_operation_outcome(&operation.table, "applied");
                Ok(OperationOutcome::Applied { data })
            }
            Err(e) if e.is_network() || !self.shared.monitor.os_online() => {
                warn!(op = %operation.describe(), error = %e, "Remote unreachable, queueing operation");
                self.mark_offline();
                self.enqueue(operation).await
            }
            Err(e) => {
                metrics::record_operation_outcome(&operation.table, "rejected");
                debug!(op = %operation.describe(), error = %e, "Operation rejected");
                Err(e)
            }
        }
    }

    async fn enqueue(&self, operation: Operation) -> Result<OperationOutcome> {
        let entry = self.shared.store.enqueue(&operation).await?;
        self.refresh_pending_count().await?;
        metrics::record_operation_outcome(&operation.table, "queued");

        Ok(OperationOutcome::Queued {
            temp_id: format!("temp_{}_{}", Utc::now().timestamp_millis(), entry.id),
        })
    }

    /// Entries awaiting replay, oldest first.
    pub async fn pending_operations(&self) -> Result<Vec<QueueEntry>> {
        self.ensure_accepting()?;
        self.shared.store.list_pending().await
    }

    /// Entries abandoned after exhausting their retry budget.
    pub async fn abandoned_operations(&self) -> Result<Vec<DeadLetter>> {
        self.ensure_accepting()?;
        self.shared.store.dead_letters().await
    }

    /// Forget abandoned entries. Returns how many were removed.
    pub async fn clear_abandoned_operations(&self) -> Result<u64> {
        self.ensure_accepting()?;
        let cleared = self.shared.store.clear_dead_letters().await?;
        info!(cleared, "Cleared abandoned operations");
        Ok(cleared)
    }

    // =========================================================================
    // Drain
    // =========================================================================

    /// Replay the queue against the backend.
    ///
    /// No-op when another pass is running or when offline.
    pub async fn sync_pending_operations(&self) -> Result<DrainOutcome> {
        self.ensure_accepting()?;

        if self
            .shared
            .syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Drain already in progress, skipping");
            metrics::record_drain_skipped("already_running");
            return Ok(DrainOutcome::AlreadyRunning);
        }
        let _guard = SyncingGuard {
            shared: &self.shared,
        };

        if !self.is_online() {
            debug!("Offline, drain skipped");
            metrics::record_drain_skipped("offline");
            return Ok(DrainOutcome::Offline);
        }

        self.shared.status_tx.send_modify(|s| s.is_syncing = true);

        let report = self.drain_pass().instrument(info_span!("drain_pass")).await?;
        Ok(DrainOutcome::Completed(report))
    }

    async fn drain_pass(&self) -> Result<DrainReport> {
        let start = Instant::now();
        let shared = &self.shared;
        let max_retries = shared.config.drain.max_retries;
        let pause = shared.config.drain.pause_duration();
        let shutdown_rx = shared.shutdown_tx.subscribe();

        let entries = shared.store.list_pending().await?;
        info!(pending = entries.len(), "Starting drain pass");

        let mut report = DrainReport::default();
        let total = entries.len();

        for (index, entry) in entries.into_iter().enumerate() {
            if *shutdown_rx.borrow() {
                info!("Shutdown requested, stopping drain");
                report.interrupted = true;
                break;
            }
            if !shared.monitor.os_online() {
                warn!(remaining = total - index, "Connection lost during drain");
                self.mark_offline();
                report.interrupted = true;
                break;
            }

            let op = entry.operation.describe();
            match shared.executor.perform(&entry.operation).await {
                Ok(_) => {
                    shared.store.remove(entry.id).await?;
                    self.refresh_pending_count().await?;
                    report.applied += 1;
                    debug!(id = entry.id, op = %op, "Replayed queued operation");

                    if index + 1 < total && !pause.is_zero() {
                        tokio::time::sleep(pause).await;
                    }
                }
                Err(e) if e.is_network() => {
                    warn!(id = entry.id, op = %op, error = %e, "Network failure, stopping drain");
                    self.mark_offline();
                    report.interrupted = true;
                    break;
                }
                Err(e) if e.is_permanent() => {
                    self.abandon(&entry, &e.to_string(), "invalid_operation").await?;
                    report.abandoned += 1;
                }
                Err(e) => {
                    report.failed += 1;
                    let message = e.to_string();
                    let retries = shared
                        .store
                        .mark_status(entry.id, EntryStatus::Error, Some(&message))
                        .await?;

                    match retries {
                        Some(retries) if retries >= max_retries => {
                            self.abandon(&entry, &message, "retry_budget").await?;
                            report.abandoned += 1;
                        }
                        Some(retries) => {
                            warn!(id = entry.id, op = %op, retries, max_retries, error = %e, "Replay failed, will retry");
                        }
                        None => debug!(id = entry.id, "Entry vanished during replay"),
                    }
                }
            }
        }

        report.remaining = self.refresh_pending_count().await?;
        shared
            .status_tx
            .send_modify(|s| s.last_sync_time = Some(Utc::now()));

        metrics::record_drain(
            report.applied,
            report.failed,
            report.abandoned,
            report.interrupted,
            start.elapsed(),
        );
        info!(
            applied = report.applied,
            failed = report.failed,
            abandoned = report.abandoned,
            interrupted = report.interrupted,
            remaining = report.remaining,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Drain pass finished"
        );

        Ok(report)
    }

    async fn abandon(&self, entry: &QueueEntry, reason: &str, label: &str) -> Result<()> {
        if self.shared.store.abandon(entry.id, reason).await? {
            warn!(
                id = entry.id,
                op = %entry.operation.describe(),
                retries = entry.retries,
                reason,
                "Operation abandoned, moved to dead letters"
            );
            metrics::record_abandoned(&entry.operation.table, label);
        }
        self.refresh_pending_count().await?;
        Ok(())
    }

    /// Run a drain pass now if online. Returns whether a pass was requested.
    pub async fn force_sync_now(&self) -> Result<bool> {
        if !self.is_online() {
            return Ok(false);
        }
        self.sync_pending_operations().await?;
        Ok(true)
    }

    // =========================================================================
    // Cache
    // =========================================================================

    /// Remember the last successful load of `table`.
    pub async fn cache_table_data(&self, table: &str, rows: &[Value]) -> Result<()> {
        self.ensure_accepting()?;
        self.shared.store.cache_put(table, rows).await
    }

    /// Last snapshot of `table`, for when the remote load fails.
    pub async fn get_cached_table_data(&self, table: &str) -> Result<Option<CacheEntry>> {
        self.ensure_accepting()?;
        self.shared.store.cache_get(table).await
    }

    // =========================================================================
    // Triggers and lifecycle
    // =========================================================================

    /// Feed a trigger to the connectivity monitor; drain on OFFLINE→ONLINE
    /// with a backlog.
    pub async fn handle_trigger(&self, trigger: Trigger) -> Result<Option<Transition>> {
        self.ensure_accepting()?;
        metrics::record_trigger(trigger.as_str());

        let transition = self
            .shared
            .monitor
            .handle(trigger)
            .instrument(debug_span!("connectivity_check", trigger = trigger.as_str()))
            .await;
        self.publish_online();

        if transition == Some(Transition::CameOnline) {
            let pending = self.refresh_pending_count().await?;
            if pending > 0 {
                info!(pending, trigger = trigger.as_str(), "Back online, draining queue");
                self.sync_pending_operations().await?;
            }
        }
        Ok(transition)
    }

    /// Spawn the event loop: poll timer plus trigger channel.
    ///
    /// Must be called exactly once.
    pub async fn start(&self) -> Result<TriggerHandle> {
        let mut actual = EngineState::Created;
        let started = self.shared.state_tx.send_if_modified(|state| {
            if *state == EngineState::Created {
                *state = EngineState::Running;
                true
            } else {
                actual = *state;
                false
            }
        });
        if !started {
            return Err(SyncError::InvalidState {
                expected: "Created".to_string(),
                actual: actual.to_string(),
            });
        }
        metrics::set_engine_state("Running");

        let (tx, rx) = mpsc::unbounded_channel();
        let poll_interval = self.shared.config.connectivity.poll_interval_duration();
        let handle = tokio::spawn(run_event_loop(self.clone(), rx, poll_interval));
        *self.shared.loop_handle.lock().await = Some(handle);

        info!(
            poll_interval_ms = poll_interval.as_millis() as u64,
            "Sync coordinator running"
        );
        Ok(TriggerHandle { tx })
    }

    /// Stop the event loop, let an in-flight drain finish its current entry,
    /// then checkpoint and close the store.
    pub async fn shutdown(&self) {
        let mut already = false;
        self.shared.state_tx.send_if_modified(|state| {
            if state.accepts_work() {
                *state = EngineState::ShuttingDown;
                true
            } else {
                already = true;
                false
            }
        });
        if already {
            debug!("Shutdown already in progress");
            return;
        }
        info!("Shutting down sync coordinator");
        metrics::set_engine_state("ShuttingDown");

        let _ = self.shared.shutdown_tx.send(true);

        let handle = self.shared.loop_handle.lock().await.take();
        if let Some(handle) = handle {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(())) => debug!("Event loop stopped"),
                Ok(Err(e)) => warn!(error = %e, "Event loop panicked"),
                Err(_) => warn!("Event loop did not stop in time"),
            }
        }

        let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
        while self.is_syncing() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        if self.is_syncing() {
            warn!("Drain still running at shutdown");
        }

        self.shared.store.close().await;

        let _ = self.shared.state_tx.send(EngineState::Stopped);
        metrics::set_engine_state("Stopped");
        info!("Sync coordinator stopped");
    }
}

/// Each trigger is handled on its own task so a slow settle delay never
/// blocks the next event; they meet again at the drain flag.
async fn run_event_loop(
    coordinator: SyncCoordinator,
    mut triggers: mpsc::UnboundedReceiver<Trigger>,
    poll_interval: Duration,
) {
    let mut shutdown_rx = coordinator.shared.shutdown_tx.subscribe();
    let mut timer = tokio::time::interval(poll_interval);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // First tick completes immediately
    timer.tick().await;

    let mut handlers = JoinSet::new();
    let mut triggers_open = true;

    let spawn_handler = |handlers: &mut JoinSet<()>, trigger: Trigger| {
        let coordinator = coordinator.clone();
        handlers.spawn(async move {
            if let Err(e) = coordinator.handle_trigger(trigger).await {
                warn!(trigger = trigger.as_str(), error = %e, "Trigger handling failed");
            }
        });
    };

    loop {
        tokio::select! {
            _ = timer.tick() => {
                spawn_handler(&mut handlers, Trigger::PollTick);
            }
            received = triggers.recv(), if triggers_open => {
                match received {
                    Some(trigger) => spawn_handler(&mut handlers, trigger),
                    None => {
                        // Polling continues; only shutdown stops the loop.
                        debug!("All trigger handles dropped");
                        triggers_open = false;
                    }
                }
            }
            Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                if let Err(e) = joined {
                    error!(error = %e, "Trigger handler panicked");
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    // A handler inside a drain stops at its next entry via the shutdown flag.
    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        while handlers.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(remaining = handlers.len(), "Aborting trigger handlers at shutdown");
        handlers.abort_all();
    }
    debug!("Event loop stopping");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::NetworkFlag;
    use crate::remote::{RemoteFuture, SelectQuery};
    use crate::session::SharedSession;
    use serde_json::json;

    struct AcceptAll;

    impl RemoteStore for AcceptAll {
        fn select(&self, _query: SelectQuery) -> RemoteFuture<'_, Vec<Value>> {
            Box::pin(async { Ok(vec![]) })
        }

        fn insert<'a>(&'a self, _table: &'a str, row: Value) -> RemoteFuture<'a, Value> {
            Box::pin(async move { Ok(row) })
        }

        fn update<'a>(&'a self, _table: &'a str, _id: &'a str, patch: Value) -> RemoteFuture<'a, Value> {
            Box::pin(async move { Ok(patch) })
        }

        fn delete<'a>(&'a self, _table: &'a str, _id: &'a str) -> RemoteFuture<'a, ()> {
            Box::pin(async { Ok(()) })
        }
    }

    async fn coordinator(flag: &NetworkFlag) -> SyncCoordinator {
        SyncCoordinator::new(
            SyncConfig::for_testing(),
            Arc::new(AcceptAll),
            Arc::new(SharedSession::signed_in("u-1")),
            Arc::new(flag.clone()),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_initial_state() {
        let flag = NetworkFlag::new(true);
        let c = coordinator(&flag).await;

        assert_eq!(c.state(), EngineState::Created);
        assert!(!c.is_running());
        assert!(c.is_online());
        assert_eq!(c.status().pending_count, 0);
        assert!(c.status().last_sync_time.is_none());
    }

    #[tokio::test]
    async fn test_start_twice_is_invalid_state() {
        let flag = NetworkFlag::new(true);
        let c = coordinator(&flag).await;

        let _handle = c.start().await.unwrap();
        assert!(c.is_running());

        match c.start().await {
            Err(SyncError::InvalidState { expected, actual }) => {
                assert_eq!(expected, "Created");
                assert_eq!(actual, "Running");
            }
            other => panic!("Expected InvalidState error, got {:?}", other.map(|_| ())),
        }

        c.shutdown().await;
        assert_eq!(c.state(), EngineState::Stopped);
    }

    #[tokio::test]
    async fn test_shutdown_from_created() {
        let flag = NetworkFlag::new(true);
        let c = coordinator(&flag).await;

        c.shutdown().await;
        assert_eq!(c.state(), EngineState::Stopped);

        // Second shutdown is a no-op
        c.shutdown().await;
        assert_eq!(c.state(), EngineState::Stopped);
    }

    #[tokio::test]
    async fn test_calls_after_shutdown_fail() {
        let flag = NetworkFlag::new(true);
        let c = coordinator(&flag).await;
        c.shutdown().await;

        let result = c
            .execute_operation(Operation::insert("expenses", json!({})))
            .await;
        assert!(matches!(result, Err(SyncError::Shutdown)));
        assert!(matches!(c.sync_pending_operations().await, Err(SyncError::Shutdown)));
    }

    #[tokio::test]
    async fn test_trigger_handle_closed_after_shutdown() {
        let flag = NetworkFlag::new(true);
        let c = coordinator(&flag).await;
        let handle = c.start().await.unwrap();
        c.shutdown().await;

        assert!(matches!(handle.network_lost(), Err(SyncError::Shutdown)));
    }

    #[tokio::test]
    async fn test_os_offline_short_circuits() {
        let flag = NetworkFlag::new(true);
        let c = coordinator(&flag).await;

        flag.set(false);
        let outcome = c
            .execute_operation(Operation::insert("expenses", json!({ "amount": 5 })))
            .await
            .unwrap();
        assert!(outcome.is_offline());
        assert!(!c.is_online());
        assert_eq!(c.status().pending_count, 1);
    }

    #[tokio::test]
    async fn test_empty_drain_stamps_last_sync() {
        let flag = NetworkFlag::new(true);
        let c = coordinator(&flag).await;

        let outcome = c.sync_pending_operations().await.unwrap();
        assert_eq!(outcome, DrainOutcome::Completed(DrainReport::default()));
        assert!(c.status().last_sync_time.is_some());
        assert!(!c.is_syncing());
    }

    #[tokio::test]
    async fn test_zero_poll_interval_rejected_at_construction() {
        let mut config = SyncConfig::for_testing();
        config.connectivity.poll_interval = "0s".to_string();
        let result = SyncCoordinator::new(
            config,
            Arc::new(AcceptAll),
            Arc::new(SharedSession::signed_in("u-1")),
            Arc::new(NetworkFlag::new(true)),
        )
        .await;
        assert!(matches!(result, Err(SyncError::Config(_))));
    }

    #[tokio::test]
    async fn test_concurrent_enqueues_publish_final_count() {
        let flag = NetworkFlag::new(false);
        let c = coordinator(&flag).await;

        let mut writers = Vec::new();
        for i in 0..16 {
            let c = c.clone();
            writers.push(tokio::spawn(async move {
                c.execute_operation(Operation::insert("expenses", json!({ "amount": i })))
                    .await
            }));
        }
        for writer in writers {
            assert!(writer.await.unwrap().unwrap().is_offline());
        }

        assert_eq!(c.status().pending_count, 16);
        assert_eq!(c.refresh_pending_count().await.unwrap(), 16);
    }

    #[tokio::test]
    async fn test_force_sync_offline_returns_false() {
        let flag = NetworkFlag::new(false);
        let c = coordinator(&flag).await;
        assert!(!c.force_sync_now().await.unwrap());
        assert_eq!(c.sync_pending_operations().await.unwrap(), DrainOutcome::Offline);
    }
}
