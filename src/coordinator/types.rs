// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Coordinator state and report types.
//!
//! # Lifecycle
//!
//! ```text
//!           start()                shutdown()
//! Created ───────────→ Running ───────────────→ ShuttingDown ──→ Stopped
//!    │                                                              ↑
//!    └──────────────────────── shutdown() ──────────────────────────┘
//! ```
//!
//! - **Created**: after `SyncCoordinator::new()`. Direct calls
//!   (`execute_operation`, `sync_pending_operations`) already work; no
//!   background loop is running.
//! - **Running**: `start()` spawned the event loop (poll timer + triggers).
//! - **ShuttingDown**: loop is stopping, in-flight drain finishing its entry.
//! - **Stopped**: store closed. Every call fails with `SyncError::Shutdown`.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle state of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Created,
    Running,
    ShuttingDown,
    Stopped,
}

impl EngineState {
    /// Whether the store is still usable.
    pub fn accepts_work(&self) -> bool {
        matches!(self, EngineState::Created | EngineState::Running)
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Created => write!(f, "Created"),
            EngineState::Running => write!(f, "Running"),
            EngineState::ShuttingDown => write!(f, "ShuttingDown"),
            EngineState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// What the UI shows: connectivity, drain activity, backlog.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub is_online: bool,
    pub is_syncing: bool,
    /// Entries awaiting replay, refreshed after every queue mutation.
    pub pending_count: u64,
    /// End of the most recently completed drain pass.
    pub last_sync_time: Option<DateTime<Utc>>,
}

/// Counts from one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Confirmed by the backend and removed.
    pub applied: usize,
    /// Domain failures (retry counter bumped).
    pub failed: usize,
    /// Moved to dead letters during this pass.
    pub abandoned: usize,
    /// Stopped early on connectivity loss or shutdown.
    pub interrupted: bool,
    /// Entries still queued after the pass.
    pub remaining: u64,
}

/// Result of asking for a drain pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Another pass holds the single-flight flag; nothing was done.
    AlreadyRunning,
    /// Believed offline; nothing was done.
    Offline,
    Completed(DrainReport),
}

impl DrainOutcome {
    pub fn report(&self) -> Option<&DrainReport> {
        match self {
            DrainOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }

    pub fn ran(&self) -> bool {
        matches!(self, DrainOutcome::Completed(_))
    }
}
