// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Offline Sync Engine
//!
//! Keeps a finance app usable without a network: mutations are applied
//! directly when the backend is reachable and queued locally when it is not,
//! then replayed in order once connectivity is verified again.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                         offline-sync-engine                          │
//! │                                                                      │
//! │  FinanceStore ──► SyncCoordinator ──► OperationExecutor ──► Remote   │
//! │   (domain)         │        ▲          (timeout race)      Store     │
//! │                    │        │                                        │
//! │                    ▼        │ triggers                               │
//! │            ┌────────────┐  ┌─┴──────────────────┐                    │
//! │            │ LocalStore │  │ConnectivityMonitor │◄── OS events,     │
//! │            │ (SQLite)   │  │ (probe-then-set)   │    poll timer     │
//! │            └────────────┘  └────────────────────┘                    │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use offline_sync_engine::{
//!     NetworkFlag, Operation, RestRemote, SharedSession, SyncConfig, SyncCoordinator,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> offline_sync_engine::Result<()> {
//!     let config = SyncConfig::default();
//!     let remote = Arc::new(RestRemote::new(&config.remote)?);
//!     let session = SharedSession::signed_in("user-1");
//!     let network = NetworkFlag::new(true);
//!
//!     let engine = SyncCoordinator::new(
//!         config,
//!         remote,
//!         Arc::new(session),
//!         Arc::new(network.clone()),
//!     )
//!     .await?;
//!     let triggers = engine.start().await?;
//!
//!     let outcome = engine
//!         .execute_operation(Operation::insert("expenses", json!({ "amount": 100 })))
//!         .await?;
//!     println!("queued offline: {}", outcome.is_offline());
//!
//!     // Platform glue reports OS events
//!     network.set(false);
//!     triggers.network_lost()?;
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connectivity;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod finance;
pub mod metrics;
pub mod model;
pub mod reminders;
pub mod remote;
pub mod rest;
pub mod session;
pub mod store;

// Re-exports for convenience
pub use config::{
    ConnectivityConfig, DrainConfig, ExecutorConfig, RemoteConfig, StoreConfig, SyncConfig,
};
pub use connectivity::{ConnectivityMonitor, NetworkFlag, NetworkSignal, Transition, Trigger};
pub use coordinator::{
    DrainOutcome, DrainReport, EngineState, SyncCoordinator, SyncStatus, TriggerHandle,
};
pub use error::{Result, SyncError};
pub use executor::OperationExecutor;
pub use finance::{DataSource, FinanceData, FinanceSnapshot, FinanceStore};
pub use model::{
    CacheEntry, DeadLetter, EntryStatus, Mutation, Operation, OperationKind, OperationOutcome,
    QueueEntry,
};
pub use reminders::{Commitment, Reminder, ReminderScheduler};
pub use remote::{RemoteError, RemoteStore, SelectQuery};
pub use rest::RestRemote;
pub use session::{SessionProvider, SharedSession};
pub use store::LocalStore;
