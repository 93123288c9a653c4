// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Shared test utilities for integration and chaos tests.
//!
//! This module provides:
//! - Scripted MockRemote recording every call
//! - Coordinator construction over a temp-dir SQLite store
//! - Polling helper for asynchronous conditions
//! - Loopback HTTP server for the real REST client

#![allow(dead_code)]

pub mod http_stub;
pub mod mock_remote;

pub use http_stub::serve_fixed;
pub use mock_remote::*;

use offline_sync_engine::{
    NetworkFlag, SharedSession, StoreConfig, SyncConfig, SyncCoordinator,
};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const TEST_USER: &str = "user-1";

/// Millisecond-scale config writing to `dir/queue.db`.
pub fn test_config(dir: &Path) -> SyncConfig {
    let mut config = SyncConfig::for_testing();
    config.store = StoreConfig::at(dir.join("queue.db").to_string_lossy().to_string());
    config
}

/// Everything a coordinator test needs to poke at.
pub struct Harness {
    pub coordinator: SyncCoordinator,
    pub remote: Arc<MockRemote>,
    pub network: NetworkFlag,
    pub session: SharedSession,
}

pub async fn harness_with(config: SyncConfig, remote: Arc<MockRemote>, online: bool) -> Harness {
    let network = NetworkFlag::new(online);
    let session = SharedSession::signed_in(TEST_USER);
    let coordinator = SyncCoordinator::new(
        config,
        remote.clone(),
        Arc::new(session.clone()),
        Arc::new(network.clone()),
    )
    .await
    .expect("coordinator should open");

    Harness {
        coordinator,
        remote,
        network,
        session,
    }
}

pub async fn harness(dir: &Path, online: bool) -> Harness {
    harness_with(test_config(dir), Arc::new(MockRemote::new()), online).await
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
