// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Connectivity monitor.
//!
//! Tracks whether the backend is reachable. The OS network flag is cheap but
//! optimistic, so it is trusted only for negative transitions; going online
//! always requires a verification probe against the backend.
//!
//! # State Transitions
//!
//! ```text
//!                  NetworkLost
//!   ONLINE ───────────────────────────→ OFFLINE
//!     ↑  ←─────────────────────────────   │
//!     │   probe passed (after settle)     │
//!     │                                   │ NetworkAvailable / Foregrounded
//!     │                                   │   settle delay, then probe
//!     └──── PollTick: probe, either way ──┘
//! ```
//!
//! Every trigger funnels through [`ConnectivityMonitor::verify`], the single
//! probe-then-set routine; concurrent checks race, last writer wins.

use crate::config::ConnectivityConfig;
use crate::metrics;
use crate::remote::{RemoteStore, SelectQuery};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// The OS-level "is there a network" flag.
pub trait NetworkSignal: Send + Sync + 'static {
    fn is_online(&self) -> bool;
}

/// Atomic [`NetworkSignal`] that platform glue keeps up to date.
#[derive(Debug, Clone)]
pub struct NetworkFlag(Arc<AtomicBool>);

impl NetworkFlag {
    pub fn new(online: bool) -> Self {
        Self(Arc::new(AtomicBool::new(online)))
    }

    pub fn set(&self, online: bool) {
        self.0.store(online, Ordering::SeqCst);
    }
}

impl Default for NetworkFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

impl NetworkSignal for NetworkFlag {
    fn is_online(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Events that may change the believed connectivity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// OS reported the network went away.
    NetworkLost,
    /// OS reported a network came back.
    NetworkAvailable,
    /// App returned to the foreground.
    Foregrounded,
    /// Periodic safety-net check.
    PollTick,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkLost => "network_lost",
            Self::NetworkAvailable => "network_available",
            Self::Foregrounded => "foregrounded",
            Self::PollTick => "poll_tick",
        }
    }
}

/// A change of believed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    CameOnline,
    WentOffline,
}

/// Owns the believed ONLINE/OFFLINE state.
pub struct ConnectivityMonitor {
    remote: Arc<dyn RemoteStore>,
    signal: Arc<dyn NetworkSignal>,
    config: ConnectivityConfig,
    state: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    /// The initial state mirrors the OS flag; the first poll or event corrects it.
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        signal: Arc<dyn NetworkSignal>,
        config: ConnectivityConfig,
    ) -> Self {
        let initial = signal.is_online();
        let (state, _) = watch::channel(initial);
        metrics::set_online(initial);
        Self {
            remote,
            signal,
            config,
            state,
        }
    }

    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// Cheap OS-level flag, no I/O.
    pub fn os_online(&self) -> bool {
        self.signal.is_online()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    pub fn config(&self) -> &ConnectivityConfig {
        &self.config
    }

    /// Record a new believed state; returns the transition if it changed.
    pub fn set_online(&self, online: bool) -> Option<Transition> {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if !changed {
            return None;
        }

        metrics::record_connectivity_transition(online);
        if online {
            info!("Backend reachable, now online");
            Some(Transition::CameOnline)
        } else {
            warn!("Backend unreachable, now offline");
            Some(Transition::WentOffline)
        }
    }

    /// Force OFFLINE after a network-shaped failure.
    pub fn mark_offline(&self) -> Option<Transition> {
        self.set_online(false)
    }

    /// Minimal read against the backend.
    ///
    /// Any server answer counts as reachable, including auth/RLS rejections
    /// and expired sessions; only transport failure or timeout does not.
    pub async fn probe(&self, timeout: Duration) -> bool {
        let query = SelectQuery::table(self.config.probe_table.clone())
            .columns("id")
            .limit(1);
        let start = Instant::now();

        let reachable = match tokio::time::timeout(timeout, self.remote.select(query)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) if e.is_network() => {
                debug!(error = %e, "Probe failed");
                false
            }
            Ok(Err(e)) => {
                debug!(error = %e, session_expired = e.is_session_expired(), "Probe answered with error");
                true
            }
            Err(_) => {
                debug!(timeout_ms = timeout.as_millis() as u64, "Probe timed out");
                false
            }
        };

        metrics::record_probe(reachable, start.elapsed());
        reachable
    }

    /// Probe, then set state. The one authoritative connectivity check.
    pub async fn verify(&self, timeout: Duration) -> Option<Transition> {
        if !self.signal.is_online() {
            return self.set_online(false);
        }
        let reachable = self.probe(timeout).await;
        // A NetworkLost that landed while the check was in flight wins.
        self.set_online(reachable && self.signal.is_online())
    }

    /// Single state-transition function for every trigger.
    pub async fn handle(&self, trigger: Trigger) -> Option<Transition> {
        debug!(trigger = trigger.as_str(), "Connectivity trigger");
        match trigger {
            Trigger::NetworkLost => self.set_online(false),
            Trigger::NetworkAvailable => {
                tokio::time::sleep(self.config.online_settle_duration()).await;
                self.verify(self.config.event_probe_timeout_duration()).await
            }
            Trigger::Foregrounded => {
                tokio::time::sleep(self.config.foreground_settle_duration()).await;
                self.verify(self.config.event_probe_timeout_duration()).await
            }
            Trigger::PollTick => {
                self.verify(self.config.poll_probe_timeout_duration()).await
            }
        }
    }
}
