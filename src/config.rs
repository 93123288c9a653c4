// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the offline sync engine.
//!
//! Configuration is passed to [`SyncCoordinator::new()`](crate::SyncCoordinator::new)
//! and can be constructed programmatically or deserialized from YAML/JSON.
//!
//! # Configuration Structure
//!
//! ```text
//! SyncConfig
//! ├── connectivity: ConnectivityConfig  # OS signal + verification probe
//! ├── executor: ExecutorConfig          # per-operation timeout
//! ├── drain: DrainConfig                # queue replay pacing and retry budget
//! ├── store: StoreConfig                # SQLite queue/cache persistence
//! └── remote: RemoteConfig              # hosted backend endpoint
//! ```
//!
//! # JSON Example
//!
//! ```json
//! {
//!   "connectivity": { "poll_interval": "30s", "online_settle_delay": "3s" },
//!   "drain": { "max_retries": 3 },
//!   "store": { "sqlite_path": "/data/money/offline.db" },
//!   "remote": { "base_url": "https://project.example.co", "api_key": "anon-key" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parse a human-readable duration, falling back when it is malformed.
fn parse_or(value: &str, fallback: Duration) -> Duration {
    humantime::parse_duration(value).unwrap_or(fallback)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level config object passed to the sync coordinator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub connectivity: ConnectivityConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub drain: DrainConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
}

impl SyncConfig {
    /// Millisecond-scale config with an in-memory store, for tests.
    pub fn for_testing() -> Self {
        Self {
            connectivity: ConnectivityConfig::testing(),
            executor: ExecutorConfig {
                operation_timeout: "200ms".to_string(),
            },
            drain: DrainConfig {
                pause_between: "1ms".to_string(),
                max_retries: 3,
            },
            store: StoreConfig::in_memory(),
            remote: RemoteConfig::default(),
        }
    }

    /// Validate values that cannot be defaulted away.
    pub fn validate(&self) -> crate::Result<()> {
        if self.drain.max_retries == 0 {
            return Err(crate::SyncError::Config(
                "drain.max_retries must be at least 1".to_string(),
            ));
        }
        if self.connectivity.probe_table.trim().is_empty() {
            return Err(crate::SyncError::Config(
                "connectivity.probe_table must not be empty".to_string(),
            ));
        }
        for (name, value) in [
            ("connectivity.poll_interval", &self.connectivity.poll_interval),
            ("connectivity.online_settle_delay", &self.connectivity.online_settle_delay),
            ("connectivity.foreground_settle_delay", &self.connectivity.foreground_settle_delay),
            ("connectivity.poll_probe_timeout", &self.connectivity.poll_probe_timeout),
            ("connectivity.event_probe_timeout", &self.connectivity.event_probe_timeout),
            ("executor.operation_timeout", &self.executor.operation_timeout),
            ("drain.pause_between", &self.drain.pause_between),
        ] {
            humantime::parse_duration(value).map_err(|e| {
                crate::SyncError::Config(format!("{} = {:?}: {}", name, value, e))
            })?;
        }
        for (name, value) in [
            ("connectivity.poll_interval", self.connectivity.poll_interval_duration()),
            ("connectivity.poll_probe_timeout", self.connectivity.poll_probe_timeout_duration()),
            ("connectivity.event_probe_timeout", self.connectivity.event_probe_timeout_duration()),
            ("executor.operation_timeout", self.executor.operation_timeout_duration()),
        ] {
            if value.is_zero() {
                return Err(crate::SyncError::Config(format!("{} must be greater than zero", name)));
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ConnectivityConfig: OS signal handling and verification probe
// ═══════════════════════════════════════════════════════════════════════════════

/// Connectivity monitor configuration.
///
/// The OS "online" signal is optimistic, so every positive transition is
/// confirmed by a verification probe: a one-row read against `probe_table`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    /// How often the periodic verification runs, regardless of believed state.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,

    /// Wait after an OS "online" event before probing (absorbs flapping).
    #[serde(default = "default_online_settle_delay")]
    pub online_settle_delay: String,

    /// Wait after the app returns to the foreground before probing.
    #[serde(default = "default_foreground_settle_delay")]
    pub foreground_settle_delay: String,

    /// Probe timeout for routine polls.
    #[serde(default = "default_poll_probe_timeout")]
    pub poll_probe_timeout: String,

    /// Probe timeout after OS/foreground events, when the network may still
    /// be stabilizing.
    #[serde(default = "default_event_probe_timeout")]
    pub event_probe_timeout: String,

    /// Table read by the verification probe.
    #[serde(default = "default_probe_table")]
    pub probe_table: String,
}

fn default_poll_interval() -> String {
    "30s".to_string()
}

fn default_online_settle_delay() -> String {
    "2s".to_string()
}

fn default_foreground_settle_delay() -> String {
    "1s".to_string()
}

fn default_poll_probe_timeout() -> String {
    "5s".to_string()
}

fn default_event_probe_timeout() -> String {
    "10s".to_string()
}

fn default_probe_table() -> String {
    "profiles".to_string()
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            online_settle_delay: default_online_settle_delay(),
            foreground_settle_delay: default_foreground_settle_delay(),
            poll_probe_timeout: default_poll_probe_timeout(),
            event_probe_timeout: default_event_probe_timeout(),
            probe_table: default_probe_table(),
        }
    }
}

impl ConnectivityConfig {
    /// Mobile radios take longer to come back after a network switch.
    pub fn mobile() -> Self {
        Self {
            online_settle_delay: "3s".to_string(),
            foreground_settle_delay: "2s".to_string(),
            event_probe_timeout: "15s".to_string(),
            ..Self::default()
        }
    }

    /// Fast settle/probe timings for tests.
    pub fn testing() -> Self {
        Self {
            poll_interval: "1h".to_string(), // tests drive PollTick explicitly
            online_settle_delay: "5ms".to_string(),
            foreground_settle_delay: "5ms".to_string(),
            poll_probe_timeout: "50ms".to_string(),
            event_probe_timeout: "80ms".to_string(),
            probe_table: default_probe_table(),
        }
    }

    pub fn poll_interval_duration(&self) -> Duration {
        parse_or(&self.poll_interval, Duration::from_secs(30))
    }

    pub fn online_settle_duration(&self) -> Duration {
        parse_or(&self.online_settle_delay, Duration::from_secs(2))
    }

    pub fn foreground_settle_duration(&self) -> Duration {
        parse_or(&self.foreground_settle_delay, Duration::from_secs(1))
    }

    pub fn poll_probe_timeout_duration(&self) -> Duration {
        parse_or(&self.poll_probe_timeout, Duration::from_secs(5))
    }

    pub fn event_probe_timeout_duration(&self) -> Duration {
        parse_or(&self.event_probe_timeout, Duration::from_secs(10))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ExecutorConfig / DrainConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Operation executor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Every remote mutation races against this timeout.
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout: String,
}

fn default_operation_timeout() -> String {
    "10s".to_string()
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            operation_timeout: default_operation_timeout(),
        }
    }
}

impl ExecutorConfig {
    pub fn operation_timeout_duration(&self) -> Duration {
        parse_or(&self.operation_timeout, Duration::from_secs(10))
    }
}

/// Queue drain configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrainConfig {
    /// Pause between successfully replayed entries.
    #[serde(default = "default_pause_between")]
    pub pause_between: String,

    /// Failed replay attempts after which an entry is abandoned.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_pause_between() -> String {
    "500ms".to_string()
}

fn default_max_retries() -> u32 {
    3
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            pause_between: default_pause_between(),
            max_retries: default_max_retries(),
        }
    }
}

impl DrainConfig {
    pub fn pause_duration(&self) -> Duration {
        parse_or(&self.pause_between, Duration::from_millis(500))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// StoreConfig: local SQLite persistence
// ═══════════════════════════════════════════════════════════════════════════════

/// Local durable store configuration.
///
/// Holds the mutation queue, the per-table read cache and abandoned entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database. `:memory:` keeps everything in RAM.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,

    /// Whether to use WAL mode for SQLite (recommended).
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

fn default_sqlite_path() -> String {
    "offline_sync.db".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
            wal_mode: true,
        }
    }
}

impl StoreConfig {
    /// Create an in-memory config for testing.
    pub fn in_memory() -> Self {
        Self {
            sqlite_path: ":memory:".to_string(),
            wal_mode: false,
        }
    }

    /// Config for a database file at `path`.
    pub fn at(path: impl Into<String>) -> Self {
        Self {
            sqlite_path: path.into(),
            wal_mode: true,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.sqlite_path == ":memory:"
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RemoteConfig: hosted backend endpoint
// ═══════════════════════════════════════════════════════════════════════════════

/// Hosted backend endpoint used by [`RestRemote`](crate::rest::RestRemote).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Project base URL, e.g. `https://project.example.co`.
    #[serde(default)]
    pub base_url: String,

    /// Public API key sent with every request.
    #[serde(default)]
    pub api_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.connectivity.poll_interval_duration(), Duration::from_secs(30));
        assert_eq!(config.connectivity.online_settle_duration(), Duration::from_secs(2));
        assert_eq!(config.executor.operation_timeout_duration(), Duration::from_secs(10));
        assert_eq!(config.drain.pause_duration(), Duration::from_millis(500));
        assert_eq!(config.drain.max_retries, 3);
        assert_eq!(config.connectivity.probe_table, "profiles");
        assert!(config.store.wal_mode);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mobile_settles_longer() {
        let desktop = ConnectivityConfig::default();
        let mobile = ConnectivityConfig::mobile();
        assert!(mobile.online_settle_duration() > desktop.online_settle_duration());
        assert!(mobile.event_probe_timeout_duration() > desktop.event_probe_timeout_duration());
        assert_eq!(mobile.poll_interval_duration(), desktop.poll_interval_duration());
    }

    #[test]
    fn test_event_probe_longer_than_poll_probe() {
        let config = ConnectivityConfig::default();
        assert!(config.event_probe_timeout_duration() > config.poll_probe_timeout_duration());
    }

    #[test]
    fn test_deserialize_partial_json() {
        let json = r#"{
            "connectivity": { "online_settle_delay": "3s" },
            "store": { "sqlite_path": "/tmp/x.db" }
        }"#;
        let config: SyncConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.connectivity.online_settle_duration(), Duration::from_secs(3));
        assert_eq!(config.connectivity.poll_interval_duration(), Duration::from_secs(30));
        assert_eq!(config.store.sqlite_path, "/tmp/x.db");
        assert!(config.store.wal_mode);
        assert_eq!(config.drain.max_retries, 3);
    }

    #[test]
    fn test_malformed_duration_falls_back_but_fails_validation() {
        let mut config = SyncConfig::default();
        config.executor.operation_timeout = "soon".to_string();
        assert_eq!(config.executor.operation_timeout_duration(), Duration::from_secs(10));

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("executor.operation_timeout"));
    }

    #[test]
    fn test_zero_retries_rejected() {
        let mut config = SyncConfig::default();
        config.drain.max_retries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let mut config = SyncConfig::default();
        config.connectivity.poll_interval = "0s".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("connectivity.poll_interval"));

        let mut config = SyncConfig::default();
        config.executor.operation_timeout = "0ms".to_string();
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.connectivity.poll_probe_timeout = "0s".to_string();
        assert!(config.validate().is_err());

        // Settle delays and the drain pause may be zero
        let mut config = SyncConfig::default();
        config.connectivity.online_settle_delay = "0s".to_string();
        config.drain.pause_between = "0s".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_testing_config() {
        let config = SyncConfig::for_testing();
        assert!(config.store.is_in_memory());
        assert!(config.executor.operation_timeout_duration() < Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }
}
