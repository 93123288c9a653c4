// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Queue, cache and outcome types.
//!
//! An [`Operation`] is what domain code asks for; a [`QueueEntry`] is an
//! operation that could not be confirmed against the backend yet and now
//! lives in the local store. The wire shape of an operation matches what
//! the domain layer sends:
//!
//! ```json
//! { "type": "insert", "table": "expenses", "data": { "amount": 100 } }
//! { "type": "update", "table": "debts", "id": "42", "data": { "status": "paid" } }
//! { "type": "delete", "table": "incomes", "id": "7" }
//! ```

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// A logical mutation against one remote table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub table: String,
    #[serde(flatten)]
    pub mutation: Mutation,
}

/// What to do to the table.
///
/// Update and delete always carry the target row id, so an update without
/// a target cannot be expressed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Mutation {
    Insert { data: Value },
    Update { id: String, data: Value },
    Delete { id: String },
}

impl Operation {
    pub fn insert(table: impl Into<String>, data: Value) -> Self {
        Self {
            table: table.into(),
            mutation: Mutation::Insert { data },
        }
    }

    pub fn update(table: impl Into<String>, id: impl Into<String>, data: Value) -> Self {
        Self {
            table: table.into(),
            mutation: Mutation::Update {
                id: id.into(),
                data,
            },
        }
    }

    pub fn delete(table: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            mutation: Mutation::Delete { id: id.into() },
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self.mutation {
            Mutation::Insert { .. } => OperationKind::Insert,
            Mutation::Update { .. } => OperationKind::Update,
            Mutation::Delete { .. } => OperationKind::Delete,
        }
    }

    /// Remote row id (update/delete only).
    pub fn target_id(&self) -> Option<&str> {
        match &self.mutation {
            Mutation::Insert { .. } => None,
            Mutation::Update { id, .. } | Mutation::Delete { id } => Some(id),
        }
    }

    /// Row payload (insert/update only).
    pub fn data(&self) -> Option<&Value> {
        match &self.mutation {
            Mutation::Insert { data } | Mutation::Update { data, .. } => Some(data),
            Mutation::Delete { .. } => None,
        }
    }

    /// Rebuild an operation from its stored columns.
    pub(crate) fn from_parts(
        kind: OperationKind,
        table: String,
        data: Option<Value>,
        target_id: Option<String>,
    ) -> Result<Self, String> {
        let mutation = match kind {
            OperationKind::Insert => Mutation::Insert {
                data: data.unwrap_or(Value::Null),
            },
            OperationKind::Update => Mutation::Update {
                id: target_id.ok_or("update without target id")?,
                data: data.unwrap_or(Value::Null),
            },
            OperationKind::Delete => Mutation::Delete {
                id: target_id.ok_or("delete without target id")?,
            },
        };
        Ok(Self { table, mutation })
    }

    /// Short description for logs, e.g. `update debts/42`.
    pub fn describe(&self) -> String {
        match self.target_id() {
            Some(id) => format!("{} {}/{}", self.kind(), self.table, id),
            None => format!("{} {}", self.kind(), self.table),
        }
    }
}

/// Mutation discriminant as stored in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "insert" => Ok(Self::Insert),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(format!("unknown operation type: {}", other)),
        }
    }
}

/// Replay status of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    /// Never attempted, or interrupted by connectivity loss.
    Pending,
    /// Last replay attempt was rejected; still replayable within the retry budget.
    Error,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown entry status: {}", other)),
        }
    }
}

/// A mutation waiting in the local queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueEntry {
    /// Store-assigned, strictly increasing. Defines replay order.
    pub id: i64,
    pub operation: Operation,
    pub status: EntryStatus,
    /// Failed replay attempts so far.
    pub retries: u32,
    pub created_at: DateTime<Utc>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Last-known-good snapshot of one remote table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub table: String,
    pub rows: Vec<Value>,
    pub updated_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Check whether the snapshot is older than `max_age` at `now`.
    pub fn is_stale(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(max_age) {
            Ok(max_age) => now - self.updated_at > max_age,
            Err(_) => false, // out-of-range max age never expires
        }
    }
}

/// A queue entry that exhausted its retry budget.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeadLetter {
    /// Id the entry had in the queue.
    pub queue_id: i64,
    pub operation: Operation,
    pub retries: u32,
    pub created_at: DateTime<Utc>,
    pub abandoned_at: DateTime<Utc>,
    pub reason: String,
}

/// What `execute_operation` tells the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome {
    /// Confirmed by the backend; carries the row it returned.
    Applied { data: Value },
    /// Accepted locally and queued for replay.
    Queued { temp_id: String },
}

impl OperationOutcome {
    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Queued { .. })
    }

    pub fn temp_id(&self) -> Option<&str> {
        match self {
            Self::Queued { temp_id } => Some(temp_id),
            Self::Applied { .. } => None,
        }
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Applied { data } => Some(data),
            Self::Queued { .. } => None,
        }
    }
}

impl Serialize for OperationOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Applied { data } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("success", &true)?;
                map.serialize_entry("data", data)?;
                map.end()
            }
            Self::Queued { temp_id } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("success", &true)?;
                map.serialize_entry("offline", &true)?;
                map.serialize_entry("tempId", temp_id)?;
                map.end()
            }
        }
    }
}
