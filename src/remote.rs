// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote data store integration trait.
//!
//! Defines the interface to the hosted relational backend: generic per-table
//! select/insert/update/delete keyed by table name and row id. The engine
//! never talks HTTP itself; it holds an `Arc<dyn RemoteStore>` so tests can
//! script every answer.
//!
//! # Example
//!
//! ```rust,no_run
//! use offline_sync_engine::remote::{RemoteFuture, RemoteStore, SelectQuery};
//! use serde_json::Value;
//!
//! struct Backend;
//!
//! impl RemoteStore for Backend {
//!     fn select(&self, _query: SelectQuery) -> RemoteFuture<'_, Vec<Value>> {
//!         Box::pin(async move { Ok(vec![]) })
//!     }
//!
//!     fn insert<'a>(&'a self, _table: &'a str, row: Value) -> RemoteFuture<'a, Value> {
//!         Box::pin(async move { Ok(row) })
//!     }
//!
//!     fn update<'a>(&'a self, _table: &'a str, _id: &'a str, patch: Value) -> RemoteFuture<'a, Value> {
//!         Box::pin(async move { Ok(patch) })
//!     }
//!
//!     fn delete<'a>(&'a self, _table: &'a str, _id: &'a str) -> RemoteFuture<'a, ()> {
//!         Box::pin(async move { Ok(()) })
//!     }
//! }
//! ```

use crate::error::SyncError;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Error code the backend uses for an expired or invalid session (JWT).
pub const SESSION_EXPIRED_CODE: &str = "PGRST301";

/// Result type for remote operations.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = RemoteResult<T>> + Send + 'a>>;

/// What the backend (or the path to it) said.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    /// No answer from the backend: connection refused, DNS, reset, gateway error.
    #[error("transport failure: {0}")]
    Transport(String),

    /// No answer in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The server answered with an error.
    #[error("rejected ({code}): {message}")]
    Rejected { code: String, message: String },
}

impl RemoteError {
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The server was not reached.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }

    /// The server answered that the session is no longer valid.
    ///
    /// For reachability purposes this still counts as an answer.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::Rejected { code, .. } if code == SESSION_EXPIRED_CODE)
    }

    /// Convert into the crate error, naming the operation that failed.
    pub fn into_sync_error(self, operation: &str) -> SyncError {
        match self {
            Self::Transport(message) => SyncError::network(operation, message),
            Self::Timeout(timeout) => SyncError::timeout(operation, timeout),
            Self::Rejected { code, message } => SyncError::Rejected { code, message },
        }
    }
}

/// A read against one table.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub table: String,
    pub columns: String,
    /// `(column, value)` equality filters, all of which must match.
    pub filters: Vec<(String, String)>,
    /// `(column, ascending)`.
    pub order: Option<(String, bool)>,
    pub limit: Option<usize>,
}

impl SelectQuery {
    /// Select every column of `table`.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: "*".to_string(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    pub fn columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = columns.into();
        self
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }

    pub fn order(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some((column.into(), ascending));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Query-string pairs in PostgREST syntax.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("select".to_string(), self.columns.clone())];
        for (column, value) in &self.filters {
            pairs.push((column.clone(), format!("eq.{}", value)));
        }
        if let Some((column, ascending)) = &self.order {
            let direction = if *ascending { "asc" } else { "desc" };
            pairs.push(("order".to_string(), format!("{}.{}", column, direction)));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        pairs
    }
}

/// Generic per-table operations against the hosted backend.
///
/// Implementations report "could not reach the server" as
/// [`RemoteError::Transport`]/[`RemoteError::Timeout`], including gateway
/// errors and unreadable bodies from something standing in for the server.
/// Only an answer from the backend itself is a [`RemoteError::Rejected`].
/// The engine's connectivity decisions depend on that split.
pub trait RemoteStore: Send + Sync + 'static {
    /// Read rows.
    fn select(&self, query: SelectQuery) -> RemoteFuture<'_, Vec<Value>>;

    /// Create a row; returns the created row.
    fn insert<'a>(&'a self, table: &'a str, row: Value) -> RemoteFuture<'a, Value>;

    /// Patch the row with `id`; returns the updated row.
    fn update<'a>(&'a self, table: &'a str, id: &'a str, patch: Value) -> RemoteFuture<'a, Value>;

    /// Delete the row with `id`.
    fn delete<'a>(&'a self, table: &'a str, id: &'a str) -> RemoteFuture<'a, ()>;
}
