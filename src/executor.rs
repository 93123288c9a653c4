// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Operation executor: one mutation against the backend, bounded by a timeout.

use crate::error::{Result, SyncError};
use crate::metrics;
use crate::model::{Mutation, Operation};
use crate::remote::RemoteStore;
use crate::session::SessionProvider;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Performs a single logical mutation.
pub struct OperationExecutor {
    remote: Arc<dyn RemoteStore>,
    session: Arc<dyn SessionProvider>,
    timeout: Duration,
}

impl OperationExecutor {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        session: Arc<dyn SessionProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            remote,
            session,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `operation` against the backend.
    ///
    /// Returns the created/updated row, or `{"id": target}` for a delete.
    /// The remote call races against the configured timeout; the loser is
    /// dropped.
    pub async fn perform(&self, operation: &Operation) -> Result<Value> {
        validate(operation)?;

        let label = operation.describe();
        let kind = operation.kind().as_str();
        let start = Instant::now();

        let result = match tokio::time::timeout(self.timeout, self.dispatch(operation, &label)).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::timeout(&label, self.timeout)),
        };

        let status = match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        metrics::record_remote_call(&operation.table, kind, status, start.elapsed());
        debug!(op = %label, status, elapsed_ms = start.elapsed().as_millis() as u64, "Remote call finished");

        result
    }

    async fn dispatch(&self, operation: &Operation, label: &str) -> Result<Value> {
        let table = operation.table.as_str();
        match &operation.mutation {
            Mutation::Insert { data } => {
                let user_id = self
                    .session
                    .current_user_id()
                    .ok_or(SyncError::Unauthenticated)?;
                let row = with_user_id(data, &user_id)?;
                self.remote
                    .insert(table, row)
                    .await
                    .map_err(|e| e.into_sync_error(label))
            }
            Mutation::Update { id, data } => self
                .remote
                .update(table, id, data.clone())
                .await
                .map_err(|e| e.into_sync_error(label)),
            Mutation::Delete { id } => {
                self.remote
                    .delete(table, id)
                    .await
                    .map_err(|e| e.into_sync_error(label))?;
                Ok(json!({ "id": id }))
            }
        }
    }
}

fn validate(operation: &Operation) -> Result<()> {
    if operation.table.trim().is_empty() {
        return Err(SyncError::InvalidOperation("empty table name".to_string()));
    }
    if let Some(id) = operation.target_id() {
        if id.trim().is_empty() {
            return Err(SyncError::InvalidOperation(format!(
                "{} without target id",
                operation.kind()
            )));
        }
    }
    match operation.data() {
        Some(Value::Object(_)) | None => Ok(()),
        Some(_) => Err(SyncError::InvalidOperation(format!(
            "{} payload must be a JSON object",
            operation.kind()
        ))),
    }
}

/// Payload plus the owner column.
fn with_user_id(data: &Value, user_id: &str) -> Result<Value> {
    let mut row = data.clone();
    match row.as_object_mut() {
        Some(map) => {
            map.insert("user_id".to_string(), Value::String(user_id.to_string()));
            Ok(row)
        }
        None => Err(SyncError::InvalidOperation(
            "insert payload must be a JSON object".to_string(),
        )),
    }
}
