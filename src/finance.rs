// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Finance tables on top of the sync coordinator.
//!
//! Reads go to the backend and are written through to the table cache; when
//! the backend cannot answer, the last cached snapshot is used instead (or
//! an empty collection when there is none). Writes go through
//! [`SyncCoordinator::execute_operation`] and are reflected locally right
//! away, whether they were applied or queued.

use crate::coordinator::SyncCoordinator;
use crate::error::{Result, SyncError};
use crate::model::{Operation, OperationOutcome};
use crate::remote::{RemoteStore, SelectQuery};
use crate::session::SessionProvider;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

pub const EXPENSES: &str = "expenses";
pub const INCOMES: &str = "incomes";
pub const DEBTS: &str = "debts";
pub const COMMITMENTS: &str = "commitments";

pub const FINANCE_TABLES: [&str; 4] = [EXPENSES, INCOMES, DEBTS, COMMITMENTS];

/// Where a table's rows came from on the last load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Remote,
    Cache,
    /// Neither the backend nor the cache had anything.
    Empty,
    /// Nobody signed in; collection left as it was.
    NoUser,
}

/// In-memory copy of the four tables, newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinanceData {
    pub expenses: Vec<Value>,
    pub incomes: Vec<Value>,
    pub debts: Vec<Value>,
    pub commitments: Vec<Value>,
}

impl FinanceData {
    fn table(&self, table: &str) -> Option<&Vec<Value>> {
        match table {
            EXPENSES => Some(&self.expenses),
            INCOMES => Some(&self.incomes),
            DEBTS => Some(&self.debts),
            COMMITMENTS => Some(&self.commitments),
            _ => None,
        }
    }

    fn table_mut(&mut self, table: &str) -> Option<&mut Vec<Value>> {
        match table {
            EXPENSES => Some(&mut self.expenses),
            INCOMES => Some(&mut self.incomes),
            DEBTS => Some(&mut self.debts),
            COMMITMENTS => Some(&mut self.commitments),
            _ => None,
        }
    }

    /// Aggregates for the month containing `today`.
    pub fn snapshot(&self, today: NaiveDate) -> FinanceSnapshot {
        let month_expenses = month_total(&self.expenses, today.year(), today.month());
        let month_incomes = month_total(&self.incomes, today.year(), today.month());
        FinanceSnapshot {
            month_expenses,
            month_incomes,
            month_balance: month_incomes - month_expenses,
            unpaid_debts: unpaid_total(&self.debts),
        }
    }
}

/// Dashboard numbers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FinanceSnapshot {
    pub month_expenses: f64,
    pub month_incomes: f64,
    pub month_balance: f64,
    pub unpaid_debts: f64,
}

/// Numeric value of a row's `amount`, accepting numbers and numeric strings.
pub fn amount_of(row: &Value) -> f64 {
    match row.get("amount") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Calendar date of a row's `created_at` (RFC 3339 or `YYYY-MM-DD...`).
pub fn created_on(row: &Value) -> Option<NaiveDate> {
    let raw = row.get("created_at")?.as_str()?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc).date_naive());
    }
    raw.get(..10)
        .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
}

/// Sum of `amount` over rows created in `year`/`month`.
pub fn month_total(rows: &[Value], year: i32, month: u32) -> f64 {
    rows.iter()
        .filter(|row| {
            created_on(row).is_some_and(|day| day.year() == year && day.month() == month)
        })
        .map(amount_of)
        .sum()
}

/// Sum of `amount` over debts whose status is not `paid`.
pub fn unpaid_total(debts: &[Value]) -> f64 {
    debts
        .iter()
        .filter(|debt| debt.get("status").and_then(Value::as_str) != Some("paid"))
        .map(amount_of)
        .sum()
}

fn row_id_matches(row: &Value, id: &str) -> bool {
    match row.get("id") {
        Some(Value::String(s)) => s == id,
        Some(Value::Number(n)) => n.to_string() == id,
        _ => false,
    }
}

fn check_table(table: &str) -> Result<()> {
    if FINANCE_TABLES.contains(&table) {
        Ok(())
    } else {
        Err(SyncError::InvalidOperation(format!(
            "unknown finance table: {}",
            table
        )))
    }
}

/// Expenses, incomes, debts and commitments for the signed-in user.
pub struct FinanceStore {
    coordinator: SyncCoordinator,
    remote: Arc<dyn RemoteStore>,
    session: Arc<dyn SessionProvider>,
    data: RwLock<FinanceData>,
    loading: AtomicBool,
}

impl FinanceStore {
    pub fn new(
        coordinator: SyncCoordinator,
        remote: Arc<dyn RemoteStore>,
        session: Arc<dyn SessionProvider>,
    ) -> Self {
        Self {
            coordinator,
            remote,
            session,
            data: RwLock::new(FinanceData::default()),
            loading: AtomicBool::new(false),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    /// Copy of the current collections.
    pub async fn data(&self) -> FinanceData {
        self.data.read().await.clone()
    }

    pub async fn rows(&self, table: &str) -> Vec<Value> {
        self.data
            .read()
            .await
            .table(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Aggregates for the current (UTC) month.
    pub async fn snapshot(&self) -> FinanceSnapshot {
        self.data.read().await.snapshot(Utc::now().date_naive())
    }

    /// Reload one table: backend first, cache as fallback, empty last.
    pub async fn load_table(&self, table: &str) -> Result<DataSource> {
        check_table(table)?;
        let Some(user_id) = self.session.current_user_id() else {
            return Ok(DataSource::NoUser);
        };

        let (rows, source) = match self.fetch_remote(table, &user_id).await {
            Some(rows) => {
                if let Err(e) = self.coordinator.cache_table_data(table, &rows).await {
                    warn!(table, error = %e, "Failed to cache table data");
                }
                (rows, DataSource::Remote)
            }
            None => match self.coordinator.get_cached_table_data(table).await {
                Ok(Some(cached)) => {
                    debug!(table, rows = cached.rows.len(), "Using cached table data");
                    (cached.rows, DataSource::Cache)
                }
                Ok(None) => (Vec::new(), DataSource::Empty),
                Err(e) => {
                    warn!(table, error = %e, "Cache read failed");
                    (Vec::new(), DataSource::Empty)
                }
            },
        };

        if let Some(slot) = self.data.write().await.table_mut(table) {
            *slot = rows;
        }
        Ok(source)
    }

    async fn fetch_remote(&self, table: &str, user_id: &str) -> Option<Vec<Value>> {
        if !self.coordinator.is_online() {
            return None;
        }
        let query = SelectQuery::table(table)
            .eq("user_id", user_id)
            .order("created_at", false);
        let timeout = self.coordinator.config().executor.operation_timeout_duration();

        match tokio::time::timeout(timeout, self.remote.select(query)).await {
            Ok(Ok(rows)) => Some(rows),
            Ok(Err(e)) => {
                warn!(table, error = %e, "Remote load failed");
                None
            }
            Err(_) => {
                warn!(table, timeout_ms = timeout.as_millis() as u64, "Remote load timed out");
                None
            }
        }
    }

    /// Reload all four tables concurrently.
    pub async fn load_all(&self) -> Result<Vec<(&'static str, DataSource)>> {
        self.loading.store(true, Ordering::Release);
        let (expenses, incomes, debts, commitments) = futures::join!(
            self.load_table(EXPENSES),
            self.load_table(INCOMES),
            self.load_table(DEBTS),
            self.load_table(COMMITMENTS),
        );
        self.loading.store(false, Ordering::Release);

        Ok(vec![
            (EXPENSES, expenses?),
            (INCOMES, incomes?),
            (DEBTS, debts?),
            (COMMITMENTS, commitments?),
        ])
    }

    /// Create a row. Queued inserts show up locally under their temporary id.
    pub async fn add(&self, table: &str, row: Value) -> Result<OperationOutcome> {
        check_table(table)?;
        let outcome = self
            .coordinator
            .execute_operation(Operation::insert(table, row.clone()))
            .await?;

        let local = match &outcome {
            OperationOutcome::Applied { data } => data.clone(),
            OperationOutcome::Queued { temp_id } => {
                let mut local = row.as_object().cloned().unwrap_or_else(Map::new);
                local.insert("id".to_string(), Value::String(temp_id.clone()));
                Value::Object(local)
            }
        };
        if let Some(rows) = self.data.write().await.table_mut(table) {
            rows.insert(0, local);
        }
        Ok(outcome)
    }

    /// Patch a row and merge the patch into the local copy.
    pub async fn update(&self, table: &str, id: &str, patch: Value) -> Result<OperationOutcome> {
        check_table(table)?;
        let outcome = self
            .coordinator
            .execute_operation(Operation::update(table, id, patch.clone()))
            .await?;

        let mut data = self.data.write().await;
        if let Some(row) = data
            .table_mut(table)
            .and_then(|rows| rows.iter_mut().find(|row| row_id_matches(row, id)))
        {
            match (&outcome, row.as_object_mut()) {
                (OperationOutcome::Applied { data: Value::Object(updated) }, Some(fields)) => {
                    fields.extend(updated.clone());
                }
                (_, Some(fields)) => {
                    if let Value::Object(patch) = &patch {
                        fields.extend(patch.clone());
                    }
                }
                (_, None) => {}
            }
        }
        Ok(outcome)
    }

    /// Delete a row and drop it locally.
    pub async fn remove(&self, table: &str, id: &str) -> Result<OperationOutcome> {
        check_table(table)?;
        let outcome = self
            .coordinator
            .execute_operation(Operation::delete(table, id))
            .await?;

        if let Some(rows) = self.data.write().await.table_mut(table) {
            rows.retain(|row| !row_id_matches(row, id));
        }
        Ok(outcome)
    }
}
