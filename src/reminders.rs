// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Payment reminders for commitments.
//!
//! A commitment with a pay date gets one reminder per offset (8, 5 and 3
//! days before by default). Delivery itself belongs to the host platform:
//! [`ReminderScheduler`] only decides when, and calls back.

use crate::metrics;
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Days before the pay date.
pub const DEFAULT_OFFSETS: [u32; 3] = [8, 5, 3];

/// A recurring payment obligation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Commitment {
    pub id: String,
    pub name: String,
    pub amount: f64,
    pub pay_date: Option<NaiveDate>,
    /// Inactive commitments never remind.
    pub active: bool,
}

impl Commitment {
    /// Read a `commitments` row. `None` when it has no usable id.
    pub fn from_row(row: &Value) -> Option<Self> {
        let id = match row.get("id")? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let pay_date = row
            .get("pay_date")
            .and_then(Value::as_str)
            .and_then(|raw| raw.get(..10))
            .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok());

        Some(Self {
            id,
            name: row
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            amount: crate::finance::amount_of(row),
            pay_date,
            active: row.get("status").and_then(Value::as_bool).unwrap_or(false),
        })
    }

    fn remindable(&self) -> Option<NaiveDate> {
        if self.active {
            self.pay_date
        } else {
            None
        }
    }
}

/// One delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reminder {
    pub commitment_id: String,
    pub days_before: u32,
    pub fire_on: NaiveDate,
    pub title: String,
    pub body: String,
    /// Stable per commitment and offset; re-scheduling replaces.
    pub tag: String,
}

impl Reminder {
    fn new(commitment: &Commitment, days_before: u32, fire_on: NaiveDate) -> Self {
        let (title, body) = reminder_message(commitment, days_before);
        Self {
            commitment_id: commitment.id.clone(),
            days_before,
            fire_on,
            title,
            body,
            tag: reminder_tag(&commitment.id, days_before),
        }
    }
}

fn reminder_tag(commitment_id: &str, days_before: u32) -> String {
    format!("commitment-{}-{}", commitment_id, days_before)
}

/// `pay_date - offset` for each offset.
pub fn reminder_dates(pay_date: NaiveDate, offsets: &[u32]) -> Vec<(u32, NaiveDate)> {
    offsets
        .iter()
        .filter_map(|&days| {
            pay_date
                .checked_sub_days(Days::new(u64::from(days)))
                .map(|date| (days, date))
        })
        .collect()
}

/// Reminders whose offset is exactly the days left until payment.
pub fn due_today(today: NaiveDate, commitments: &[Commitment], offsets: &[u32]) -> Vec<Reminder> {
    commitments
        .iter()
        .filter_map(|c| {
            let pay_date = c.remindable()?;
            let days_left = (pay_date - today).num_days();
            let days = u32::try_from(days_left).ok()?;
            offsets
                .contains(&days)
                .then(|| Reminder::new(c, days, today))
        })
        .collect()
}

/// Rounded amount with `.` thousands separators, e.g. `1.250.000`.
pub fn format_amount(amount: f64) -> String {
    let rounded = amount.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    if rounded < 0 {
        out.insert(0, '-');
    }
    out
}

/// Title and body of the notification.
pub fn reminder_message(commitment: &Commitment, days_before: u32) -> (String, String) {
    (
        "Payment reminder".to_string(),
        format!(
            "{} - payment due in {} days\nAmount: ${}",
            commitment.name,
            days_before,
            format_amount(commitment.amount)
        ),
    )
}

/// Delivery callback, invoked at fire time.
pub type DeliverFn = Arc<dyn Fn(Reminder) + Send + Sync>;

/// Timer-based scheduling of future reminders.
pub struct ReminderScheduler {
    offsets: Vec<u32>,
    deliver: DeliverFn,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl ReminderScheduler {
    pub fn new(deliver: DeliverFn) -> Self {
        Self::with_offsets(DEFAULT_OFFSETS.to_vec(), deliver)
    }

    pub fn with_offsets(offsets: Vec<u32>, deliver: DeliverFn) -> Self {
        Self {
            offsets,
            deliver,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    fn tasks(&self) -> std::sync::MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Schedule the reminders of `commitment` that are still in the future.
    ///
    /// Returns how many were scheduled.
    pub fn schedule(&self, commitment: &Commitment, now: DateTime<Utc>) -> usize {
        let Some(pay_date) = commitment.remindable() else {
            return 0;
        };

        let mut scheduled = 0;
        for (days, date) in reminder_dates(pay_date, &self.offsets) {
            let fire_at = date.and_time(NaiveTime::MIN).and_utc();
            let Ok(delay) = (fire_at - now).to_std() else {
                continue; // already past
            };

            let reminder = Reminder::new(commitment, days, date);
            let tag = reminder.tag.clone();
            let deliver = Arc::clone(&self.deliver);
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                debug!(tag = %reminder.tag, "Delivering reminder");
                metrics::record_reminder_fired(reminder.days_before);
                deliver(reminder);
            });

            if let Some(previous) = self.tasks().insert(tag, handle) {
                previous.abort();
            }
            scheduled += 1;
        }

        if scheduled > 0 {
            info!(commitment = %commitment.id, scheduled, "Reminders scheduled");
        }
        scheduled
    }

    pub fn schedule_all(&self, commitments: &[Commitment], now: DateTime<Utc>) -> usize {
        commitments.iter().map(|c| self.schedule(c, now)).sum()
    }

    /// Cancel every pending reminder of one commitment.
    pub fn cancel(&self, commitment_id: &str) -> usize {
        let mut tasks = self.tasks();
        let mut cancelled = 0;
        for &days in &self.offsets {
            if let Some(handle) = tasks.remove(&reminder_tag(commitment_id, days)) {
                handle.abort();
                cancelled += 1;
            }
        }
        cancelled
    }

    pub fn cancel_all(&self) {
        for (_, handle) in self.tasks().drain() {
            handle.abort();
        }
    }

    /// Reminders not yet delivered or cancelled.
    pub fn pending(&self) -> usize {
        let mut tasks = self.tasks();
        tasks.retain(|_, handle| !handle.is_finished());
        tasks.len()
    }
}

impl Drop for ReminderScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
