// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Scripted RemoteStore for testing.

use offline_sync_engine::remote::{RemoteError, RemoteFuture, RemoteStore, SelectQuery};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// How the mock answers one call.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ok,
    /// Connection refused / fetch failure.
    Transport,
    /// Never settles; the caller's timeout must win.
    Hang,
    /// Server answered with an error code.
    Reject(&'static str),
}

/// A recorded call.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCall {
    pub kind: &'static str,
    pub table: String,
    pub id: Option<String>,
    pub body: Option<Value>,
}

impl RemoteCall {
    pub fn is_mutation(&self) -> bool {
        self.kind != "select"
    }
}

type CallHook = Box<dyn Fn(&RemoteCall) + Send + Sync>;

/// Mock remote that records all calls.
///
/// Mutations answer from a FIFO script, then from `default_reply`.
/// Selects (including connectivity probes) answer with `select_reply`.
pub struct MockRemote {
    calls: Mutex<Vec<RemoteCall>>,
    script: Mutex<VecDeque<Reply>>,
    default_reply: Mutex<Reply>,
    select_reply: Mutex<Reply>,
    rows: Mutex<HashMap<String, Vec<Value>>>,
    delay: Mutex<Duration>,
    on_mutation: Mutex<Option<CallHook>>,
    next_id: AtomicU64,
}

impl Default for MockRemote {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            default_reply: Mutex::new(Reply::Ok),
            select_reply: Mutex::new(Reply::Ok),
            rows: Mutex::new(HashMap::new()),
            delay: Mutex::new(Duration::ZERO),
            on_mutation: Mutex::new(None),
            next_id: AtomicU64::new(1000),
        }
    }
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue replies for the next mutation calls, in order.
    pub fn push_replies(&self, replies: impl IntoIterator<Item = Reply>) {
        self.script.lock().unwrap().extend(replies);
    }

    /// Reply for mutations once the script is exhausted.
    pub fn set_default(&self, reply: Reply) {
        *self.default_reply.lock().unwrap() = reply;
    }

    /// Reply for selects and probes.
    pub fn set_select(&self, reply: Reply) {
        *self.select_reply.lock().unwrap() = reply;
    }

    pub fn set_rows(&self, table: &str, rows: Vec<Value>) {
        self.rows.lock().unwrap().insert(table.to_string(), rows);
    }

    /// Latency added to every successful mutation.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Run `hook` whenever a mutation call is recorded.
    pub fn on_mutation(&self, hook: impl Fn(&RemoteCall) + Send + Sync + 'static) {
        *self.on_mutation.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutation_calls(&self) -> Vec<RemoteCall> {
        self.calls().into_iter().filter(RemoteCall::is_mutation).collect()
    }

    pub fn select_count(&self) -> usize {
        self.calls().iter().filter(|c| !c.is_mutation()).count()
    }

    fn record(&self, call: RemoteCall) -> (Reply, Duration) {
        let (reply, delay) = if call.is_mutation() {
            if let Some(hook) = self.on_mutation.lock().unwrap().as_ref() {
                hook(&call);
            }
            let reply = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.default_reply.lock().unwrap().clone());
            (reply, *self.delay.lock().unwrap())
        } else {
            (self.select_reply.lock().unwrap().clone(), Duration::ZERO)
        };
        self.calls.lock().unwrap().push(call);
        (reply, delay)
    }

    fn answer<T: Send + 'static>(&self, call: RemoteCall, value: T) -> RemoteFuture<'_, T> {
        let (reply, delay) = self.record(call);
        Box::pin(async move {
            match reply {
                Reply::Ok => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    Ok(value)
                }
                Reply::Transport => Err(RemoteError::Transport("error sending request: connection refused".into())),
                Reply::Hang => std::future::pending().await,
                Reply::Reject(code) => Err(RemoteError::rejected(code, "rejected by mock")),
            }
        })
    }
}

impl RemoteStore for MockRemote {
    fn select(&self, query: SelectQuery) -> RemoteFuture<'_, Vec<Value>> {
        let rows = self
            .rows
            .lock()
            .unwrap()
            .get(&query.table)
            .cloned()
            .unwrap_or_default();
        let call = RemoteCall {
            kind: "select",
            table: query.table.clone(),
            id: None,
            body: None,
        };
        self.answer(call, rows)
    }

    fn insert<'a>(&'a self, table: &'a str, row: Value) -> RemoteFuture<'a, Value> {
        let mut created = row.clone();
        if let Some(map) = created.as_object_mut() {
            map.insert("id".to_string(), json!(self.next_id.fetch_add(1, Ordering::SeqCst)));
        }
        let call = RemoteCall {
            kind: "insert",
            table: table.to_string(),
            id: None,
            body: Some(row),
        };
        self.answer(call, created)
    }

    fn update<'a>(&'a self, table: &'a str, id: &'a str, patch: Value) -> RemoteFuture<'a, Value> {
        let mut updated = patch.clone();
        if let Some(map) = updated.as_object_mut() {
            map.insert("id".to_string(), json!(id));
        }
        let call = RemoteCall {
            kind: "update",
            table: table.to_string(),
            id: Some(id.to_string()),
            body: Some(patch),
        };
        self.answer(call, updated)
    }

    fn delete<'a>(&'a self, table: &'a str, id: &'a str) -> RemoteFuture<'a, ()> {
        let call = RemoteCall {
            kind: "delete",
            table: table.to_string(),
            id: Some(id.to_string()),
            body: None,
        };
        self.answer(call, ())
    }
}
