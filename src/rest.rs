// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! HTTP client for a PostgREST-style hosted backend.

use crate::config::RemoteConfig;
use crate::error::{Result, SyncError};
use crate::remote::{RemoteError, RemoteFuture, RemoteResult, RemoteStore, SelectQuery};
use serde::Deserialize;
use serde_json::Value;
use std::sync::RwLock;
use std::time::Duration;
use tracing::debug;

/// Transport-level backstop; the executor applies its own shorter timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Error body PostgREST returns on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

/// [`RemoteStore`] over HTTP.
pub struct RestRemote {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    /// Signed-in user's access token. Falls back to the api key when absent.
    access_token: RwLock<Option<String>>,
}

impl RestRemote {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        if config.base_url.is_empty() {
            return Err(SyncError::Config("remote.base_url is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SyncError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            access_token: RwLock::new(None),
        })
    }

    /// Swap the bearer token after sign-in, refresh or sign-out.
    pub fn set_access_token(&self, token: Option<String>) {
        match self.access_token.write() {
            Ok(mut guard) => *guard = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }

    fn bearer(&self) -> String {
        let token = match self.access_token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        token.unwrap_or_else(|| self.api_key.clone())
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn request(&self, method: reqwest::Method, table: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.table_url(table))
            .header("apikey", &self.api_key)
            .bearer_auth(self.bearer())
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> RemoteResult<Value> {
        let response = builder.send().await.map_err(map_transport)?;
        let status = response.status();
        let body = response.text().await.map_err(map_transport)?;

        if !status.is_success() {
            return Err(parse_error_body(status.as_u16(), &body));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        // A 2xx we cannot read came from something other than the backend.
        serde_json::from_str(&body)
            .map_err(|e| RemoteError::Transport(format!("unreadable response body: {}", e)))
    }
}

fn map_transport(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Timeout(REQUEST_TIMEOUT)
    } else {
        RemoteError::Transport(e.to_string())
    }
}

/// Gateway errors and bare 5xx pages mean the backend itself was not reached.
/// Only 4xx and answers carrying a backend error code are rejections.
fn parse_error_body(status: u16, body: &str) -> RemoteError {
    let parsed: Option<ErrorBody> = serde_json::from_str(body).ok();
    let backend_code = parsed.as_ref().and_then(|b| b.code.clone());

    let gateway = matches!(status, 502..=504);
    if gateway || (status >= 500 && backend_code.is_none()) {
        return RemoteError::Transport(format!("HTTP {}: {}", status, body.trim()));
    }

    let code = backend_code.unwrap_or_else(|| status.to_string());
    let message = parsed
        .and_then(|b| b.message)
        .unwrap_or_else(|| body.to_string());
    RemoteError::Rejected { code, message }
}

/// Mutations return an array with `Prefer: return=representation`.
fn single_row(value: Value) -> RemoteResult<Value> {
    match value {
        Value::Array(rows) => rows
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::rejected("PGRST116", "no row returned")),
        other => Ok(other),
    }
}

fn rows(value: Value) -> Vec<Value> {
    match value {
        Value::Array(rows) => rows,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

impl RemoteStore for RestRemote {
    fn select(&self, query: SelectQuery) -> RemoteFuture<'_, Vec<Value>> {
        Box::pin(async move {
            debug!(table = %query.table, "REST select");
            let builder = self
                .request(reqwest::Method::GET, &query.table)
                .query(&query.query_pairs());
            self.send(builder).await.map(rows)
        })
    }

    fn insert<'a>(&'a self, table: &'a str, row: Value) -> RemoteFuture<'a, Value> {
        Box::pin(async move {
            let builder = self
                .request(reqwest::Method::POST, table)
                .header("Prefer", "return=representation")
                .json(&row);
            single_row(self.send(builder).await?)
        })
    }

    fn update<'a>(&'a self, table: &'a str, id: &'a str, patch: Value) -> RemoteFuture<'a, Value> {
        Box::pin(async move {
            let builder = self
                .request(reqwest::Method::PATCH, table)
                .query(&[("id", format!("eq.{}", id))])
                .header("Prefer", "return=representation")
                .json(&patch);
            single_row(self.send(builder).await?)
        })
    }

    fn delete<'a>(&'a self, table: &'a str, id: &'a str) -> RemoteFuture<'a, ()> {
        Box::pin(async move {
            let builder = self
                .request(reqwest::Method::DELETE, table)
                .query(&[("id", format!("eq.{}", id))]);
            self.send(builder).await.map(|_| ())
        })
    }
}
