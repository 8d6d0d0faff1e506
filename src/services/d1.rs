//! Cloudflare D1 client.
//!
//! The remote store is reachable only through D1's HTTP query endpoint: a
//! JSON envelope carrying one or many SQL statements, answered with a JSON
//! result array. Every write issued through this client is an
//! `INSERT OR IGNORE` or a keyed `UPDATE`, so retried requests never
//! duplicate rows.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::config::RemoteConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_ATTEMPTS: u32 = 3;

/// Statement batching caps for multi-statement requests.
pub const MAX_STATEMENTS_PER_REQUEST: usize = 500;
pub const MAX_REQUEST_BYTES: usize = 100_000;

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("HTTP request to D1 failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("D1 returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("D1 query failed: {0}")]
    Api(String),
}

#[derive(Debug, Serialize)]
struct D1Request<'a> {
    sql: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a [serde_json::Value]>,
}

#[derive(Debug, Deserialize)]
pub struct D1Response {
    pub success: bool,
    #[serde(default)]
    pub result: Vec<D1Result>,
    #[serde(default)]
    pub errors: Vec<D1Message>,
}

#[derive(Debug, Deserialize)]
pub struct D1Result {
    #[serde(default)]
    pub results: Vec<serde_json::Value>,
    #[serde(default)]
    pub meta: D1Meta,
}

#[derive(Debug, Default, Deserialize)]
pub struct D1Meta {
    #[serde(default)]
    pub changes: i64,
    #[serde(default)]
    pub last_row_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct D1Message {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// HTTP client for one D1 database. Credentials come in as an explicit
/// config value; nothing here is process-global.
pub struct D1Client {
    http: reqwest::Client,
    endpoint: String,
    api_token: String,
}

impl D1Client {
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let endpoint = format!(
            "https://api.cloudflare.com/client/v4/accounts/{}/d1/database/{}/query",
            config.cloudflare_account_id, config.cloudflare_d1_database_id
        );
        Ok(Self {
            http,
            endpoint,
            api_token: config.cloudflare_api_token.clone(),
        })
    }

    /// Execute one or many semicolon-separated statements, retrying
    /// connection failures and non-2xx answers with 1/2/4 s backoff.
    pub async fn execute(&self, sql: &str) -> Result<Vec<D1Result>, RemoteError> {
        self.execute_with_params(sql, None).await
    }

    pub async fn execute_with_params(
        &self,
        sql: &str,
        params: Option<&[serde_json::Value]>,
    ) -> Result<Vec<D1Result>, RemoteError> {
        let request = D1Request { sql, params };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.send(&request).await {
                Ok(results) => return Ok(results),
                Err(e @ RemoteError::Api(_)) => return Err(e),
                Err(e) if attempt < MAX_ATTEMPTS => {
                    let backoff = Duration::from_secs(1u64 << (attempt - 1));
                    warn!(
                        attempt,
                        backoff_secs = backoff.as_secs(),
                        error = %e,
                        "D1 request failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    error!(error = %e, "D1 request failed after {MAX_ATTEMPTS} attempts");
                    return Err(e);
                }
            }
        }
    }

    async fn send(&self, request: &D1Request<'_>) -> Result<Vec<D1Result>, RemoteError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_token)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: D1Response = response.json().await?;
        if !envelope.success {
            let message = envelope
                .errors
                .iter()
                .map(|e| format!("{} ({})", e.message, e.code))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(RemoteError::Api(message));
        }
        Ok(envelope.result)
    }

    /// Rows of the first result set.
    pub async fn fetch_rows(&self, sql: &str) -> Result<Vec<serde_json::Value>, RemoteError> {
        let mut results = self.execute(sql).await?;
        if results.is_empty() {
            return Ok(Vec::new());
        }
        Ok(results.swap_remove(0).results)
    }

    /// Total changed-row count across all result sets.
    pub async fn execute_counting(&self, sql: &str) -> Result<i64, RemoteError> {
        let results = self.execute(sql).await?;
        Ok(results.iter().map(|r| r.meta.changes).sum())
    }

    /// Run a statement stream through the batcher, returning the summed
    /// changed-row count.
    pub async fn execute_batched(
        &self,
        statements: impl IntoIterator<Item = String>,
    ) -> Result<i64, RemoteError> {
        let mut batcher = StatementBatcher::default();
        let mut changes = 0;
        for statement in statements {
            if let Some(batch) = batcher.push(statement) {
                changes += self.execute_counting(&batch).await?;
            }
        }
        if let Some(batch) = batcher.flush() {
            changes += self.execute_counting(&batch).await?;
        }
        Ok(changes)
    }
}

/// Accumulates statements into multi-statement requests, flushing at the
/// statement cap or when the next statement would cross the request-size
/// limit. Never emits an empty request.
pub struct StatementBatcher {
    statements: Vec<String>,
    bytes: usize,
    max_statements: usize,
    max_bytes: usize,
}

impl Default for StatementBatcher {
    fn default() -> Self {
        Self::new(MAX_STATEMENTS_PER_REQUEST, MAX_REQUEST_BYTES)
    }
}

impl StatementBatcher {
    pub fn new(max_statements: usize, max_bytes: usize) -> Self {
        Self {
            statements: Vec::new(),
            bytes: 0,
            max_statements,
            max_bytes,
        }
    }

    /// Add a statement; returns a finished batch when one fills up.
    pub fn push(&mut self, statement: String) -> Option<String> {
        let mut flushed = None;
        if !self.statements.is_empty()
            && (self.statements.len() >= self.max_statements
                || self.bytes + statement.len() > self.max_bytes)
        {
            flushed = self.flush();
        }
        self.bytes += statement.len() + 1;
        self.statements.push(statement);
        flushed
    }

    /// Drain whatever is pending into one request body.
    pub fn flush(&mut self) -> Option<String> {
        if self.statements.is_empty() {
            return None;
        }
        self.bytes = 0;
        Some(std::mem::take(&mut self.statements).join("\n"))
    }
}

/// Inline-SQL escaping: NULL for absent values, bare numerics, and
/// single-quote doubling for text.
pub fn escape_str(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn escape_opt_str(value: Option<&str>) -> String {
    match value {
        Some(s) => escape_str(s),
        None => "NULL".to_string(),
    }
}

pub fn escape_opt_i64(value: Option<i64>) -> String {
    match value {
        Some(n) => n.to_string(),
        None => "NULL".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_str_doubles_quotes() {
        assert_eq!(escape_str("O'FALLON'S"), "'O''FALLON''S'");
        assert_eq!(escape_str("plain"), "'plain'");
    }

    #[test]
    fn test_escape_optionals() {
        assert_eq!(escape_opt_str(None), "NULL");
        assert_eq!(escape_opt_str(Some("x")), "'x'");
        assert_eq!(escape_opt_i64(None), "NULL");
        assert_eq!(escape_opt_i64(Some(7)), "7");
    }

    #[test]
    fn test_batcher_statement_cap() {
        let mut batcher = StatementBatcher::new(3, 10_000);
        assert!(batcher.push("a;".to_string()).is_none());
        assert!(batcher.push("b;".to_string()).is_none());
        assert!(batcher.push("c;".to_string()).is_none());
        // Fourth push flushes the first three.
        let batch = batcher.push("d;".to_string()).unwrap();
        assert_eq!(batch, "a;\nb;\nc;");
        assert_eq!(batcher.flush().unwrap(), "d;");
        assert!(batcher.flush().is_none());
    }

    #[test]
    fn test_batcher_byte_cap() {
        let mut batcher = StatementBatcher::new(100, 30);
        assert!(batcher.push("x".repeat(20)).is_none());
        // 20 + 25 crosses the 30-byte cap, so the first statement flushes.
        let batch = batcher.push("y".repeat(25)).unwrap();
        assert_eq!(batch.len(), 20);
    }

    #[test]
    fn test_batcher_never_emits_empty() {
        let mut batcher = StatementBatcher::new(1, 5);
        // A single oversized statement still goes out alone.
        assert!(batcher.push("z".repeat(50)).is_none());
        assert_eq!(batcher.flush().unwrap().len(), 50);
    }

    #[test]
    fn test_response_envelope_shape() {
        let body = r#"{
            "success": true,
            "result": [
                {"results": [{"cnt": 3}], "meta": {"changes": 0, "last_row_id": 0}},
                {"results": [], "meta": {"changes": 12, "last_row_id": 17}}
            ]
        }"#;
        let parsed: D1Response = serde_json::from_str(body).unwrap();
        assert!(parsed.success);
        assert_eq!(parsed.result.len(), 2);
        assert_eq!(parsed.result[0].results[0]["cnt"], 3);
        assert_eq!(parsed.result[1].meta.changes, 12);
        assert_eq!(parsed.result[1].meta.last_row_id, 17);
    }
}
