//! Shared utilities for talking to an Ethereum JSON-RPC endpoint.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::error::ChainError;

/// Default timeout for a single RPC request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Attempts made for a read-only request before giving up.
const READ_RETRIES: usize = 3;

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client(timeout: Duration) -> Result<reqwest::Client, ChainError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ChainError::Transport {
            method: "client".to_string(),
            reason: e.to_string(),
        })
}

/// Make a JSON-RPC call and deserialize the result.
///
/// A JSON-RPC error object becomes [`ChainError::Rpc`]; anything that prevents
/// reading a response becomes [`ChainError::Transport`].
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &Url,
    method: &str,
    params: Vec<Value>,
) -> Result<T, ChainError> {
    let transport = |reason: String| ChainError::Transport {
        method: method.to_string(),
        reason,
    };

    let response = client
        .post(url.clone())
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .map_err(|e| transport(e.to_string()))?;

    let result: Value = response
        .json()
        .await
        .map_err(|e| transport(format!("failed to parse response: {e}")))?;

    if let Some(error) = result.get("error") {
        return Err(rpc_error(method, error));
    }

    let result_value = result
        .get("result")
        .cloned()
        .ok_or_else(|| transport("no result in response".to_string()))?;

    serde_json::from_value(result_value)
        .map_err(|e| transport(format!("failed to deserialize result: {e}")))
}

/// Make an idempotent JSON-RPC call, retrying transport failures with backoff.
///
/// Only use this for reads: a retried write could land twice.
pub async fn read_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &Url,
    method: &str,
    params: Vec<Value>,
) -> Result<T, ChainError> {
    (|| json_rpc_call(client, url, method, params.clone()))
        .retry(ExponentialBuilder::default().with_max_times(READ_RETRIES))
        .when(ChainError::is_transient)
        .notify(|e, after| {
            tracing::debug!(error = %e, method, retry_in = ?after, "RPC read failed, retrying...");
        })
        .await
}

/// Poll `check_fn` every `interval` until it yields a value or `timeout` elapses.
///
/// Returns `Ok(None)` on timeout. Errors from `check_fn` end the wait immediately.
pub async fn poll_until<T, F, Fut>(
    name: &str,
    timeout: Duration,
    interval: Duration,
    check_fn: F,
) -> Result<Option<T>, ChainError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Option<T>, ChainError>>,
{
    let start = tokio::time::Instant::now();

    loop {
        if let Some(value) = check_fn().await? {
            return Ok(Some(value));
        }

        if start.elapsed() >= timeout {
            return Ok(None);
        }

        tracing::trace!(what = %name, "Not ready yet, polling again...");
        tokio::time::sleep(interval).await;
    }
}

fn rpc_error(method: &str, error: &Value) -> ChainError {
    let mut message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();

    // Revert payloads travel in `data`, either as a hex string or nested.
    match error.get("data") {
        Some(Value::String(data)) => message = format!("{message} (data: {data})"),
        Some(Value::Object(obj)) => {
            if let Some(data) = obj.get("data").and_then(Value::as_str) {
                message = format!("{message} (data: {data})");
            }
        }
        _ => {}
    }

    ChainError::Rpc {
        method: method.to_string(),
        code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
        message,
    }
}
