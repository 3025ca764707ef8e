//! Shared RPC utilities for interacting with Ethereum JSON-RPC endpoints.

use std::{future::Future, time::Duration};

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Create an HTTP client configured for JSON-RPC and explorer requests.
pub fn create_client(timeout: Duration) -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

/// Make a JSON-RPC call and deserialize the result.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The RPC endpoint URL
/// * `method` - The RPC method name
/// * `params` - The method parameters
///
/// # Returns
/// The deserialized result, or an error if the request failed or returned an error response.
/// Revert data attached to an error response is included in the error message.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .with_context(|| format!("Failed to send {} request", method))?;

    let result: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))?;

    if let Some(error) = result.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown");

        match error.get("data").filter(|d| !d.is_null()) {
            Some(data) => anyhow::bail!("RPC error in {}: {} (data: {})", method, message, data),
            None => anyhow::bail!("RPC error in {}: {}", method, message),
        }
    }

    let result_value = result
        .get("result")
        .with_context(|| format!("No result in {} response", method))?
        .clone();

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {} result", method))
}

/// Poll `check_fn` until it yields a value.
///
/// `check_fn` returns `Ok(None)` while the awaited condition does not hold yet. Errors are
/// logged and polling continues, so transient RPC failures do not abort the wait.
///
/// # Arguments
/// * `what` - What is being waited for (for error messages)
/// * `timeout` - Maximum time to wait
/// * `interval` - Delay between two checks
/// * `check_fn` - Function returning the value once available
pub async fn poll_until<T, F, Fut>(
    what: &str,
    timeout: Duration,
    interval: Duration,
    check_fn: F,
) -> Result<T, anyhow::Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Option<T>, anyhow::Error>>,
{
    let start = std::time::Instant::now();

    loop {
        match check_fn().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {
                tracing::trace!(what = %what, "Not ready yet, retrying...");
            }
            Err(e) => {
                tracing::debug!(error = %e, what = %what, "Check failed, retrying...");
            }
        }

        if start.elapsed() + interval > timeout {
            anyhow::bail!("Timeout after {:?} waiting for {}", timeout, what);
        }

        tokio::time::sleep(interval).await;
    }
}
