//! The `RpcTransport` trait and its HTTP implementation.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use blockdebug_core::RetryPolicy;

use crate::error::RpcError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};

/// Sends JSON-RPC requests to a single endpoint.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Send a single JSON-RPC request and return the response.
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, RpcError>;

    /// Return the transport's endpoint URL.
    fn url(&self) -> &str;

    /// Next request id.
    fn next_id(&self) -> u64;

    /// Convenience: call a method and deserialize the result.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, RpcError> {
        let req = JsonRpcRequest::new(self.next_id(), method, params);
        let resp = self.send(req).await?;
        let result = resp.into_result().map_err(RpcError::Rpc)?;
        serde_json::from_value(result).map_err(RpcError::Deserialization)
    }
}

/// Run `attempt_fn` until it succeeds, fails with a non-retryable error, or
/// `policy.max_retries` retries spaced by `policy.backoff_millis` are used up.
pub async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    url: &str,
    mut attempt_fn: F,
) -> Result<T, RpcError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RpcError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match attempt_fn().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() => match policy.next_delay(attempt) {
                Some(delay) => {
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        url,
                        "retrying request"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    tracing::error!(attempt, error = %e, url, "max retries exceeded");
                    return Err(e);
                }
            },
            Err(e) => return Err(e),
        }
    }
}

/// HTTP JSON-RPC transport that retries transient failures per a [`RetryPolicy`].
pub struct HttpTransport {
    url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
    ids: AtomicU64,
}

impl HttpTransport {
    /// `http` is shared so connection pools survive across blocks.
    pub fn new(url: impl Into<String>, http: reqwest::Client, retry: RetryPolicy) -> Self {
        Self {
            url: url.into(),
            http,
            retry,
            ids: AtomicU64::new(1),
        }
    }

    async fn send_once(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, RpcError> {
        let resp = self
            .http
            .post(&self.url)
            .json(req)
            .send()
            .await
            .map_err(|e| RpcError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RpcError::Http(format!("HTTP {status}: {body}")));
        }

        resp.json::<JsonRpcResponse>()
            .await
            .map_err(|e| RpcError::Http(e.to_string()))
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, RpcError> {
        tracing::trace!(method = %req.method, url = %self.url, "sending request");
        with_retry(self.retry, &self.url, || self.send_once(&req)).await
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn next_id(&self) -> u64 {
        self.ids.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::{Duration, Instant};

    async fn flaky(calls: &AtomicU32, failures: u32) -> Result<u32, RpcError> {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= failures {
            Err(RpcError::Http("connection reset".into()))
        } else {
            Ok(n)
        }
    }

    #[tokio::test]
    async fn default_policy_is_single_attempt() {
        let calls = AtomicU32::new(0);
        let err = with_retry(RetryPolicy::default(), "mock", || flaky(&calls, 1))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let n = with_retry(RetryPolicy::new(1, 3), "mock", || flaky(&calls, 2))
            .await
            .unwrap();
        assert_eq!(n, 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();
        let result = with_retry(RetryPolicy::new(20, 2), "mock", || flaky(&calls, 10)).await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn node_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(RetryPolicy::new(1, 5), "mock", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RpcError::BlockNotFound(9))
        })
        .await;
        assert!(matches!(result, Err(RpcError::BlockNotFound(9))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
