//! blockdebug-rpc — in-process per-block debugger speaking JSON-RPC over HTTP.
//!
//! [`RpcDebugger`] is a drop-in replacement for the external `debug_block`
//! program: it traces a block with the tracer matching the request's
//! [`RpcFlavor`](blockdebug_core::RpcFlavor), applying the forwarded retry
//! policy to every HTTP call, and optionally writes the trace to
//! `<output_dir>/<block>.json`.

pub mod error;
pub mod request;
pub mod trace;
pub mod transport;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use blockdebug_core::{BlockDebugger, DebugRequest, InvocationError};

pub use error::RpcError;
pub use trace::{trace_block, BlockTrace, TxTrace};
pub use transport::{HttpTransport, RpcTransport};

/// Configuration for [`RpcDebugger`].
#[derive(Debug, Clone)]
pub struct RpcDebuggerConfig {
    /// Directory receiving one `<block>.json` per traced block. `None` discards traces.
    pub output_dir: Option<PathBuf>,
    /// Timeout per HTTP request.
    pub request_timeout: Duration,
}

impl Default for RpcDebuggerConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Traces blocks in-process against the request's endpoint.
pub struct RpcDebugger {
    http: reqwest::Client,
    config: RpcDebuggerConfig,
}

impl RpcDebugger {
    pub fn new(config: RpcDebuggerConfig) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| RpcError::Http(e.to_string()))?;
        Ok(Self { http, config })
    }

    /// Trace `req.block` over `transport` and persist the result.
    pub async fn debug_with<T: RpcTransport>(
        &self,
        transport: &T,
        req: &DebugRequest,
    ) -> Result<(), InvocationError> {
        let trace = trace_block(transport, &req.target.flavor, req.block)
            .await?
            .ok_or_else(|| InvocationError::UnsupportedFlavor(req.target.flavor.to_string()))?;

        let bytes = serde_json::to_vec(&trace)?;
        tracing::info!(
            block = req.block,
            chain_id = %trace.chain_id,
            txs = trace.transactions.len(),
            bytes = bytes.len(),
            url = transport.url(),
            "block traced"
        );

        if let Some(dir) = &self.config.output_dir {
            tokio::fs::create_dir_all(dir).await?;
            let path = dir.join(format!("{}.json", req.block));
            tokio::fs::write(&path, &bytes).await?;
            tracing::debug!(path = %path.display(), "trace written");
        }
        Ok(())
    }
}

#[async_trait]
impl BlockDebugger for RpcDebugger {
    async fn invoke(&self, req: &DebugRequest) -> Result<(), InvocationError> {
        let transport = HttpTransport::new(&req.target.endpoint, self.http.clone(), req.retry);
        self.debug_with(&transport, req).await
    }

    fn name(&self) -> &str {
        "rpc"
    }
}
