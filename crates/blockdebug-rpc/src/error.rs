//! RPC-level error types.

use thiserror::Error;

use blockdebug_core::InvocationError;

use crate::request::JsonRpcError;

/// Errors that can occur while tracing a block over JSON-RPC.
#[derive(Debug, Error)]
pub enum RpcError {
    /// HTTP request failed (connection refused, timeout, non-2xx status).
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON-RPC protocol-level error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// The node does not know the requested block.
    #[error("block {0} does not exist")]
    BlockNotFound(u64),

    /// Response could not be deserialized.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),
}

impl RpcError {
    /// Returns `true` if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_))
    }
}

impl From<RpcError> for InvocationError {
    fn from(e: RpcError) -> Self {
        match e {
            RpcError::Http(msg) => InvocationError::Http(msg),
            RpcError::Deserialization(e) => InvocationError::Deserialization(e),
            RpcError::Rpc(e) => InvocationError::Rpc(format!("{} (code {})", e.message, e.code)),
            RpcError::BlockNotFound(block) => {
                InvocationError::Rpc(format!("block {block} does not exist"))
            }
        }
    }
}
