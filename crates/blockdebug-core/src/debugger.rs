//! The `BlockDebugger` trait — the capability the driver dispatches to.

use async_trait::async_trait;

use crate::error::InvocationError;
use crate::request::DebugRequest;

/// Traces one block against an RPC endpoint.
///
/// Implementations own any retry behaviour, applying up to
/// `req.retry.max_retries` retries spaced by `req.retry.backoff_millis`.
/// The driver only looks at whether the call returned `Ok`.
///
/// # Object Safety
/// The trait is object-safe and can be stored as `Arc<dyn BlockDebugger>`.
#[async_trait]
pub trait BlockDebugger: Send + Sync + 'static {
    /// Debug a single block.
    async fn invoke(&self, req: &DebugRequest) -> Result<(), InvocationError>;

    /// Short identifier used in logs (program path, "rpc", ...).
    fn name(&self) -> &str;
}

