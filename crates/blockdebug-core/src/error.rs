//! Driver and invocation error types.

use thiserror::Error;

/// Errors that abort a batch before any block is dispatched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DriverError {
    /// A required parameter is missing or outside its domain.
    #[error("invalid argument `{field}`: {reason}")]
    InvalidArgument { field: &'static str, reason: String },
}

impl DriverError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            reason: reason.into(),
        }
    }
}

/// Errors reported by a single per-block debugger invocation.
///
/// These never abort the batch; the driver records them as failures and
/// moves on to the next block.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// The debugger process could not be started (missing executable, permissions, ...).
    #[error("failed to start debugger `{program}`: {reason}")]
    Spawn { program: String, reason: String },

    /// The debugger process exited with a non-zero status.
    #[error("debugger exited with status {code}")]
    ExitStatus { code: i32 },

    /// The debugger process was terminated without an exit code (e.g. by a signal).
    #[error("debugger terminated without an exit code")]
    Terminated,

    /// JSON-RPC error returned by the node, or a missing block.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// Transport failure after the forwarded retries were exhausted.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The in-process debugger has no implementation for this flavor.
    #[error("unsupported RPC flavor `{0}`")]
    UnsupportedFlavor(String),

    /// Writing debugger output failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A response or trace could not be (de)serialized.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),
}

impl InvocationError {
    /// Returns `true` if the debugger never ran for this block.
    pub fn is_spawn_failure(&self) -> bool {
        matches!(self, Self::Spawn { .. } | Self::UnsupportedFlavor(_))
    }
}
