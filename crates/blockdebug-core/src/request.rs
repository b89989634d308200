//! Per-block debug request and its recorded outcome.

use serde::{Deserialize, Serialize};

use crate::error::InvocationError;
use crate::types::{RetryPolicy, RpcTarget};

/// Everything a per-block debugger receives for one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugRequest {
    pub block: u64,
    pub target: RpcTarget,
    pub retry: RetryPolicy,
}

impl DebugRequest {
    pub fn new(block: u64, target: RpcTarget, retry: RetryPolicy) -> Self {
        Self {
            block,
            target,
            retry,
        }
    }

    /// The five forwarded parameters in their fixed order:
    /// `block endpoint flavor backoff_millis max_retries`.
    pub fn args(&self) -> [String; 5] {
        [
            self.block.to_string(),
            self.target.endpoint.clone(),
            self.target.flavor.to_string(),
            self.retry.backoff_millis.to_string(),
            self.retry.max_retries.to_string(),
        ]
    }
}

impl std::fmt::Display for DebugRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "block {} via {} ({}), backoff {}ms, max retries {}",
            self.block,
            self.target.endpoint,
            self.target.flavor,
            self.retry.backoff_millis,
            self.retry.max_retries
        )
    }
}

/// Whether the debugger finished a block cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum InvocationOutcome {
    Success,
    Failure(String),
}

/// Recorded result of one block's invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationResult {
    pub block: u64,
    #[serde(flatten)]
    pub outcome: InvocationOutcome,
}

impl InvocationResult {
    pub fn from_result(block: u64, result: Result<(), InvocationError>) -> Self {
        let outcome = match result {
            Ok(()) => InvocationOutcome::Success,
            Err(e) => InvocationOutcome::Failure(e.to_string()),
        };
        Self { block, outcome }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, InvocationOutcome::Success)
    }

    /// Failure reason, if the invocation failed.
    pub fn failure(&self) -> Option<&str> {
        match &self.outcome {
            InvocationOutcome::Success => None,
            InvocationOutcome::Failure(reason) => Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RpcFlavor;

    fn target() -> RpcTarget {
        RpcTarget {
            endpoint: "http://host:8545".into(),
            flavor: RpcFlavor::Native,
        }
    }

    #[test]
    fn args_follow_fixed_order() {
        let req = DebugRequest::new(100, target(), RetryPolicy::new(500, 3));
        assert_eq!(
            req.args(),
            ["100", "http://host:8545", "native", "500", "3"].map(String::from)
        );
    }

    #[test]
    fn failure_keeps_reason() {
        let r = InvocationResult::from_result(7, Err(InvocationError::ExitStatus { code: 2 }));
        assert!(!r.is_success());
        assert_eq!(r.failure(), Some("debugger exited with status 2"));
    }

    #[test]
    fn result_serializes_flat() {
        let r = InvocationResult::from_result(7, Ok(()));
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json, serde_json::json!({"block": 7, "outcome": "success"}));
    }
}
