//! Batch outcome and summary counts.

use serde::{Deserialize, Serialize};

use crate::request::InvocationResult;
use crate::types::BlockRange;

/// How a batch terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Every block in the range was dispatched.
    Completed,
    /// A stop request was observed before the range was exhausted.
    Cancelled,
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Succeeded / failed / never-dispatched counts for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub succeeded: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl std::fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed, {} cancelled",
            self.succeeded, self.failed, self.cancelled
        )
    }
}

/// Results of a batch run, in ascending block order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub status: BatchStatus,
    pub range: BlockRange,
    pub results: Vec<InvocationResult>,
}

impl BatchReport {
    pub fn succeeded(&self) -> u64 {
        self.results.iter().filter(|r| r.is_success()).count() as u64
    }

    pub fn failed(&self) -> u64 {
        self.results.len() as u64 - self.succeeded()
    }

    /// Planned blocks that were never dispatched.
    pub fn cancelled(&self) -> u64 {
        self.range.count - self.results.len() as u64
    }

    pub fn has_failures(&self) -> bool {
        self.results.iter().any(|r| !r.is_success())
    }

    /// Blocks whose invocation failed — the set to re-run on recovery.
    pub fn failed_blocks(&self) -> Vec<u64> {
        self.results
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.block)
            .collect()
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            succeeded: self.succeeded(),
            failed: self.failed(),
            cancelled: self.cancelled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::InvocationOutcome;

    fn result(block: u64, ok: bool) -> InvocationResult {
        InvocationResult {
            block,
            outcome: if ok {
                InvocationOutcome::Success
            } else {
                InvocationOutcome::Failure("boom".into())
            },
        }
    }

    #[test]
    fn summary_counts_partial_batch() {
        let report = BatchReport {
            status: BatchStatus::Cancelled,
            range: BlockRange { start: 10, count: 5 },
            results: vec![result(10, true), result(11, false), result(12, true)],
        };
        let summary = report.summary();
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.cancelled, 2);
        assert_eq!(report.failed_blocks(), vec![11]);
        assert_eq!(summary.to_string(), "2 succeeded, 1 failed, 2 cancelled");
    }
}
