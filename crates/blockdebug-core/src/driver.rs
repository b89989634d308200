//! The batch driver — walks a block range and dispatches one debug request per block.
//!
//! # Dispatch order
//! Blocks are dispatched in ascending order. With the default
//! `concurrency = 1` block `n + 1` is only dispatched once block `n` has
//! finished. A higher concurrency keeps up to that many invocations in flight
//! while still recording results in ascending order.
//!
//! # Failures
//! A failed invocation is recorded and the batch moves on. Only argument
//! validation aborts a run, and it does so before anything is dispatched.
//!
//! # Cancellation
//! The cancellation token is checked before each dispatch. In-flight
//! invocations always run to completion; the partial results are returned
//! with [`BatchStatus::Cancelled`].

use std::pin::pin;
use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::debugger::BlockDebugger;
use crate::error::DriverError;
use crate::report::{BatchReport, BatchStatus, BatchSummary};
use crate::request::{DebugRequest, InvocationResult};
use crate::types::{BlockRange, RetryPolicy, RpcTarget};

/// Driver tuning.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Maximum number of invocations in flight. `1` = strictly sequential.
    pub concurrency: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

/// Unvalidated batch parameters as supplied by a caller.
///
/// Numeric fields are signed so that out-of-domain input can be rejected
/// with [`DriverError::InvalidArgument`] instead of wrapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub start_block: i64,
    pub num_blocks: i64,
    pub endpoint: String,
    pub flavor: String,
    /// `None` behaves exactly like `Some(0)`.
    pub backoff_millis: Option<i64>,
    /// `None` behaves exactly like `Some(0)`.
    pub max_retries: Option<i64>,
}

impl BatchRequest {
    pub fn new(
        start_block: i64,
        num_blocks: i64,
        endpoint: impl Into<String>,
        flavor: impl Into<String>,
    ) -> Self {
        Self {
            start_block,
            num_blocks,
            endpoint: endpoint.into(),
            flavor: flavor.into(),
            backoff_millis: None,
            max_retries: None,
        }
    }

    pub fn backoff_millis(mut self, backoff_millis: i64) -> Self {
        self.backoff_millis = Some(backoff_millis);
        self
    }

    pub fn max_retries(mut self, max_retries: i64) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Check every parameter and convert to the typed form.
    pub fn validate(&self) -> Result<(BlockRange, RpcTarget, RetryPolicy), DriverError> {
        let start = non_negative("start_block", self.start_block)?;
        let count = non_negative("num_blocks", self.num_blocks)?;
        let range = BlockRange::new(start, count)?;
        let target = RpcTarget::new(self.endpoint.clone(), &self.flavor)?;

        let backoff_millis = non_negative("backoff_millis", self.backoff_millis.unwrap_or(0))?;
        let max_retries = non_negative("max_retries", self.max_retries.unwrap_or(0))?;
        let max_retries = u32::try_from(max_retries).map_err(|_| {
            DriverError::invalid("max_retries", format!("{max_retries} exceeds {}", u32::MAX))
        })?;

        Ok((range, target, RetryPolicy::new(backoff_millis, max_retries)))
    }
}

fn non_negative(field: &'static str, value: i64) -> Result<u64, DriverError> {
    u64::try_from(value).map_err(|_| DriverError::invalid(field, format!("{value} is negative")))
}

/// Progress emitted by the driver for operator visibility.
#[derive(Debug, Clone)]
pub enum DriverEvent {
    /// About to invoke the debugger for this request.
    Dispatching { request: DebugRequest },
    Succeeded { block: u64 },
    Failed { block: u64, reason: String },
    /// A stop request was seen; `next_block` and everything after it were skipped.
    Cancelled { next_block: u64, skipped: u64 },
    Finished { status: BatchStatus, summary: BatchSummary },
}

impl std::fmt::Display for DriverEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dispatching { request } => write!(f, "Debugging {request}"),
            Self::Succeeded { block } => write!(f, "Block {block} OK"),
            Self::Failed { block, reason } => write!(f, "Block {block} FAILED: {reason}"),
            Self::Cancelled { next_block, skipped } => write!(
                f,
                "Cancelled before block {next_block} ({skipped} blocks not dispatched)"
            ),
            Self::Finished { status, summary } => write!(f, "Batch {status}: {summary}"),
        }
    }
}

type EventSink = Arc<dyn Fn(&DriverEvent) + Send + Sync>;

/// Drives a [`BlockDebugger`] over a block range.
pub struct BatchDebugDriver {
    debugger: Arc<dyn BlockDebugger>,
    config: DriverConfig,
    cancel: CancellationToken,
    sink: Option<EventSink>,
}

impl BatchDebugDriver {
    pub fn new(debugger: Arc<dyn BlockDebugger>) -> Self {
        Self {
            debugger,
            config: DriverConfig::default(),
            cancel: CancellationToken::new(),
            sink: None,
        }
    }

    pub fn with_config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an externally owned token (e.g. one cancelled on Ctrl-C).
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Receive every [`DriverEvent`] as it happens.
    pub fn on_event(mut self, sink: impl Fn(&DriverEvent) + Send + Sync + 'static) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Validate `req` and run the batch.
    pub async fn run(&self, req: &BatchRequest) -> Result<BatchReport, DriverError> {
        let (range, target, retry) = req.validate()?;
        Ok(self.run_range(range, &target, retry).await)
    }

    /// Run an already-validated batch.
    pub async fn run_range(
        &self,
        range: BlockRange,
        target: &RpcTarget,
        retry: RetryPolicy,
    ) -> BatchReport {
        tracing::info!(
            start = range.start,
            count = range.count,
            endpoint = %target.endpoint,
            flavor = %target.flavor,
            backoff_ms = retry.backoff_millis,
            max_retries = retry.max_retries,
            debugger = self.debugger.name(),
            concurrency = self.config.concurrency,
            "Starting batch"
        );

        let results = if self.config.concurrency <= 1 {
            self.dispatch_sequential(range, target, retry).await
        } else {
            self.dispatch_buffered(range, target, retry).await
        };

        let status = if (results.len() as u64) < range.count {
            let next_block = range.start + results.len() as u64;
            let skipped = range.count - results.len() as u64;
            tracing::warn!(next_block, skipped, "Batch cancelled");
            self.emit(&DriverEvent::Cancelled {
                next_block,
                skipped,
            });
            BatchStatus::Cancelled
        } else {
            BatchStatus::Completed
        };

        let report = BatchReport {
            status,
            range,
            results,
        };
        let summary = report.summary();
        tracing::info!(
            %status,
            succeeded = summary.succeeded,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "Batch finished"
        );
        self.emit(&DriverEvent::Finished { status, summary });
        report
    }

    async fn dispatch_sequential(
        &self,
        range: BlockRange,
        target: &RpcTarget,
        retry: RetryPolicy,
    ) -> Vec<InvocationResult> {
        let mut results = Vec::new();
        for block in range.blocks() {
            if self.cancel.is_cancelled() {
                break;
            }
            let req = self.prepare(block, target, retry);
            let outcome = self.debugger.invoke(&req).await;
            let result = InvocationResult::from_result(block, outcome);
            self.record(&result);
            results.push(result);
        }
        results
    }

    async fn dispatch_buffered(
        &self,
        range: BlockRange,
        target: &RpcTarget,
        retry: RetryPolicy,
    ) -> Vec<InvocationResult> {
        let cancel = &self.cancel;
        let stream = futures::stream::iter(range.blocks())
            .take_while(|_| futures::future::ready(!cancel.is_cancelled()))
            .map(|block| {
                let req = self.prepare(block, target, retry);
                let debugger = Arc::clone(&self.debugger);
                async move {
                    let outcome = debugger.invoke(&req).await;
                    InvocationResult::from_result(block, outcome)
                }
            })
            .buffered(self.config.concurrency);
        let mut stream = pin!(stream);

        let mut results = Vec::new();
        while let Some(result) = stream.next().await {
            self.record(&result);
            results.push(result);
        }
        results
    }

    fn prepare(&self, block: u64, target: &RpcTarget, retry: RetryPolicy) -> DebugRequest {
        let req = DebugRequest::new(block, target.clone(), retry);
        tracing::info!(
            block,
            endpoint = %target.endpoint,
            flavor = %target.flavor,
            backoff_ms = retry.backoff_millis,
            max_retries = retry.max_retries,
            "Dispatching block"
        );
        self.emit(&DriverEvent::Dispatching {
            request: req.clone(),
        });
        req
    }

    fn record(&self, result: &InvocationResult) {
        match result.failure() {
            None => {
                tracing::debug!(block = result.block, "Block debugged");
                self.emit(&DriverEvent::Succeeded {
                    block: result.block,
                });
            }
            Some(reason) => {
                tracing::warn!(block = result.block, error = reason, "Block debug failed");
                self.emit(&DriverEvent::Failed {
                    block: result.block,
                    reason: reason.to_string(),
                });
            }
        }
    }

    fn emit(&self, event: &DriverEvent) {
        if let Some(sink) = &self.sink {
            sink(event);
        }
    }
}
