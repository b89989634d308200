//! blockdebug-core — block range driver and debugger capability for blockdebug.
//!
//! # Overview
//!
//! blockdebug walks a contiguous range of blocks and asks a per-block
//! debugger to trace each one against a JSON-RPC endpoint. The core crate
//! defines:
//!
//! - [`BlockDebugger`] — the async capability every per-block debugger implements
//! - [`BatchDebugDriver`] — the sequential (or bounded-concurrent) range driver
//! - [`BlockRange`] / [`RpcTarget`] / [`RetryPolicy`] — the forwarded parameters
//! - [`BatchReport`] — per-block outcomes plus summary counts
//! - [`DriverError`] / [`InvocationError`] — structured error types

pub mod debugger;
pub mod driver;
pub mod error;
pub mod report;
pub mod request;
pub mod types;

pub use debugger::BlockDebugger;
pub use driver::{BatchDebugDriver, BatchRequest, DriverConfig, DriverEvent};
pub use error::{DriverError, InvocationError};
pub use report::{BatchReport, BatchStatus, BatchSummary};
pub use request::{DebugRequest, InvocationOutcome, InvocationResult};
pub use types::{BlockRange, RetryPolicy, RpcFlavor, RpcTarget};

pub use tokio_util::sync::CancellationToken;
