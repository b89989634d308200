//! blockdebug CLI — debug every block in a range against an RPC endpoint.
//!
//! Usage:
//! ```bash
//! # Trace blocks 100..103 with the external `debug_block` program
//! blockdebug 100 3 http://localhost:8545 native
//!
//! # Forward a 500ms backoff and 5 retries, fail the process if any block fails
//! blockdebug 19000000 50 https://rpc.example.org jerigon 500 5 --strict
//!
//! # Trace in-process and keep the traces
//! blockdebug 100 3 http://localhost:8545 native --in-process --output-dir traces/
//! ```

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;

use blockdebug_core::{
    BatchDebugDriver, BatchReport, BatchRequest, BatchStatus, BlockDebugger, CancellationToken,
    DriverConfig, DriverEvent,
};
use blockdebug_process::{ProcessDebugger, ProcessDebuggerConfig, DEFAULT_PROGRAM};
use blockdebug_rpc::{RpcDebugger, RpcDebuggerConfig};

mod logging;

use logging::LogConfig;

/// Exit code for bad or missing arguments.
const EXIT_USAGE: i32 = 1;
/// Exit code under `--strict` when at least one block failed.
const EXIT_BLOCK_FAILURES: i32 = 2;
/// Exit code when the batch was interrupted (128 + SIGINT).
const EXIT_CANCELLED: i32 = 130;

#[derive(Debug, Parser)]
#[command(
    name = "blockdebug",
    about = "Debug a contiguous range of blocks against a JSON-RPC endpoint",
    long_about = "
Runs the per-block debugger once for every block in [startBlock, startBlock + numBlocks),
in ascending order, forwarding the endpoint, RPC flavor, backoff and retry count.
A failed block is reported and the batch continues.

ENVIRONMENT VARIABLES:
  BLOCKDEBUG_DEBUGGER      External per-block debugger (default: debug_block)
  BLOCKDEBUG_IN_PROCESS    Trace in-process instead of spawning the debugger
  BLOCKDEBUG_OUTPUT_DIR    Where in-process traces are written
  BLOCKDEBUG_CONCURRENCY   Blocks in flight at once (default: 1)
  BLOCKDEBUG_LOG           Log filter directives (default: info)
",
    version,
    allow_negative_numbers = true
)]
struct Cli {
    /// First block to debug
    start_block: i64,
    /// Number of consecutive blocks to debug (0 is a no-op)
    num_blocks: i64,
    /// JSON-RPC endpoint URL
    rpc_endpoint: String,
    /// RPC flavor, forwarded verbatim (e.g. jerigon, native)
    rpc_flavor: String,
    /// Delay between RPC retries in milliseconds [default: 0]
    backoff_millis: Option<i64>,
    /// Maximum RPC retries per block [default: 0]
    max_retries: Option<i64>,

    /// External per-block debugger executable
    #[arg(long, env = "BLOCKDEBUG_DEBUGGER", default_value = DEFAULT_PROGRAM)]
    debugger: PathBuf,
    /// Extra argument passed to the debugger before the block parameters (repeatable)
    #[arg(long = "debugger-arg", value_name = "ARG", allow_hyphen_values = true)]
    debugger_args: Vec<String>,
    /// Trace blocks in-process over HTTP instead of spawning the debugger
    #[arg(long, env = "BLOCKDEBUG_IN_PROCESS")]
    in_process: bool,
    /// Directory for in-process `<block>.json` traces
    #[arg(long, env = "BLOCKDEBUG_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,
    /// Number of blocks in flight at once
    #[arg(long, env = "BLOCKDEBUG_CONCURRENCY", default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    concurrency: u16,
    /// Exit with status 2 if any block failed
    #[arg(long)]
    strict: bool,
    /// Write the batch report as JSON to this file
    #[arg(long)]
    report: Option<PathBuf>,
    /// Log filter directives
    #[arg(long, env = "BLOCKDEBUG_LOG", default_value = "info")]
    log_level: String,
    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn batch_request(&self) -> BatchRequest {
        BatchRequest {
            start_block: self.start_block,
            num_blocks: self.num_blocks,
            endpoint: self.rpc_endpoint.clone(),
            flavor: self.rpc_flavor.clone(),
            backoff_millis: self.backoff_millis,
            max_retries: self.max_retries,
        }
    }

    fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level.clone(),
            json: self.log_json,
        }
    }

    fn build_debugger(&self) -> anyhow::Result<Arc<dyn BlockDebugger>> {
        if self.in_process {
            let debugger = RpcDebugger::new(RpcDebuggerConfig {
                output_dir: self.output_dir.clone(),
                ..Default::default()
            })
            .context("failed to build RPC client")?;
            return Ok(Arc::new(debugger));
        }
        Ok(Arc::new(ProcessDebugger::new(ProcessDebuggerConfig {
            program: self.debugger.clone(),
            extra_args: self.debugger_args.clone(),
        })))
    }
}

/// Parse arguments; `Err` carries the exit code for usage problems.
fn parse_args<I, T>(args: I) -> Result<Cli, (clap::Error, i32)>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args).map_err(|e| {
        let code = match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
            _ => EXIT_USAGE,
        };
        (e, code)
    })
}

/// Exit code for a finished batch.
fn exit_code(report: &BatchReport, strict: bool) -> i32 {
    match report.status {
        BatchStatus::Cancelled => EXIT_CANCELLED,
        BatchStatus::Completed if strict && report.has_failures() => EXIT_BLOCK_FAILURES,
        BatchStatus::Completed => 0,
    }
}

fn print_event(event: &DriverEvent) {
    match event {
        DriverEvent::Failed { .. } | DriverEvent::Cancelled { .. } => eprintln!("{event}"),
        _ => println!("{event}"),
    }
}

/// First Ctrl-C stops dispatching and lets in-flight blocks finish; a second
/// one exits immediately.
fn watch_interrupts(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!("interrupt received, finishing in-flight blocks (again to abort)");
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("second interrupt received, aborting");
            process::exit(EXIT_CANCELLED);
        }
    });
}

#[tokio::main]
async fn main() {
    let cli = match parse_args(std::env::args_os()) {
        Ok(cli) => cli,
        Err((e, code)) => {
            // Help and version go to stdout, usage errors to stderr.
            let _ = e.print();
            process::exit(code);
        }
    };

    logging::init_tracing(&cli.log_config());

    match run(&cli).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(EXIT_USAGE);
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<i32> {
    let request = cli.batch_request();
    // Reject bad input before spawning anything.
    request.validate()?;

    let cancel = CancellationToken::new();
    watch_interrupts(cancel.clone());

    let driver = BatchDebugDriver::new(cli.build_debugger()?)
        .with_config(DriverConfig {
            concurrency: usize::from(cli.concurrency),
        })
        .with_cancellation(cancel)
        .on_event(print_event);

    let report = driver.run(&request).await?;

    if let Some(path) = &cli.report {
        let json = serde_json::to_vec_pretty(&report)?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("failed to write report to {}", path.display()))?;
    }

    Ok(exit_code(&report, cli.strict))
}
