//! blockdebug-process — run an external per-block debugger as a subprocess.
//!
//! The external program is invoked once per block as
//! ```text
//! <program> [extra_args..] <block> <rpcEndpoint> <rpcFlavor> <backoffMillis> <maxRetries>
//! ```
//! and reports success through a zero exit status. Its stdout and stderr are
//! inherited so operators see its output inline with the driver's progress.
//! On unix each debugger runs in its own process group, so an interrupt sent
//! to the driver's foreground group does not kill a block mid-trace.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use blockdebug_core::{BlockDebugger, DebugRequest, InvocationError};

/// Default executable name, resolved through `PATH`.
pub const DEFAULT_PROGRAM: &str = "debug_block";

/// Configuration for [`ProcessDebugger`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessDebuggerConfig {
    /// Executable to run for each block.
    pub program: PathBuf,
    /// Arguments placed before the five per-block parameters.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for ProcessDebuggerConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_PROGRAM),
            extra_args: Vec::new(),
        }
    }
}

/// Dispatches each block to an external debugger process.
pub struct ProcessDebugger {
    config: ProcessDebuggerConfig,
    name: String,
}

impl ProcessDebugger {
    pub fn new(config: ProcessDebuggerConfig) -> Self {
        let name = config.program.display().to_string();
        Self { config, name }
    }

    /// Create with a program path and no extra arguments.
    pub fn for_program(program: impl Into<PathBuf>) -> Self {
        Self::new(ProcessDebuggerConfig {
            program: program.into(),
            ..Default::default()
        })
    }

    fn command(&self, req: &DebugRequest) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.extra_args)
            .args(req.args())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(false);
        // Own process group: a terminal Ctrl-C reaches the driver only, which
        // lets in-flight blocks finish.
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }
}

impl Default for ProcessDebugger {
    fn default() -> Self {
        Self::new(ProcessDebuggerConfig::default())
    }
}

#[async_trait]
impl BlockDebugger for ProcessDebugger {
    async fn invoke(&self, req: &DebugRequest) -> Result<(), InvocationError> {
        tracing::debug!(program = %self.name, args = ?req.args(), "spawning debugger");

        let status = self
            .command(req)
            .status()
            .await
            .map_err(|e| InvocationError::Spawn {
                program: self.name.clone(),
                reason: e.to_string(),
            })?;

        if status.success() {
            return Ok(());
        }
        match status.code() {
            Some(code) => Err(InvocationError::ExitStatus { code }),
            None => Err(InvocationError::Terminated),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
