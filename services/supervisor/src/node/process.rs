//! OS process runtime for the node binary.
//!
//! Launch is synchronous from the caller's point of view: the child is
//! spawned and then watched for `liveness_window`. A child that exits inside
//! the window is reported as a failed start instead of a handle.
//!
//! Termination sends SIGTERM and waits up to `termination_grace` for the
//! child to exit. A child still running after the grace period is killed with
//! SIGKILL so that two nodes never share a data directory.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::error::NodeError;
use super::runtime::{NodeHandle, NodeRuntime};
use super::LaunchSpec;

/// Default time a freshly spawned node must stay up.
const DEFAULT_LIVENESS_WINDOW: Duration = Duration::from_secs(3);

/// Default wait between SIGTERM and SIGKILL.
const DEFAULT_TERMINATION_GRACE: Duration = Duration::from_secs(30);

/// Timing for [`ProcessRuntime`].
#[derive(Debug, Clone)]
pub struct ProcessRuntimeConfig {
    pub liveness_window: Duration,
    pub termination_grace: Duration,
}

impl Default for ProcessRuntimeConfig {
    fn default() -> Self {
        Self {
            liveness_window: DEFAULT_LIVENESS_WINDOW,
            termination_grace: DEFAULT_TERMINATION_GRACE,
        }
    }
}

/// Runs the node binary as a child of the supervisor.
pub struct ProcessRuntime {
    config: ProcessRuntimeConfig,
}

impl ProcessRuntime {
    pub fn new(config: ProcessRuntimeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProcessRuntimeConfig {
        &self.config
    }

    fn command(spec: &LaunchSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args).stdin(Stdio::null());
        cmd
    }
}

impl Default for ProcessRuntime {
    fn default() -> Self {
        Self::new(ProcessRuntimeConfig::default())
    }
}

#[async_trait]
impl NodeRuntime for ProcessRuntime {
    async fn launch(&self, spec: &LaunchSpec) -> Result<NodeHandle, NodeError> {
        let program = spec.program.display().to_string();
        debug!(program = %program, args = ?spec.args, "Spawning node");

        let mut child = Self::command(spec)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| NodeError::SpawnFailed {
                program: program.clone(),
                source,
            })?;

        let Some(pid) = child.id() else {
            let status = child.wait().await?;
            return Err(NodeError::ExitedDuringStartup {
                pid: 0,
                status: status.to_string(),
            });
        };

        let startup = timeout(self.config.liveness_window, child.wait()).await;
        match startup {
            Ok(Ok(status)) => Err(NodeError::ExitedDuringStartup {
                pid,
                status: status.to_string(),
            }),
            Ok(Err(e)) => Err(NodeError::Io(e)),
            Err(_) => {
                info!(pid, program = %program, "Node process started");
                Ok(NodeHandle::new(pid, Some(child)))
            }
        }
    }

    async fn terminate(&self, handle: NodeHandle) -> Result<(), NodeError> {
        let pid = handle.pid();
        let Some(mut child) = handle.into_child() else {
            return Ok(());
        };

        if let Some(status) = child.try_wait()? {
            debug!(pid, status = %status, "Node process already exited");
            return Ok(());
        }

        match i32::try_from(pid) {
            Ok(raw) => {
                if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
                    warn!(pid, error = %e, "Failed to send SIGTERM");
                }
            }
            Err(_) => warn!(pid, "Pid out of range for signalling"),
        }

        let exited = timeout(self.config.termination_grace, child.wait()).await;
        match exited {
            Ok(Ok(status)) => {
                info!(pid, status = %status, "Node process terminated");
                Ok(())
            }
            Ok(Err(e)) => Err(NodeError::TerminationFailed {
                pid,
                reason: format!("wait failed: {e}"),
            }),
            Err(_) => {
                warn!(
                    pid,
                    grace_secs = self.config.termination_grace.as_secs(),
                    "Node ignored SIGTERM, sending SIGKILL"
                );
                child
                    .kill()
                    .await
                    .map_err(|e| NodeError::TerminationFailed {
                        pid,
                        reason: format!("SIGKILL failed: {e}"),
                    })?;
                info!(pid, "Node process killed");
                Ok(())
            }
        }
    }

    async fn is_running(&self, handle: &mut NodeHandle) -> bool {
        match handle.child_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    async fn exec(&self, spec: &LaunchSpec, limit: Duration) -> Result<Option<i32>, NodeError> {
        let program = spec.program.display().to_string();
        debug!(program = %program, args = ?spec.args, "Running command");

        let mut child = Self::command(spec)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| NodeError::SpawnFailed {
                program: program.clone(),
                source,
            })?;

        match timeout(limit, child.wait()).await {
            Ok(status) => Ok(status?.code()),
            Err(_) => Err(NodeError::CommandTimedOut {
                program,
                timeout: limit,
            }),
        }
    }
}
