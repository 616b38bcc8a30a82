//! Node runtime interface and mock implementation.
//!
//! The runtime abstracts the OS side of the managed node:
//! - Launching the long-running `start` process and confirming it stays up
//! - Terminating it gracefully (with escalation)
//! - Running one-shot subcommands such as `prune`
//!
//! A mock implementation is provided for testing.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::process::Child;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::error::NodeError;
use super::LaunchSpec;

/// Handle to a running node process.
#[derive(Debug)]
pub struct NodeHandle {
    pid: u32,
    started_at: DateTime<Utc>,
    child: Option<Child>,
}

impl NodeHandle {
    pub(crate) fn new(pid: u32, child: Option<Child>) -> Self {
        Self {
            pid,
            started_at: Utc::now(),
            child,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub(crate) fn child_mut(&mut self) -> Option<&mut Child> {
        self.child.as_mut()
    }

    pub(crate) fn into_child(self) -> Option<Child> {
        self.child
    }
}

/// OS operations on the node binary.
#[async_trait]
pub trait NodeRuntime: Send + Sync {
    /// Spawn `spec` and confirm the process survives its startup window.
    async fn launch(&self, spec: &LaunchSpec) -> Result<NodeHandle, NodeError>;

    /// Stop the process and wait for it to exit.
    async fn terminate(&self, handle: NodeHandle) -> Result<(), NodeError>;

    /// Whether the process behind `handle` is still running.
    async fn is_running(&self, handle: &mut NodeHandle) -> bool;

    /// Run `spec` to completion and return its exit code
    /// (`None` if it was ended by a signal).
    async fn exec(&self, spec: &LaunchSpec, timeout: Duration) -> Result<Option<i32>, NodeError>;
}

/// A launch observed by [`MockRuntime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRecord {
    pub pid: u32,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl LaunchRecord {
    pub fn has_flag(&self, flag: &str) -> bool {
        self.args.iter().any(|a| a == flag)
    }

    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        super::flag_value(&self.args, flag)
    }
}

/// In-memory runtime for tests and dry runs.
pub struct MockRuntime {
    next_pid: AtomicU32,
    fail_launches: AtomicBool,
    fail_terminations: AtomicBool,
    exec_exit_code: Mutex<Option<i32>>,
    launches: Mutex<Vec<LaunchRecord>>,
    terminations: Mutex<Vec<u32>>,
    execs: Mutex<Vec<LaunchSpec>>,
    alive: Mutex<HashSet<u32>>,
}

impl MockRuntime {
    /// Create a mock runtime whose launches succeed.
    pub fn new() -> Self {
        Self {
            next_pid: AtomicU32::new(1000),
            fail_launches: AtomicBool::new(false),
            fail_terminations: AtomicBool::new(false),
            exec_exit_code: Mutex::new(Some(0)),
            launches: Mutex::new(Vec::new()),
            terminations: Mutex::new(Vec::new()),
            execs: Mutex::new(Vec::new()),
            alive: Mutex::new(HashSet::new()),
        }
    }

    /// Create a mock runtime that fails all launches.
    pub fn failing() -> Self {
        let runtime = Self::new();
        runtime.set_fail_launches(true);
        runtime
    }

    pub fn set_fail_launches(&self, fail: bool) {
        self.fail_launches.store(fail, Ordering::SeqCst);
    }

    /// Make `terminate` fail and leave the process alive.
    pub fn set_fail_terminations(&self, fail: bool) {
        self.fail_terminations.store(fail, Ordering::SeqCst);
    }

    /// Exit code reported by subsequent `exec` calls.
    pub async fn set_exec_exit_code(&self, code: Option<i32>) {
        *self.exec_exit_code.lock().await = code;
    }

    /// Simulate the process dying on its own.
    pub async fn crash(&self, pid: u32) {
        self.alive.lock().await.remove(&pid);
    }

    pub async fn launches(&self) -> Vec<LaunchRecord> {
        self.launches.lock().await.clone()
    }

    pub async fn terminations(&self) -> Vec<u32> {
        self.terminations.lock().await.clone()
    }

    pub async fn execs(&self) -> Vec<LaunchSpec> {
        self.execs.lock().await.clone()
    }

    /// Number of processes currently considered alive.
    pub async fn running_count(&self) -> usize {
        self.alive.lock().await.len()
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeRuntime for MockRuntime {
    async fn launch(&self, spec: &LaunchSpec) -> Result<NodeHandle, NodeError> {
        if self.fail_launches.load(Ordering::SeqCst) {
            return Err(NodeError::SpawnFailed {
                program: spec.program.display().to_string(),
                source: std::io::Error::other("mock runtime configured to fail"),
            });
        }

        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        info!(pid, args = ?spec.args, "[MOCK] Launching node");

        self.launches.lock().await.push(LaunchRecord {
            pid,
            program: spec.program.clone(),
            args: spec.args.clone(),
        });
        self.alive.lock().await.insert(pid);

        Ok(NodeHandle::new(pid, None))
    }

    async fn terminate(&self, handle: NodeHandle) -> Result<(), NodeError> {
        debug!(pid = handle.pid(), "[MOCK] Terminating node");
        if self.fail_terminations.load(Ordering::SeqCst) {
            return Err(NodeError::TerminationFailed {
                pid: handle.pid(),
                reason: "mock runtime configured to fail".to_string(),
            });
        }
        self.terminations.lock().await.push(handle.pid());
        self.alive.lock().await.remove(&handle.pid());
        Ok(())
    }

    async fn is_running(&self, handle: &mut NodeHandle) -> bool {
        self.alive.lock().await.contains(&handle.pid())
    }

    async fn exec(&self, spec: &LaunchSpec, _timeout: Duration) -> Result<Option<i32>, NodeError> {
        debug!(args = ?spec.args, "[MOCK] Running command");
        self.execs.lock().await.push(spec.clone());
        Ok(*self.exec_exit_code.lock().await)
    }
}
