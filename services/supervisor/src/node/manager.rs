//! Lifecycle of the single managed node process.
//!
//! The [`ProcessManager`] owns the only [`NodeHandle`] and the mode it was
//! launched in. It is driven by one caller (the control loop) through
//! `&mut self`, so transitions are serialized by construction: a transition
//! terminates the previous process, waits for it to exit, and only then
//! launches the next one.

use std::sync::Arc;

use tracing::{error, info, warn};

use super::addrbook::AddrBook;
use super::error::NodeError;
use super::runtime::{NodeHandle, NodeRuntime};
use super::{NodeLaunchConfig, NodeMode};

/// The managed process and its mode.
#[derive(Debug)]
pub struct NodeProcess {
    handle: Option<NodeHandle>,
    mode: NodeMode,
}

impl NodeProcess {
    fn new() -> Self {
        Self {
            handle: None,
            mode: NodeMode::Normal,
        }
    }

    pub fn mode(&self) -> NodeMode {
        self.mode
    }

    pub fn pid(&self) -> Option<u32> {
        self.handle.as_ref().map(NodeHandle::pid)
    }

    pub fn is_ghost(&self) -> bool {
        self.mode == NodeMode::Ghost
    }
}

/// Starts, stops and switches the managed node between modes.
pub struct ProcessManager {
    runtime: Arc<dyn NodeRuntime>,
    launch: NodeLaunchConfig,
    addr_book: AddrBook,
    process: NodeProcess,
}

impl ProcessManager {
    pub fn new(runtime: Arc<dyn NodeRuntime>, launch: NodeLaunchConfig) -> Self {
        let addr_book = AddrBook::new(launch.addr_book_path.clone());
        Self {
            runtime,
            launch,
            addr_book,
            process: NodeProcess::new(),
        }
    }

    pub fn process(&self) -> &NodeProcess {
        &self.process
    }

    pub fn mode(&self) -> NodeMode {
        self.process.mode
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.pid()
    }

    pub fn launch_config(&self) -> &NodeLaunchConfig {
        &self.launch
    }

    /// Launch the node in Normal mode at supervisor startup.
    ///
    /// Returns the existing pid if a process is already tracked.
    pub async fn start_initial(&mut self) -> Result<u32, NodeError> {
        if let Some(pid) = self.process.pid() {
            return Ok(pid);
        }

        info!("Starting node initially");
        let handle = self
            .launch_in(NodeMode::Normal)
            .await
            .map_err(|e| NodeError::StartFailed {
                source: Box::new(e),
            })?;

        let pid = handle.pid();
        self.process = NodeProcess {
            handle: Some(handle),
            mode: NodeMode::Normal,
        };
        info!(pid, "Initial process started");
        Ok(pid)
    }

    /// Switch to Ghost mode. Returns `false` if already in Ghost mode.
    pub async fn enable_ghost_mode(&mut self) -> Result<bool, NodeError> {
        self.transition(NodeMode::Ghost).await
    }

    /// Switch back to Normal mode. Returns `false` if already in Normal mode.
    pub async fn enable_normal_mode(&mut self) -> Result<bool, NodeError> {
        self.transition(NodeMode::Normal).await
    }

    async fn transition(&mut self, target: NodeMode) -> Result<bool, NodeError> {
        let previous = self.process.mode;
        if previous == target {
            return Ok(false);
        }

        info!(from = %previous, to = %target, pid = ?self.process.pid(), "Switching node mode");

        if let Err(e) = self.shutdown_process().await {
            error!(error = %e, "Could not shut down node, launching anyway");
        }

        match self.launch_in(target).await {
            Ok(handle) => {
                let pid = handle.pid();
                self.process = NodeProcess {
                    handle: Some(handle),
                    mode: target,
                };
                info!(pid, mode = %target, "Node started in new mode");
                Ok(true)
            }
            Err(e) => {
                error!(mode = %target, error = %e, "Mode switch failed, restoring previous mode");
                match self.launch_in(previous).await {
                    Ok(handle) => {
                        info!(pid = handle.pid(), mode = %previous, "Previous mode restored");
                        self.process.handle = Some(handle);
                    }
                    Err(restore) => {
                        error!(mode = %previous, error = %restore, "Could not restore previous mode");
                    }
                }
                Err(NodeError::TransitionFailed {
                    target,
                    source: Box::new(e),
                })
            }
        }
    }

    /// Relaunch in the current mode if the process died or was never
    /// replaced after a failed launch. Returns whether a launch happened.
    pub async fn ensure_running(&mut self) -> Result<bool, NodeError> {
        if let Some(handle) = self.process.handle.as_mut() {
            if self.runtime.is_running(handle).await {
                return Ok(false);
            }
            warn!(pid = handle.pid(), mode = %self.process.mode, "Node process is no longer running");
        }

        // Reap whatever is left of the old handle.
        if let Err(e) = self.shutdown_process().await {
            warn!(error = %e, "Could not reap exited node process");
        }

        self.relaunch().await?;
        Ok(true)
    }

    /// Launch in the current mode, replacing nothing.
    ///
    /// Callers must have stopped the previous process.
    pub async fn relaunch(&mut self) -> Result<u32, NodeError> {
        let mode = self.process.mode;
        let handle = self.launch_in(mode).await?;
        let pid = handle.pid();
        self.process.handle = Some(handle);
        info!(pid, mode = %mode, "Node relaunched");
        Ok(pid)
    }

    /// Stop the tracked process, if any. The mode is left unchanged.
    pub async fn shutdown_process(&mut self) -> Result<(), NodeError> {
        let Some(handle) = self.process.handle.take() else {
            return Ok(());
        };
        let pid = handle.pid();
        info!(pid, "Shutting down node");
        self.runtime.terminate(handle).await
    }

    async fn launch_in(&self, mode: NodeMode) -> Result<NodeHandle, NodeError> {
        let prepared = match mode {
            NodeMode::Ghost => self.addr_book.stash(),
            NodeMode::Normal => self.addr_book.restore(),
        };
        if let Err(e) = prepared {
            warn!(mode = %mode, error = %e, "Could not prepare address book");
        }

        self.runtime.launch(&self.launch.launch_spec(mode)).await
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::node::{MockRuntime, GHOST_SEEDS};

    fn manager(runtime: Arc<MockRuntime>) -> (ProcessManager, TempDir) {
        let home = tempfile::tempdir().unwrap();
        let manager = ProcessManager::new(
            runtime,
            NodeLaunchConfig::new("/usr/bin/noded", home.path(), "seed@host:26656"),
        );
        (manager, home)
    }

    #[tokio::test]
    async fn test_start_initial_is_normal() {
        let runtime = Arc::new(MockRuntime::new());
        let (mut manager, _home) = manager(Arc::clone(&runtime));

        let pid = manager.start_initial().await.unwrap();
        assert_eq!(manager.mode(), NodeMode::Normal);
        assert_eq!(manager.pid(), Some(pid));
        assert!(runtime.launches().await[0].has_flag("--p2p.seeds"));
    }

    #[tokio::test]
    async fn test_start_initial_twice_launches_once() {
        let runtime = Arc::new(MockRuntime::new());
        let (mut manager, _home) = manager(Arc::clone(&runtime));

        let first = manager.start_initial().await.unwrap();
        let second = manager.start_initial().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(runtime.launches().await.len(), 1);
    }

    #[tokio::test]
    async fn test_start_initial_failure() {
        let runtime = Arc::new(MockRuntime::failing());
        let (mut manager, _home) = manager(Arc::clone(&runtime));

        let err = manager.start_initial().await.unwrap_err();
        assert!(matches!(err, NodeError::StartFailed { .. }));
        assert_eq!(manager.pid(), None);
    }

    #[tokio::test]
    async fn test_ghost_mode_is_idempotent() {
        let runtime = Arc::new(MockRuntime::new());
        let (mut manager, _home) = manager(Arc::clone(&runtime));
        manager.start_initial().await.unwrap();

        assert!(manager.enable_ghost_mode().await.unwrap());
        assert!(!manager.enable_ghost_mode().await.unwrap());

        // Initial launch plus exactly one restart.
        assert_eq!(runtime.launches().await.len(), 2);
        assert_eq!(runtime.terminations().await.len(), 1);
        assert_eq!(runtime.running_count().await, 1);
        assert!(manager.process().is_ghost());
    }

    #[tokio::test]
    async fn test_normal_mode_noop_when_normal() {
        let runtime = Arc::new(MockRuntime::new());
        let (mut manager, _home) = manager(Arc::clone(&runtime));
        manager.start_initial().await.unwrap();

        assert!(!manager.enable_normal_mode().await.unwrap());
        assert_eq!(runtime.launches().await.len(), 1);
        assert!(runtime.terminations().await.is_empty());
    }

    #[tokio::test]
    async fn test_round_trip_terminates_before_launch() {
        let runtime = Arc::new(MockRuntime::new());
        let (mut manager, _home) = manager(Arc::clone(&runtime));
        let initial = manager.start_initial().await.unwrap();

        manager.enable_ghost_mode().await.unwrap();
        let ghost = manager.pid().unwrap();
        manager.enable_normal_mode().await.unwrap();

        assert_eq!(runtime.terminations().await, vec![initial, ghost]);
        let launches = runtime.launches().await;
        assert!(launches[1].has_flag("--p2p.laddr"));
        assert_eq!(launches[1].flag_value("--p2p.seeds"), Some(GHOST_SEEDS));
        assert_eq!(launches[2].flag_value("--p2p.seeds"), Some("seed@host:26656"));
        assert_eq!(runtime.running_count().await, 1);
    }

    #[tokio::test]
    async fn test_failed_transition_keeps_previous_mode_and_process() {
        let runtime = Arc::new(MockRuntime::new());
        let (mut manager, _home) = manager(Arc::clone(&runtime));
        manager.start_initial().await.unwrap();

        runtime.set_fail_launches(true);
        let err = manager.enable_ghost_mode().await.unwrap_err();
        assert_eq!(err.reason_code(), "ghost_mode_transition_failed");
        assert_eq!(manager.mode(), NodeMode::Normal);
        assert_eq!(manager.pid(), None);

        // Next attempt, with the runtime healthy again, succeeds.
        runtime.set_fail_launches(false);
        assert!(manager.enable_ghost_mode().await.unwrap());
        assert_eq!(manager.mode(), NodeMode::Ghost);
        assert_eq!(runtime.running_count().await, 1);
    }

    #[tokio::test]
    async fn test_ensure_running_relaunches_crashed_node() {
        let runtime = Arc::new(MockRuntime::new());
        let (mut manager, _home) = manager(Arc::clone(&runtime));
        let pid = manager.start_initial().await.unwrap();

        assert!(!manager.ensure_running().await.unwrap());

        runtime.crash(pid).await;
        assert!(manager.ensure_running().await.unwrap());
        assert_ne!(manager.pid(), Some(pid));
        assert_eq!(runtime.running_count().await, 1);
    }

    #[tokio::test]
    async fn test_ghost_relaunch_keeps_stashed_addr_book() {
        let runtime = Arc::new(MockRuntime::new());
        let (mut manager, _home) = manager(Arc::clone(&runtime));
        let book = manager.launch_config().addr_book_path.clone();
        fs::create_dir_all(book.parent().unwrap()).unwrap();
        fs::write(&book, "ORIGINAL").unwrap();

        manager.start_initial().await.unwrap();
        manager.enable_ghost_mode().await.unwrap();
        assert!(!book.exists());

        // The Ghost node learns peers, then dies and is relaunched in Ghost mode.
        fs::write(&book, "GHOST").unwrap();
        runtime.crash(manager.pid().unwrap()).await;
        assert!(manager.ensure_running().await.unwrap());
        assert_eq!(manager.mode(), NodeMode::Ghost);
        assert!(!book.exists());

        manager.enable_normal_mode().await.unwrap();
        assert_eq!(fs::read_to_string(&book).unwrap(), "ORIGINAL");
    }

    #[tokio::test]
    async fn test_shutdown_keeps_mode() {
        let runtime = Arc::new(MockRuntime::new());
        let (mut manager, _home) = manager(Arc::clone(&runtime));
        manager.start_initial().await.unwrap();
        manager.enable_ghost_mode().await.unwrap();

        manager.shutdown_process().await.unwrap();
        assert_eq!(manager.pid(), None);
        assert_eq!(manager.mode(), NodeMode::Ghost);
        assert_eq!(runtime.running_count().await, 0);

        // Nothing left to stop.
        manager.shutdown_process().await.unwrap();
    }
}
