//! Supervision control loop.
//!
//! Every tick the supervisor:
//! - Relaunches the node in its current mode if the process is gone
//! - Queries node height and pool height concurrently
//! - Applies the hysteresis rule and switches mode if needed
//! - Updates the gauges
//!
//! Pruning runs on its own timer inside the same `select!`, so a prune never
//! overlaps a mode switch.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use supervysor_pool::{PoolClient, PoolError, DEFAULT_REQUEST_TIMEOUT};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::SupervisorConfig;
use crate::metrics::SupervisorMetrics;
use crate::node::{
    NodeError, NodeMode, NodeRuntime, NodeStatusClient, ProcessManager, StatusError,
};
use crate::pruning::{measure_data_dir_size, DiskPruner, PruneError};
use crate::settings::Thresholds;

/// Failed ticks logged at `warn` before escalating to `error`.
const FAILURES_BEFORE_ESCALATION: u32 = 3;

/// Mode change chosen for one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Stay,
    EnterGhost,
    EnterNormal,
}

/// Hysteresis rule.
///
/// Normal mode is left only when the node trails by more than
/// `height_difference_max`; Ghost mode only when it trails by less than
/// `height_difference_min`. Anything inside the band keeps the current mode.
pub fn decide(mode: NodeMode, diff: i64, thresholds: &Thresholds) -> Transition {
    match mode {
        NodeMode::Normal if diff > thresholds.height_difference_max => Transition::EnterGhost,
        NodeMode::Ghost if diff < thresholds.height_difference_min => Transition::EnterNormal,
        _ => Transition::Stay,
    }
}

/// Both heights as observed on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeightSample {
    pub pool_height: i64,
    pub node_height: i64,
    pub timestamp: DateTime<Utc>,
}

impl HeightSample {
    pub fn new(pool_height: i64, node_height: i64) -> Self {
        Self {
            pool_height,
            node_height,
            timestamp: Utc::now(),
        }
    }

    /// How far the node trails the pool. Negative when the node is ahead.
    pub fn diff(&self) -> i64 {
        self.pool_height - self.node_height
    }
}

/// Result of a single tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// A height query failed; no decision was made.
    Skipped { consecutive_failures: u32 },
    /// Heights were read and the mode stays as it is.
    Held { sample: HeightSample },
    /// The node was restarted in `to` mode.
    Transitioned { sample: HeightSample, to: NodeMode },
    /// A mode switch to `target` failed and will be retried next tick.
    TransitionFailed {
        sample: HeightSample,
        target: NodeMode,
    },
}

/// Loop parameters.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub pool_id: u64,
    pub tick_interval: Duration,
    pub thresholds: Thresholds,
}

/// Errors from wiring a [`Supervisor`] from its configuration.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("pool client: {0}")]
    Pool(#[from] PoolError),

    #[error("node status client: {0}")]
    Status(#[from] StatusError),
}

/// Owns the node process and drives it from height samples.
pub struct Supervisor {
    manager: ProcessManager,
    pool: PoolClient,
    status: NodeStatusClient,
    pruner: DiskPruner,
    metrics: SupervisorMetrics,
    settings: SupervisorSettings,
    consecutive_failures: u32,
}

impl Supervisor {
    pub fn new(
        manager: ProcessManager,
        pool: PoolClient,
        status: NodeStatusClient,
        pruner: DiskPruner,
        metrics: SupervisorMetrics,
        settings: SupervisorSettings,
    ) -> Self {
        Self {
            manager,
            pool,
            status,
            pruner,
            metrics,
            settings,
            consecutive_failures: 0,
        }
    }

    /// Wire a supervisor for a validated config on top of `runtime`.
    pub fn from_config(
        config: &SupervisorConfig,
        runtime: Arc<dyn NodeRuntime>,
        metrics: SupervisorMetrics,
    ) -> Result<Self, SetupError> {
        let thresholds = config.thresholds();
        let pool = PoolClient::for_chain(
            &config.chain_id,
            &config.fallback_endpoint_list(),
            DEFAULT_REQUEST_TIMEOUT,
        )?;
        let status = NodeStatusClient::new(&config.abci_endpoint, DEFAULT_REQUEST_TIMEOUT)?;
        let pruner = DiskPruner::new(
            Arc::clone(&runtime),
            &config.binary_path,
            &config.home_path,
            thresholds.keep_recent,
        )
        .with_keep_every(thresholds.keep_every);
        let manager = ProcessManager::new(runtime, config.launch_config());

        Ok(Self::new(
            manager,
            pool,
            status,
            pruner,
            metrics,
            SupervisorSettings {
                pool_id: config.pool_id,
                tick_interval: config.tick_interval(),
                thresholds,
            },
        ))
    }

    pub fn manager(&self) -> &ProcessManager {
        &self.manager
    }

    pub fn metrics(&self) -> &SupervisorMetrics {
        &self.metrics
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Launch the node in Normal mode. A failure here is fatal to the caller.
    pub async fn start(&mut self) -> Result<u32, NodeError> {
        let pid = self.manager.start_initial().await?;
        info!(
            pid,
            pool_id = self.settings.pool_id,
            height_difference_max = self.settings.thresholds.height_difference_max,
            height_difference_min = self.settings.thresholds.height_difference_min,
            "Supervisor started"
        );
        Ok(pid)
    }

    /// Run one observation and decision.
    pub async fn tick(&mut self) -> TickOutcome {
        match self.manager.ensure_running().await {
            Ok(true) => info!(
                mode = %self.manager.mode(),
                pid = ?self.manager.pid(),
                "Relaunched node"
            ),
            Ok(false) => {}
            Err(e) => error!(
                mode = %self.manager.mode(),
                error = %e,
                "Node is not running and could not be relaunched"
            ),
        }

        let (node, pool) = tokio::join!(
            self.status.node_height(),
            self.pool.pool_height(self.settings.pool_id)
        );

        if let Ok(height) = &node {
            self.metrics.set_node_height(*height);
        }
        if let Ok(height) = &pool {
            self.metrics.set_pool_height(*height);
            self.metrics.set_band(*height, &self.settings.thresholds);
        }
        self.refresh_data_dir_size().await;

        let sample = match (node, pool) {
            (Ok(node_height), Ok(pool_height)) => HeightSample::new(pool_height, node_height),
            (node, pool) => {
                self.consecutive_failures += 1;
                let node_error = node.err().map(|e| e.to_string());
                let pool_error = pool.err().map(|e| e.to_string());
                if self.consecutive_failures <= FAILURES_BEFORE_ESCALATION {
                    warn!(
                        node_error = ?node_error,
                        pool_error = ?pool_error,
                        abci_endpoint = %self.status.endpoint(),
                        mode = %self.manager.mode(),
                        consecutive_failures = self.consecutive_failures,
                        "Could not read heights, skipping tick"
                    );
                } else {
                    error!(
                        node_error = ?node_error,
                        pool_error = ?pool_error,
                        abci_endpoint = %self.status.endpoint(),
                        mode = %self.manager.mode(),
                        consecutive_failures = self.consecutive_failures,
                        "Could not read heights repeatedly"
                    );
                }
                return TickOutcome::Skipped {
                    consecutive_failures: self.consecutive_failures,
                };
            }
        };
        self.consecutive_failures = 0;

        let mode = self.manager.mode();
        let diff = sample.diff();
        let (target, result) = match decide(mode, diff, &self.settings.thresholds) {
            Transition::Stay => {
                debug!(
                    pool_height = sample.pool_height,
                    node_height = sample.node_height,
                    diff,
                    mode = %mode,
                    "Heights within band"
                );
                return TickOutcome::Held { sample };
            }
            Transition::EnterGhost => {
                info!(
                    pool_height = sample.pool_height,
                    node_height = sample.node_height,
                    diff,
                    max = self.settings.thresholds.height_difference_max,
                    "Node fell too far behind, enabling ghost mode"
                );
                (NodeMode::Ghost, self.manager.enable_ghost_mode().await)
            }
            Transition::EnterNormal => {
                info!(
                    pool_height = sample.pool_height,
                    node_height = sample.node_height,
                    diff,
                    min = self.settings.thresholds.height_difference_min,
                    "Node caught up, enabling normal mode"
                );
                (NodeMode::Normal, self.manager.enable_normal_mode().await)
            }
        };

        match result {
            Ok(_) => TickOutcome::Transitioned { sample, to: target },
            Err(e) => {
                error!(
                    reason = e.reason_code(),
                    error = %e,
                    pool_height = sample.pool_height,
                    node_height = sample.node_height,
                    "Mode switch failed, retrying next tick"
                );
                TickOutcome::TransitionFailed { sample, target }
            }
        }
    }

    /// Stop the node, prune its data, and relaunch it in the current mode.
    ///
    /// If the node cannot be stopped the prune is skipped for this interval;
    /// the next tick relaunches whatever is missing.
    pub async fn prune(&mut self) -> Result<(), PruneError> {
        let mode = self.manager.mode();
        info!(mode = %mode, "Stopping node for pruning");

        if let Err(e) = self.manager.shutdown_process().await {
            warn!(reason = e.reason_code(), error = %e, "Could not stop node, skipping prune");
            return Err(PruneError::StopFailed(e));
        }

        let result = self.pruner.prune().await;

        // A failed relaunch leaves no handle; the next tick retries.
        if let Err(e) = self.manager.relaunch().await {
            error!(mode = %mode, error = %e, "Could not relaunch node after pruning");
        }
        self.refresh_data_dir_size().await;

        result
    }

    /// Drive ticks and prunes until `shutdown` flips to `true`, then stop the node.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let prune_every = self.settings.thresholds.pruning_interval;
        info!(
            tick_interval_secs = self.settings.tick_interval.as_secs(),
            pruning_interval_secs = prune_every.as_secs(),
            "Starting supervision loop"
        );

        let mut ticker = tokio::time::interval(self.settings.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut prune_timer = tokio::time::interval_at(Instant::now() + prune_every, prune_every);
        prune_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = prune_timer.tick() => {
                    if let Err(e) = self.prune().await {
                        error!(error = %e, "Pruning failed, retrying next interval");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        info!("Shutdown channel closed");
                        break;
                    }
                }
            }
        }

        info!("Supervision loop stopping");
        if let Err(e) = self.manager.shutdown_process().await {
            error!(error = %e, "Could not stop node on shutdown");
        }
    }

    async fn refresh_data_dir_size(&self) {
        let data_dir = self.pruner.data_dir();
        match tokio::task::spawn_blocking(move || measure_data_dir_size(&data_dir)).await {
            Ok(Ok(bytes)) => self.metrics.set_data_dir_size(bytes),
            Ok(Err(e)) => debug!(error = %e, "Could not measure data directory"),
            Err(e) => warn!(error = %e, "Data directory measurement panicked"),
        }
    }
}
