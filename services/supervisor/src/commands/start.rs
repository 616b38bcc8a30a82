//! Start command (launch the node and supervise it).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info};

use supervysor::config::{ensure_app_dirs, SupervisorConfig};
use supervysor::metrics::{self, SupervisorMetrics};
use supervysor::node::{NodeRuntime, ProcessRuntime};
use supervysor::settings::check_binary_path;
use supervysor::supervisor::Supervisor;

use super::config_path;

/// Start command - run the supervision loop until SIGINT or SIGTERM.
#[derive(Debug, Args)]
pub struct StartCommand {
    /// Config file. Defaults to ~/.supervysor/config.toml.
    #[arg(long)]
    config: Option<PathBuf>,
}

impl StartCommand {
    pub async fn run(self) -> Result<()> {
        let path = config_path(self.config)?;
        let config = SupervisorConfig::load(&path)
            .context("Could not load config, run `supervysor init` first")?;
        config.validate()?;
        let binary_path = check_binary_path(&config.binary_path)?;
        if let Some(dir) = path.parent() {
            ensure_app_dirs(dir)?;
        }

        info!(
            path = %path.display(),
            chain_id = %config.chain_id,
            pool_id = config.pool_id,
            binary = %binary_path.display(),
            home = %config.home_path.display(),
            metrics = config.metrics,
            "Configuration loaded"
        );

        // Registered before the node is spawned: a signal during startup is
        // buffered and stops the loop right after it starts.
        let mut signals = ShutdownSignals::install()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let metrics = SupervisorMetrics::new()?;

        let metrics_handle = config.metrics.then(|| {
            let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
            let metrics = metrics.clone();
            let shutdown_rx = shutdown_rx.clone();
            tokio::spawn(async move {
                if let Err(e) = metrics::serve(metrics, addr, shutdown_rx).await {
                    error!(error = %e, "Metrics endpoint failed");
                }
            })
        });

        let runtime: Arc<dyn NodeRuntime> = Arc::new(ProcessRuntime::default());
        let mut supervisor = Supervisor::from_config(&config, runtime, metrics)?;

        if let Err(e) = supervisor.start().await {
            let _ = shutdown_tx.send(true);
            return Err(e).context("Could not start node");
        }

        let loop_handle = tokio::spawn({
            let shutdown_rx = shutdown_rx.clone();
            async move {
                supervisor.run(shutdown_rx).await;
            }
        });

        signals.recv().await?;
        info!("Received shutdown signal");
        let _ = shutdown_tx.send(true);

        if let Err(e) = loop_handle.await {
            error!(error = %e, "Supervision loop panicked");
        }
        if let Some(handle) = metrics_handle {
            let _ = handle.await;
        }

        info!("supervysor shutdown complete");
        Ok(())
    }
}

/// SIGINT and SIGTERM listeners, registered up front.
struct ShutdownSignals {
    sigint: Signal,
    sigterm: Signal,
}

impl ShutdownSignals {
    fn install() -> Result<Self> {
        Ok(Self {
            sigint: signal(SignalKind::interrupt()).context("Could not install SIGINT handler")?,
            sigterm: signal(SignalKind::terminate()).context("Could not install SIGTERM handler")?,
        })
    }

    async fn recv(&mut self) -> Result<()> {
        tokio::select! {
            _ = self.sigint.recv() => {}
            _ = self.sigterm.recv() => {}
        }
        Ok(())
    }
}
