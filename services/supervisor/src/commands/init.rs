//! Init command (resolve pool settings and write the config).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use supervysor::config::{
    default_home_path, ensure_app_dirs, SupervisorConfig, DEFAULT_ABCI_ENDPOINT,
    DEFAULT_INTERVAL_SECS, DEFAULT_METRICS_PORT, DEFAULT_PRUNING_INTERVAL_HOURS,
};
use supervysor::node::DEFAULT_GHOST_PORT;
use supervysor::settings::{resolve_settings, Thresholds};
use supervysor_pool::parse_endpoint_list;

use super::config_path;

/// Init command - derive thresholds from the pool and persist them.
#[derive(Debug, Args)]
pub struct InitCommand {
    /// KYVE chain id (kyve-1, kaon-1 or korellia).
    #[arg(long)]
    chain_id: String,

    /// Path to the node binary (e.g. /root/go/bin/osmosisd).
    #[arg(long)]
    binary_path: PathBuf,

    /// KYVE pool id.
    #[arg(long)]
    pool_id: u64,

    /// Seeds for the node to connect to in Normal mode.
    #[arg(long)]
    seeds: String,

    /// Node home directory. Defaults to ~/.{binary name}.
    #[arg(long)]
    home_path: Option<PathBuf>,

    /// Comma-separated REST endpoints tried after the chain's own.
    #[arg(long, default_value = "")]
    fallback_endpoints: String,

    /// Hours between prunes.
    #[arg(long, default_value_t = DEFAULT_PRUNING_INTERVAL_HOURS)]
    pruning_interval: u64,

    /// Serve Prometheus metrics.
    #[arg(long)]
    metrics: bool,

    /// Port for the metrics endpoint.
    #[arg(long, default_value_t = DEFAULT_METRICS_PORT)]
    metrics_port: u16,

    /// ABCI endpoint of the node.
    #[arg(long, default_value = DEFAULT_ABCI_ENDPOINT)]
    abci_endpoint: String,

    /// Seconds between height checks.
    #[arg(long, default_value_t = DEFAULT_INTERVAL_SECS)]
    interval: u64,

    /// Where to write the config. Defaults to ~/.supervysor/config.toml.
    #[arg(long)]
    config: Option<PathBuf>,
}

impl InitCommand {
    pub async fn run(self) -> Result<()> {
        let path = config_path(self.config.clone())?;
        if path.exists() {
            info!(
                path = %path.display(),
                "supervysor is already initialized, edit the existing config instead"
            );
            return Ok(());
        }

        info!(chain_id = %self.chain_id, pool_id = self.pool_id, "Initializing supervysor");
        let thresholds = resolve_settings(
            &self.binary_path,
            self.pool_id,
            &self.chain_id,
            &parse_endpoint_list(&self.fallback_endpoints),
        )
        .await
        .context("Could not resolve pool settings")?;

        let config = self.build_config(thresholds)?;
        config.validate()?;

        if let Some(dir) = path.parent() {
            ensure_app_dirs(dir)?;
        }
        config.save(&path)?;

        info!(path = %path.display(), "Successfully initialized");
        Ok(())
    }

    fn build_config(&self, thresholds: Thresholds) -> Result<SupervisorConfig> {
        let home_path = match &self.home_path {
            Some(home) => home.clone(),
            None => default_home_path(&self.binary_path)?,
        };
        let thresholds =
            thresholds.with_pruning_interval(Duration::from_secs(self.pruning_interval * 3600));

        Ok(SupervisorConfig {
            chain_id: self.chain_id.clone(),
            binary_path: self.binary_path.clone(),
            home_path,
            pool_id: self.pool_id,
            seeds: self.seeds.clone(),
            fallback_endpoints: self.fallback_endpoints.clone(),
            pruning_interval: self.pruning_interval,
            metrics: self.metrics,
            metrics_port: self.metrics_port,
            abci_endpoint: self.abci_endpoint.clone(),
            interval: self.interval,
            height_difference_max: thresholds.height_difference_max,
            height_difference_min: thresholds.height_difference_min,
            keep_recent: thresholds.keep_recent,
            keep_every: thresholds.keep_every,
            ghost_port: DEFAULT_GHOST_PORT,
        })
    }
}
