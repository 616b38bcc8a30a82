//! Disk pruning for the node's data directory.
//!
//! Pruning runs the node binary's own `prune` subcommand with the resolved
//! retention count. The caller is responsible for stopping the node first;
//! the binary refuses to prune a database that is held open.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::node::{LaunchSpec, NodeError, NodeRuntime};

/// Upper bound on a single prune run.
pub const DEFAULT_PRUNE_TIMEOUT: Duration = Duration::from_secs(4 * 60 * 60);

/// Errors from pruning or sizing the data directory.
#[derive(Debug, Error)]
pub enum PruneError {
    #[error("prune command failed: {0}")]
    Command(#[from] NodeError),

    #[error("node could not be stopped before pruning: {0}")]
    StopFailed(#[source] NodeError),

    #[error("prune exited with {}", describe_exit(.code))]
    NonZeroExit { code: Option<i32> },

    #[error("could not measure {path}: {source}")]
    Measure {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("code {c}"),
        None => "a signal".to_string(),
    }
}

/// Invokes `{binary} prune` for one node home.
pub struct DiskPruner {
    runtime: Arc<dyn NodeRuntime>,
    binary_path: PathBuf,
    home_dir: PathBuf,
    keep_recent: u64,
    keep_every: u64,
    timeout: Duration,
}

impl DiskPruner {
    pub fn new(
        runtime: Arc<dyn NodeRuntime>,
        binary_path: impl Into<PathBuf>,
        home_dir: impl Into<PathBuf>,
        keep_recent: u64,
    ) -> Self {
        Self {
            runtime,
            binary_path: binary_path.into(),
            home_dir: home_dir.into(),
            keep_recent,
            keep_every: 0,
            timeout: DEFAULT_PRUNE_TIMEOUT,
        }
    }

    pub fn with_keep_every(mut self, keep_every: u64) -> Self {
        self.keep_every = keep_every;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Data directory of the node (`{home}/data`).
    pub fn data_dir(&self) -> PathBuf {
        self.home_dir.join("data")
    }

    /// The `prune` invocation.
    pub fn prune_spec(&self) -> LaunchSpec {
        let spec = LaunchSpec::new(&self.binary_path)
            .arg("prune")
            .arg("--home")
            .arg(self.home_dir.to_string_lossy())
            .arg("--keep-recent")
            .arg(self.keep_recent.to_string());

        if self.keep_every > 0 {
            spec.arg("--keep-every").arg(self.keep_every.to_string())
        } else {
            spec
        }
    }

    /// Run the prune subcommand to completion.
    pub async fn prune(&self) -> Result<(), PruneError> {
        info!(
            home = %self.home_dir.display(),
            keep_recent = self.keep_recent,
            keep_every = self.keep_every,
            "Pruning node data"
        );

        match self.runtime.exec(&self.prune_spec(), self.timeout).await? {
            Some(0) => {
                info!("Pruning finished");
                Ok(())
            }
            code => {
                warn!(code = ?code, "Pruning exited unsuccessfully");
                Err(PruneError::NonZeroExit { code })
            }
        }
    }
}

/// Total size in bytes of all files under `path`.
pub fn measure_data_dir_size(path: &Path) -> Result<u64, PruneError> {
    let mut total = 0u64;
    for entry in WalkDir::new(path) {
        let entry = entry.map_err(|source| PruneError::Measure {
            path: path.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() {
            let metadata = entry.metadata().map_err(|source| PruneError::Measure {
                path: path.to_path_buf(),
                source,
            })?;
            total += metadata.len();
        }
    }
    Ok(total)
}
