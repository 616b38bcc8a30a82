//! Operating thresholds derived from pool parameters.
//!
//! A pool produces `max_bundle_size` blocks every `upload_interval` seconds.
//! The thresholds are fixed multiples of that production rate:
//!
//! | Threshold               | Window                     |
//! |-------------------------|----------------------------|
//! | `keep_recent`           | one week of blocks         |
//! | `height_difference_max` | five days of blocks        |
//! | `height_difference_min` | half of `height_difference_max` |
//!
//! The node switches to Ghost mode once it trails the pool by more than
//! `height_difference_max` and back to Normal once it is within
//! `height_difference_min`. Between the two nothing changes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use supervysor_pool::{PoolClient, PoolError, PoolParams, DEFAULT_REQUEST_TIMEOUT};
use thiserror::Error;
use tracing::info;

/// Retention window for pruning.
pub const SECONDS_PER_WEEK: f64 = 60.0 * 60.0 * 24.0 * 7.0;

/// Height lag that triggers Ghost mode.
pub const SECONDS_PER_FIVE_DAYS: f64 = 60.0 * 60.0 * 24.0 * 5.0;

/// Shortest pruning interval accepted.
pub const MIN_PRUNING_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Pruning interval used when none is configured.
pub const DEFAULT_PRUNING_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors from resolving or validating thresholds.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("binary {path} not found or not executable: {source}")]
    BinaryNotFound {
        path: PathBuf,
        #[source]
        source: which::Error,
    },

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("invalid pool parameters: {0}")]
    InvalidPoolParams(String),

    #[error("height_difference_min ({min}) must be below height_difference_max ({max})")]
    CollapsedBand { min: i64, max: i64 },

    #[error("pruning interval of {hours}h is too short (must be above 6h)")]
    PruningIntervalTooShort { hours: u64 },
}

/// Per-run thresholds for the control loop and pruning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Lag above which the node is moved to Ghost mode.
    pub height_difference_max: i64,
    /// Lag below which the node is moved back to Normal mode.
    pub height_difference_min: i64,
    pub pruning_interval: Duration,
    pub keep_recent: u64,
    pub keep_every: u64,
}

impl Thresholds {
    /// Derive thresholds from pool parameters with the default pruning interval.
    pub fn from_pool_params(params: &PoolParams) -> Result<Self, SettingsError> {
        if params.upload_interval == 0 {
            return Err(SettingsError::InvalidPoolParams(
                "upload_interval is zero".to_string(),
            ));
        }
        if params.max_bundle_size == 0 {
            return Err(SettingsError::InvalidPoolParams(
                "max_bundle_size is zero".to_string(),
            ));
        }

        let max = height_difference_max(params.max_bundle_size, params.upload_interval);
        let thresholds = Self {
            height_difference_max: max,
            height_difference_min: max / 2,
            pruning_interval: DEFAULT_PRUNING_INTERVAL,
            keep_recent: keep_recent(params.max_bundle_size, params.upload_interval),
            keep_every: 0,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn with_pruning_interval(mut self, interval: Duration) -> Self {
        self.pruning_interval = interval;
        self
    }

    /// Check the hysteresis band and pruning interval.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.height_difference_min >= self.height_difference_max {
            return Err(SettingsError::CollapsedBand {
                min: self.height_difference_min,
                max: self.height_difference_max,
            });
        }
        if self.pruning_interval <= MIN_PRUNING_INTERVAL {
            return Err(SettingsError::PruningIntervalTooShort {
                hours: self.pruning_interval.as_secs() / 3600,
            });
        }
        Ok(())
    }
}

/// Blocks produced in one week.
pub fn keep_recent(max_bundle_size: u64, upload_interval: u64) -> u64 {
    (blocks_per_second(max_bundle_size, upload_interval) * SECONDS_PER_WEEK).round() as u64
}

/// Blocks produced in five days.
pub fn height_difference_max(max_bundle_size: u64, upload_interval: u64) -> i64 {
    (blocks_per_second(max_bundle_size, upload_interval) * SECONDS_PER_FIVE_DAYS).round() as i64
}

fn blocks_per_second(max_bundle_size: u64, upload_interval: u64) -> f64 {
    max_bundle_size as f64 / upload_interval as f64
}

/// Resolve `binary_path` on `PATH` (or as a path) and require it to be executable.
pub fn check_binary_path(binary_path: &Path) -> Result<PathBuf, SettingsError> {
    which::which(binary_path).map_err(|source| SettingsError::BinaryNotFound {
        path: binary_path.to_path_buf(),
        source,
    })
}

/// Verify the binary and derive thresholds for `pool_id` on `chain_id`.
pub async fn resolve_settings(
    binary_path: &Path,
    pool_id: u64,
    chain_id: &str,
    fallback_endpoints: &[String],
) -> Result<Thresholds, SettingsError> {
    check_binary_path(binary_path)?;
    let client = PoolClient::for_chain(chain_id, fallback_endpoints, DEFAULT_REQUEST_TIMEOUT)?;
    resolve_with_client(&client, pool_id).await
}

/// Derive thresholds using an existing pool client.
pub async fn resolve_with_client(
    client: &PoolClient,
    pool_id: u64,
) -> Result<Thresholds, SettingsError> {
    let params = client.pool_params(pool_id).await?;
    let thresholds = Thresholds::from_pool_params(&params)?;
    info!(
        pool_id,
        max_bundle_size = params.max_bundle_size,
        upload_interval = params.upload_interval,
        height_difference_max = thresholds.height_difference_max,
        height_difference_min = thresholds.height_difference_min,
        keep_recent = thresholds.keep_recent,
        "Resolved pool settings"
    );
    Ok(thresholds)
}
