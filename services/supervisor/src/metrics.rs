//! Prometheus gauges and the `/metrics` endpoint.
//!
//! All gauges live under the `supervysor` namespace in a private registry:
//!
//! - `supervysor_pool_height`: latest pool height
//! - `supervysor_node_height`: latest node height
//! - `supervysor_max_height`: `pool_height - height_difference_max`; a Normal
//!   node falling below it is switched to Ghost mode
//! - `supervysor_min_height`: `pool_height - height_difference_min`; a Ghost
//!   node climbing above it is switched back to Normal mode
//! - `supervysor_data_dir_size`: size of the node's data directory in bytes

use std::net::SocketAddr;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, Gauge, Opts, Registry, TextEncoder};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info};

use crate::settings::Thresholds;

const NAMESPACE: &str = "supervysor";

/// Errors from the metrics registry or its HTTP endpoint.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    Registration(#[from] prometheus::Error),

    #[error("failed to encode metrics: {0}")]
    Encoding(String),

    #[error("failed to bind metrics endpoint on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("metrics endpoint failed: {0}")]
    Serve(#[source] std::io::Error),
}

pub type MetricsResult<T> = Result<T, MetricsError>;

/// Gauges published by the supervisor. Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct SupervisorMetrics {
    registry: Registry,
    pool_height: Gauge,
    node_height: Gauge,
    max_height: Gauge,
    min_height: Gauge,
    data_dir_size: Gauge,
}

impl SupervisorMetrics {
    pub fn new() -> MetricsResult<Self> {
        let registry = Registry::new();

        let pool_height = register_gauge(&registry, "pool_height", "Current height of the pool")?;
        let node_height = register_gauge(&registry, "node_height", "Current height of the node")?;
        let max_height = register_gauge(
            &registry,
            "max_height",
            "Maximum height of node until Ghost Mode enabling",
        )?;
        let min_height = register_gauge(
            &registry,
            "min_height",
            "Minimum height of node until Normal Mode enabling",
        )?;
        let data_dir_size = register_gauge(
            &registry,
            "data_dir_size",
            "Size of the node data directory in bytes",
        )?;

        Ok(Self {
            registry,
            pool_height,
            node_height,
            max_height,
            min_height,
            data_dir_size,
        })
    }

    pub fn set_pool_height(&self, height: i64) {
        self.pool_height.set(height as f64);
    }

    pub fn set_node_height(&self, height: i64) {
        self.node_height.set(height as f64);
    }

    /// Update the band gauges relative to `pool_height`.
    pub fn set_band(&self, pool_height: i64, thresholds: &Thresholds) {
        self.max_height
            .set((pool_height - thresholds.height_difference_max) as f64);
        self.min_height
            .set((pool_height - thresholds.height_difference_min) as f64);
    }

    pub fn set_data_dir_size(&self, bytes: u64) {
        self.data_dir_size.set(bytes as f64);
    }

    pub fn pool_height(&self) -> f64 {
        self.pool_height.get()
    }

    pub fn node_height(&self) -> f64 {
        self.node_height.get()
    }

    pub fn max_height(&self) -> f64 {
        self.max_height.get()
    }

    pub fn min_height(&self) -> f64 {
        self.min_height.get()
    }

    pub fn data_dir_size(&self) -> f64 {
        self.data_dir_size.get()
    }

    /// Encode all gauges in the Prometheus text exposition format.
    pub fn encode_text(&self) -> MetricsResult<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| MetricsError::Encoding(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(e.to_string()))
    }
}

fn register_gauge(registry: &Registry, name: &str, help: &str) -> MetricsResult<Gauge> {
    let gauge = Gauge::with_opts(Opts::new(name, help).namespace(NAMESPACE))?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

/// Router exposing `GET /metrics`.
pub fn router(metrics: SupervisorMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics)
}

async fn metrics_handler(State(metrics): State<SupervisorMetrics>) -> Response {
    match metrics.encode_text() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Serve `/metrics` on `addr` until `shutdown` flips to `true`.
pub async fn serve(
    metrics: SupervisorMetrics,
    addr: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) -> MetricsResult<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| MetricsError::Bind { addr, source })?;
    info!(addr = %addr, "Serving metrics");

    axum::serve(listener, router(metrics))
        .with_graceful_shutdown(async move {
            loop {
                if *shutdown.borrow() {
                    break;
                }
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
            info!("Metrics endpoint shutting down");
        })
        .await
        .map_err(MetricsError::Serve)
}
