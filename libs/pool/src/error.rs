//! Error types for pool queries.

use thiserror::Error;

/// Errors from querying a KYVE pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Chain id does not name a known network.
    #[error("unknown chain id {0:?} (needs to be kyve-1, kaon-1 or korellia)")]
    UnknownChain(String),

    /// No endpoint left after resolution.
    #[error("no pool endpoints configured")]
    NoEndpoints,

    /// Transport failure (connect, timeout, body read).
    #[error("endpoint {endpoint} unreachable: {source}")]
    EndpointUnreachable {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// Endpoint answered with a non-2xx status.
    #[error("endpoint {endpoint} returned status {status}")]
    UnexpectedStatus {
        endpoint: String,
        status: reqwest::StatusCode,
    },

    /// Body was not the expected JSON shape.
    #[error("endpoint {endpoint} returned a malformed pool response: {source}")]
    MalformedResponse {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    /// A numeric field held something other than a decimal number.
    #[error("pool field {field} is not a decimal number: {value:?}")]
    InvalidField { field: &'static str, value: String },

    /// Every candidate endpoint failed.
    #[error("all {attempted} pool endpoints failed, last error: {last}")]
    AllEndpointsUnreachable {
        attempted: usize,
        #[source]
        last: Box<PoolError>,
    },

    /// HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl PoolError {
    /// Whether a later retry can succeed without operator action.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            PoolError::UnknownChain(_) | PoolError::NoEndpoints | PoolError::Client(_)
        )
    }
}
