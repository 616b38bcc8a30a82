//! Pool query client with ordered endpoint fallback.

use std::time::Duration;

use tracing::{debug, warn};

use crate::chain::Chain;
use crate::error::PoolError;
use crate::types::{PoolData, PoolParams, PoolResponse};

/// Path prefix of the pool query; the pool id is appended.
pub const POOL_QUERY_PATH: &str = "/kyve/query/v1beta1/pool";

/// Per-request timeout applied when none is given.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Queries a fixed, ordered list of KYVE REST endpoints.
///
/// The client is stateless apart from its connection pool and is safe to
/// call on every tick.
#[derive(Debug, Clone)]
pub struct PoolClient {
    http: reqwest::Client,
    endpoints: Vec<String>,
}

impl PoolClient {
    /// Create a client over an explicit endpoint list.
    pub fn new(endpoints: Vec<String>, timeout: Duration) -> Result<Self, PoolError> {
        let endpoints: Vec<String> = endpoints
            .into_iter()
            .map(|e| e.trim().trim_end_matches('/').to_string())
            .filter(|e| !e.is_empty())
            .collect();
        if endpoints.is_empty() {
            return Err(PoolError::NoEndpoints);
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(PoolError::Client)?;

        Ok(Self { http, endpoints })
    }

    /// Create a client for a known chain, with `fallback` appended.
    ///
    /// Fails with [`PoolError::UnknownChain`] without touching the network.
    pub fn for_chain(
        chain_id: &str,
        fallback: &[String],
        timeout: Duration,
    ) -> Result<Self, PoolError> {
        let chain: Chain = chain_id.parse()?;
        Self::new(chain.endpoints_with_fallback(fallback), timeout)
    }

    /// Endpoints in the order they are tried.
    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Current pool height.
    pub async fn pool_height(&self, pool_id: u64) -> Result<i64, PoolError> {
        self.first_success(pool_id, |data| {
            let (height, key) = data.height()?;
            debug!(pool_id, height, key = ?key, "Resolved pool height");
            Ok(height)
        })
        .await
    }

    /// Bundle size and upload interval.
    pub async fn pool_params(&self, pool_id: u64) -> Result<PoolParams, PoolError> {
        self.first_success(pool_id, PoolData::params).await
    }

    /// Walk the endpoints in order and return the first usable answer.
    async fn first_success<T, F>(&self, pool_id: u64, extract: F) -> Result<T, PoolError>
    where
        F: Fn(&PoolData) -> Result<T, PoolError>,
    {
        let mut last_error = None;

        for endpoint in &self.endpoints {
            let result = self
                .query_pool(endpoint, pool_id)
                .await
                .and_then(|data| extract(&data));

            match result {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(endpoint = %endpoint, pool_id, error = %e, "Pool endpoint failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(last) => Err(PoolError::AllEndpointsUnreachable {
                attempted: self.endpoints.len(),
                last: Box::new(last),
            }),
            None => Err(PoolError::NoEndpoints),
        }
    }

    async fn query_pool(&self, endpoint: &str, pool_id: u64) -> Result<PoolData, PoolError> {
        let url = format!("{}{}/{}", endpoint, POOL_QUERY_PATH, pool_id);
        debug!(url = %url, "Querying pool");

        let unreachable = |source| PoolError::EndpointUnreachable {
            endpoint: endpoint.to_string(),
            source,
        };

        let response = self.http.get(&url).send().await.map_err(unreachable)?;

        let status = response.status();
        if !status.is_success() {
            return Err(PoolError::UnexpectedStatus {
                endpoint: endpoint.to_string(),
                status,
            });
        }

        let body = response.bytes().await.map_err(unreachable)?;
        let parsed: PoolResponse =
            serde_json::from_slice(&body).map_err(|source| PoolError::MalformedResponse {
                endpoint: endpoint.to_string(),
                source,
            })?;

        Ok(parsed.pool.data)
    }
}

/// One-shot pool height lookup for `chain_id` with `candidate_endpoints`
/// appended to the chain's built-in list.
pub async fn fetch_pool_height(
    chain_id: &str,
    pool_id: u64,
    candidate_endpoints: &[String],
) -> Result<i64, PoolError> {
    PoolClient::for_chain(chain_id, candidate_endpoints, DEFAULT_REQUEST_TIMEOUT)?
        .pool_height(pool_id)
        .await
}
