//! Node height from the node's own ABCI info endpoint.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Errors from the node status query.
#[derive(Debug, Error)]
pub enum StatusError {
    #[error("node endpoint {endpoint} unreachable: {source}")]
    Unreachable {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("node endpoint {endpoint} returned status {status}")]
    UnexpectedStatus {
        endpoint: String,
        status: reqwest::StatusCode,
    },

    #[error("node endpoint {endpoint} returned a malformed response: {source}")]
    Malformed {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("last_block_height is not a decimal number: {0:?}")]
    InvalidHeight(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct AbciInfoResponse {
    result: AbciInfoResult,
}

#[derive(Debug, Deserialize)]
struct AbciInfoResult {
    response: AbciInfo,
}

#[derive(Debug, Deserialize)]
struct AbciInfo {
    /// Absent on a node that has not committed a block yet.
    #[serde(default)]
    last_block_height: String,
}

/// Client for `GET {endpoint}/abci_info`.
#[derive(Debug, Clone)]
pub struct NodeStatusClient {
    http: reqwest::Client,
    endpoint: String,
}

impl NodeStatusClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, StatusError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(StatusError::Client)?;

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Latest block height the node has committed.
    pub async fn node_height(&self) -> Result<i64, StatusError> {
        let url = format!("{}/abci_info", self.endpoint);
        let unreachable = |source| StatusError::Unreachable {
            endpoint: self.endpoint.clone(),
            source,
        };

        let response = self.http.get(&url).send().await.map_err(unreachable)?;
        let status = response.status();
        if !status.is_success() {
            return Err(StatusError::UnexpectedStatus {
                endpoint: self.endpoint.clone(),
                status,
            });
        }

        let body = response.bytes().await.map_err(unreachable)?;
        let info: AbciInfoResponse =
            serde_json::from_slice(&body).map_err(|source| StatusError::Malformed {
                endpoint: self.endpoint.clone(),
                source,
            })?;

        let raw = info.result.response.last_block_height;
        let height = parse_height(&raw)?;
        debug!(height, "Fetched node height");
        Ok(height)
    }
}

fn parse_height(raw: &str) -> Result<i64, StatusError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(StatusError::InvalidHeight(raw.to_string()));
    }
    trimmed
        .parse()
        .map_err(|_| StatusError::InvalidHeight(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_height() {
        assert_eq!(parse_height("12345").unwrap(), 12345);
        assert_eq!(parse_height("").unwrap(), 0);
        assert!(parse_height("12x").is_err());
        assert!(parse_height("-1").is_err());
    }

    #[tokio::test]
    async fn test_node_height() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/abci_info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": -1,
                "result": {"response": {"data": "osmosis", "last_block_height": "850000"}}
            })))
            .mount(&server)
            .await;

        let client = NodeStatusClient::new(&server.uri(), Duration::from_secs(2)).unwrap();
        assert_eq!(client.node_height().await.unwrap(), 850000);
    }

    #[tokio::test]
    async fn test_node_height_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = NodeStatusClient::new(&server.uri(), Duration::from_secs(2)).unwrap();
        let err = client.node_height().await.unwrap_err();
        assert!(matches!(err, StatusError::UnexpectedStatus { .. }));
    }
}
