//! # supervysor-pool
//!
//! Read-only queries against the KYVE REST API for a single data pool.
//!
//! The supervisor needs three numbers from a pool: the height it has reached
//! (`current_key`, or `start_key` before the first bundle), the maximum bundle
//! size, and the upload interval. All of them come from the same endpoint:
//!
//! ```text
//! GET {endpoint}/kyve/query/v1beta1/pool/{pool_id}
//! ```
//!
//! ## Endpoint resolution
//!
//! Each known chain id maps to a built-in list of REST endpoints. Operator
//! supplied fallback endpoints are appended to that list. Endpoints are tried
//! strictly in order and the first usable answer wins; ordering expresses
//! priority, not latency.

mod chain;
mod client;
mod error;
mod types;

pub use chain::{parse_endpoint_list, Chain};
pub use client::{fetch_pool_height, PoolClient, DEFAULT_REQUEST_TIMEOUT, POOL_QUERY_PATH};
pub use error::PoolError;
pub use types::{HeightKey, PoolData, PoolParams, PoolResponse};
