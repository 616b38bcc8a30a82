//! Response schema for the pool query endpoint.
//!
//! Every numeric value arrives as a decimal string. Decoding is split in two:
//! serde enforces the envelope shape, then the accessors parse the strings
//! strictly so that `"12a"` is an error rather than a silently truncated
//! number.

use serde::Deserialize;

use crate::error::PoolError;

/// Top-level body of `GET /kyve/query/v1beta1/pool/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolResponse {
    pub pool: PoolEnvelope,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolEnvelope {
    pub data: PoolData,
}

/// The subset of `pool.data` the supervisor reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PoolData {
    /// Height of the latest finalized bundle; empty before the first bundle.
    #[serde(default)]
    pub current_key: String,

    /// Height the pool started archiving from.
    #[serde(default)]
    pub start_key: String,

    /// Seconds between bundle uploads.
    #[serde(default)]
    pub upload_interval: String,

    /// Maximum number of data items per bundle.
    #[serde(default)]
    pub max_bundle_size: String,
}

/// Which key a pool height was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeightKey {
    CurrentKey,
    StartKey,
}

/// Pool parameters that drive threshold derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolParams {
    pub max_bundle_size: u64,
    pub upload_interval: u64,
}

impl PoolData {
    /// Pool height, from `current_key` or, when that is empty, `start_key`.
    pub fn height(&self) -> Result<(i64, HeightKey), PoolError> {
        if self.current_key.trim().is_empty() {
            let height = parse_decimal::<i64>("start_key", &self.start_key)?;
            Ok((height, HeightKey::StartKey))
        } else {
            let height = parse_decimal::<i64>("current_key", &self.current_key)?;
            Ok((height, HeightKey::CurrentKey))
        }
    }

    /// Bundle size and upload interval.
    pub fn params(&self) -> Result<PoolParams, PoolError> {
        Ok(PoolParams {
            max_bundle_size: parse_decimal("max_bundle_size", &self.max_bundle_size)?,
            upload_interval: parse_decimal("upload_interval", &self.upload_interval)?,
        })
    }
}

fn parse_decimal<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, PoolError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PoolError::InvalidField {
            field,
            value: value.to_string(),
        });
    }
    trimmed.parse().map_err(|_| PoolError::InvalidField {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(current: &str, start: &str) -> PoolData {
        PoolData {
            current_key: current.to_string(),
            start_key: start.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_height_prefers_current_key() {
        assert_eq!(data("1000", "1").height().unwrap(), (1000, HeightKey::CurrentKey));
    }

    #[test]
    fn test_height_falls_back_to_start_key() {
        assert_eq!(data("", "42").height().unwrap(), (42, HeightKey::StartKey));
    }

    #[test]
    fn test_height_rejects_non_numeric() {
        let err = data("12a", "1").height().unwrap_err();
        assert!(matches!(err, PoolError::InvalidField { field: "current_key", .. }));

        let err = data("", "").height().unwrap_err();
        assert!(matches!(err, PoolError::InvalidField { field: "start_key", .. }));
    }

    #[test]
    fn test_height_rejects_negative() {
        assert!(data("-5", "").height().is_err());
    }

    #[test]
    fn test_params() {
        let data = PoolData {
            upload_interval: "60".into(),
            max_bundle_size: "100".into(),
            ..Default::default()
        };
        assert_eq!(
            data.params().unwrap(),
            PoolParams {
                max_bundle_size: 100,
                upload_interval: 60,
            }
        );
    }

    #[test]
    fn test_deserialize_envelope() {
        let body = r#"{"pool":{"id":"0","data":{"current_key":"7","start_key":"1","upload_interval":"60","max_bundle_size":"100","runtime":"@kyvejs/tendermint"}}}"#;
        let response: PoolResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.pool.data.height().unwrap().0, 7);
    }
}
