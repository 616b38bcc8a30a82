//! Known KYVE networks and their REST endpoints.

use std::fmt;
use std::str::FromStr;

use crate::error::PoolError;

const MAINNET_ENDPOINTS: &[&str] = &["https://api-eu-1.kyve.network"];
const KAON_ENDPOINTS: &[&str] = &["https://api-eu-1.kaon.kyve.network"];
const KORELLIA_ENDPOINTS: &[&str] = &["https://api.korellia.kyve.network"];

/// A KYVE network with built-in REST endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Chain {
    /// `kyve-1`
    Mainnet,
    /// `kaon-1`
    Kaon,
    /// `korellia`
    Korellia,
}

impl Chain {
    /// Chain id as used on the command line and in the config file.
    pub fn id(&self) -> &'static str {
        match self {
            Chain::Mainnet => "kyve-1",
            Chain::Kaon => "kaon-1",
            Chain::Korellia => "korellia",
        }
    }

    /// Built-in endpoints, in priority order.
    pub fn endpoints(&self) -> &'static [&'static str] {
        match self {
            Chain::Mainnet => MAINNET_ENDPOINTS,
            Chain::Kaon => KAON_ENDPOINTS,
            Chain::Korellia => KORELLIA_ENDPOINTS,
        }
    }

    /// Built-in endpoints followed by `fallback`, with blanks dropped.
    pub fn endpoints_with_fallback(&self, fallback: &[String]) -> Vec<String> {
        self.endpoints()
            .iter()
            .map(|e| e.to_string())
            .chain(fallback.iter().cloned())
            .map(|e| e.trim().trim_end_matches('/').to_string())
            .filter(|e| !e.is_empty())
            .collect()
    }
}

impl FromStr for Chain {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kyve-1" => Ok(Chain::Mainnet),
            "kaon-1" => Ok(Chain::Kaon),
            "korellia" => Ok(Chain::Korellia),
            other => Err(PoolError::UnknownChain(other.to_string())),
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Split a comma-separated endpoint list, ignoring empty entries.
pub fn parse_endpoint_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .collect()
}
