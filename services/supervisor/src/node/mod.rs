//! Managed node process.
//!
//! - `runtime`: the [`NodeRuntime`] seam plus an in-memory [`MockRuntime`]
//! - `process`: [`ProcessRuntime`], the OS implementation (spawn, SIGTERM, SIGKILL)
//! - `manager`: [`ProcessManager`], which owns the single node handle and its mode
//! - `status`: node height via the node's own ABCI endpoint
//! - `addrbook`: moves the address book aside while in Ghost mode

mod addrbook;
mod error;
mod manager;
mod process;
mod runtime;
mod status;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use addrbook::AddrBook;
pub use error::NodeError;
pub use manager::{NodeProcess, ProcessManager};
pub use process::{ProcessRuntime, ProcessRuntimeConfig};
pub use runtime::{LaunchRecord, MockRuntime, NodeHandle, NodeRuntime};
pub use status::{NodeStatusClient, StatusError};

/// Default p2p port used by a Ghost-mode node.
pub const DEFAULT_GHOST_PORT: u16 = 26658;

/// Seed list passed in Ghost mode. Overrides any seeds in the node's own
/// config.toml, which would otherwise still apply.
pub const GHOST_SEEDS: &str = "_";

/// Operating mode of the managed node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeMode {
    /// Full seed exposure; participates normally in the network.
    Normal,
    /// Seeds overridden with a placeholder and an alternate p2p listen address;
    /// keeps syncing quietly.
    Ghost,
}

impl fmt::Display for NodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeMode::Normal => write!(f, "normal"),
            NodeMode::Ghost => write!(f, "ghost"),
        }
    }
}

/// A program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl LaunchSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Whether `flag` appears among the arguments.
    pub fn has_flag(&self, flag: &str) -> bool {
        self.args.iter().any(|a| a == flag)
    }

    /// Argument following `flag`.
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        flag_value(&self.args, flag)
    }
}

pub(crate) fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

/// Everything needed to start the node binary in either mode.
#[derive(Debug, Clone)]
pub struct NodeLaunchConfig {
    /// Node binary, e.g. `/root/go/bin/osmosisd`.
    pub binary_path: PathBuf,
    /// Node home directory (`--home`).
    pub home_dir: PathBuf,
    /// Address book of the node, stashed while in Ghost mode.
    pub addr_book_path: PathBuf,
    /// Comma-separated seed list exposed in Normal mode.
    pub seeds: String,
    /// p2p port used in Ghost mode.
    pub ghost_port: u16,
}

impl NodeLaunchConfig {
    /// Config with the address book at its default location under `home_dir`.
    pub fn new(binary_path: impl Into<PathBuf>, home_dir: impl Into<PathBuf>, seeds: &str) -> Self {
        let home_dir = home_dir.into();
        Self {
            binary_path: binary_path.into(),
            addr_book_path: home_dir.join("config").join("addrbook.json"),
            home_dir,
            seeds: seeds.to_string(),
            ghost_port: DEFAULT_GHOST_PORT,
        }
    }

    /// `start` invocation for `mode`.
    pub fn launch_spec(&self, mode: NodeMode) -> LaunchSpec {
        let spec = LaunchSpec::new(&self.binary_path)
            .arg("start")
            .arg("--home")
            .arg(self.home_dir.to_string_lossy());

        match mode {
            NodeMode::Normal if self.seeds.trim().is_empty() => spec,
            NodeMode::Normal => spec.arg("--p2p.seeds").arg(self.seeds.trim()),
            NodeMode::Ghost => spec
                .arg("--p2p.seeds")
                .arg(GHOST_SEEDS)
                .arg("--p2p.laddr")
                .arg(format!("tcp://0.0.0.0:{}", self.ghost_port)),
        }
    }
}
