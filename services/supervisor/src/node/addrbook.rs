//! Address book stash for Ghost mode.
//!
//! A Ghost-mode node must not dial the peers it learned while running
//! normally, so its address book is moved aside before launch and moved back
//! before the next Normal-mode launch.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::NodeError;

const STASH_SUFFIX: &str = "supervysor-stash";

/// The node's `addrbook.json` and its stash location.
#[derive(Debug, Clone)]
pub struct AddrBook {
    path: PathBuf,
}

impl AddrBook {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stash_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".");
        name.push(STASH_SUFFIX);
        self.path.with_file_name(name)
    }

    /// Move the address book aside. Returns whether anything moved.
    ///
    /// An existing stash is never overwritten: it holds the Normal-mode book,
    /// and a live book next to it was written by an earlier Ghost-mode run, so
    /// that one is discarded instead.
    pub fn stash(&self) -> Result<bool, NodeError> {
        if !self.path.exists() {
            return Ok(false);
        }
        let stash = self.stash_path();
        if stash.exists() {
            fs::remove_file(&self.path).map_err(|source| NodeError::AddrBook {
                path: self.path.clone(),
                source,
            })?;
            debug!(path = %self.path.display(), "Discarded Ghost-mode address book, stash kept");
            return Ok(false);
        }
        fs::rename(&self.path, &stash).map_err(|source| NodeError::AddrBook {
            path: self.path.clone(),
            source,
        })?;
        debug!(from = %self.path.display(), to = %stash.display(), "Stashed address book");
        Ok(true)
    }

    /// Put a stashed address book back, replacing whatever the node wrote
    /// in the meantime. Returns whether anything moved.
    pub fn restore(&self) -> Result<bool, NodeError> {
        let stash = self.stash_path();
        if !stash.exists() {
            return Ok(false);
        }
        fs::rename(&stash, &self.path).map_err(|source| NodeError::AddrBook {
            path: stash.clone(),
            source,
        })?;
        debug!(from = %stash.display(), to = %self.path.display(), "Restored address book");
        Ok(true)
    }
}
