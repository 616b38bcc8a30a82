//! Error types for node lifecycle operations.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use super::NodeMode;

/// Errors from launching, stopping or running the node binary.
#[derive(Debug, Error)]
pub enum NodeError {
    /// The OS refused to spawn the program.
    #[error("failed to spawn {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program started but exited inside the liveness window.
    #[error("process {pid} exited during startup: {status}")]
    ExitedDuringStartup { pid: u32, status: String },

    /// Initial Normal-mode start failed.
    #[error("could not start node initially: {source}")]
    StartFailed {
        #[source]
        source: Box<NodeError>,
    },

    /// A mode transition could not produce a running process.
    #[error("{target} mode enabling failed: {source}")]
    TransitionFailed {
        target: NodeMode,
        #[source]
        source: Box<NodeError>,
    },

    /// The process could not be signalled or reaped.
    #[error("could not terminate process {pid}: {reason}")]
    TerminationFailed { pid: u32, reason: String },

    /// A one-shot command outlived its timeout and was killed.
    #[error("{program} did not finish within {timeout:?}")]
    CommandTimedOut { program: String, timeout: Duration },

    /// Moving the address book in or out of the stash failed.
    #[error("address book {path}: {source}")]
    AddrBook {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl NodeError {
    /// Standardized reason code for logs.
    pub fn reason_code(&self) -> &'static str {
        match self {
            NodeError::SpawnFailed { .. } => "process_spawn_failed",
            NodeError::ExitedDuringStartup { .. } => "process_exited_during_startup",
            NodeError::StartFailed { .. } => "start_failed",
            NodeError::TransitionFailed {
                target: NodeMode::Ghost,
                ..
            } => "ghost_mode_transition_failed",
            NodeError::TransitionFailed {
                target: NodeMode::Normal,
                ..
            } => "normal_mode_transition_failed",
            NodeError::TerminationFailed { .. } => "process_termination_failed",
            NodeError::CommandTimedOut { .. } => "command_timed_out",
            NodeError::AddrBook { .. } => "addr_book_failed",
            NodeError::Io(_) => "io_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_reason_codes() {
        let err = NodeError::TransitionFailed {
            target: NodeMode::Ghost,
            source: Box::new(NodeError::ExitedDuringStartup {
                pid: 7,
                status: "exit status: 1".into(),
            }),
        };
        assert_eq!(err.reason_code(), "ghost_mode_transition_failed");
        assert!(err.to_string().starts_with("ghost mode enabling failed"));
    }
}
