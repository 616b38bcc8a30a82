//! supervysor library.
//!
//! This crate primarily ships the `supervysor` binary, but the control loop,
//! process management, pruning and backups are exposed as a library for integration
//! testing.

pub mod backup;
pub mod config;
pub mod metrics;
pub mod node;
pub mod pruning;
pub mod settings;
pub mod supervisor;
