//! Error types for the activity-window engine.
//!
//! The coordination core (observables, trackers, controllers) never fails:
//! misuse is absorbed and panicking callbacks are isolated. Errors only arise
//! at the edges: configuration, replay scripts and I/O.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while loading or running a replay script.
#[derive(Error, Debug)]
pub enum ReplayError {
    /// A script line is not a valid step.
    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// A step is timestamped before the step preceding it.
    #[error("line {line}: atMs {at_ms} is earlier than the previous step ({previous_ms})")]
    OutOfOrder {
        line: usize,
        at_ms: u64,
        previous_ms: u64,
    },
}

/// Errors that can occur during engine operations.
///
/// This is the primary error type for the engine crate.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Replay script error.
    #[error("replay error: {0}")]
    Replay(#[from] ReplayError),

    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized `Result` type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
