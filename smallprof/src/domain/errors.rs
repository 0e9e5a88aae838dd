//! Structured error types for smallprof
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Per-sample failures are never errors: they are counted in
//! [`crate::profiling::stats`]. Only configuration problems are fatal.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfilerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to spawn sampler thread: {0}")]
    SamplerSpawnFailed(#[source] std::io::Error),

    #[error("Sampler thread panicked")]
    SamplerPanicked,

    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Invalid option or option value. Fatal at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid time value: {0:?}")]
    InvalidInterval(String),

    #[error("Invalid time suffix in {0:?} (expected ns, us, ms or s)")]
    InvalidTimeSuffix(String),

    #[error("Sampling interval must be greater than zero")]
    ZeroInterval,

    #[error("Unknown option: {0:?}")]
    UnknownOption(String),

    #[error("Invalid value {value:?} for option {option}")]
    InvalidValue { option: String, value: String },

    #[error("{0} must be greater than zero")]
    MustBePositive(&'static str),
}

/// Failure reported by the host's stack walker
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkError {
    #[error("Stack walk produced no frames")]
    Empty,

    #[error("Thread stack is not walkable")]
    NotWalkable,
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to write flame graph to {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
