//! Domain model for smallprof
//!
//! This module contains core domain types and errors that provide:
//! - Compile-time safety via newtype pattern
//! - Self-documenting function signatures
//! - Structured error handling

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{
    CaptureOutcome, Frame, MethodId, MethodLabel, ThreadHandle, ThreadName, ThreadTag,
};

pub use errors::{ConfigError, ExportError, ProfilerError, WalkError};
