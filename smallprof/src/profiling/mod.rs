//! Profiling core modules
//!
//! This module contains the sampling machinery:
//! - Host capability traits
//! - Lock-free per-thread capture queues
//! - Two-phase capture state machine
//! - Thread registry and the profiler session (host callbacks)
//! - Trace collection and compression
//! - The sampling scheduler thread
//! - Counters and report display

pub mod capture;
pub mod collector;
pub mod display;
pub mod frame_queue;
pub mod host;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod stats;

// Re-export common types
pub use capture::{CaptureEvent, CaptureState, FailureKind, InvalidTransition};
pub use collector::TraceCollector;
pub use display::{display_progress, display_report, display_trace};
pub use frame_queue::FrameQueue;
pub use host::{FrameResolver, Host, StackWalker, ThreadControl, WalkOutcome};
pub use registry::{ThreadCapture, ThreadRegistry};
pub use scheduler::{ProfileSummary, Profiler, Sampler, TickReport};
pub use session::ProfilerSession;
pub use stats::{SamplerStats, StatsSnapshot};
