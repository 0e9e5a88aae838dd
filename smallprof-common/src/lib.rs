//! # Shared Data Structures (interrupt context ↔ sampler)
//!
//! Defines the plain-data types that cross the boundary between code running
//! in a restricted interrupt context on a target thread and the rest of the
//! profiler. Everything here is `Copy`, `#[repr(C)]` and allocation-free so it
//! can be written into a pre-allocated queue slot from inside an interrupt
//! handler.
//!
//! ## Capture Pipeline
//!
//! 1. **Interrupt** - the handler records the thread's top [`Frame`] as a
//!    [`TopFrameRecord`] and pushes it into the thread's bounded queue
//! 2. **Checkpoint** - at the next safe point the queue is drained and each
//!    record is walked into a full stack, tagged with a [`CaptureOutcome`]
//!
//! ## Key Types
//!
//! - [`Frame`] - One activation record (method + line)
//! - [`TopFrameRecord`] - Queue slot payload written in interrupt context
//! - [`ThreadHandle`] - Host-assigned opaque thread identity
//! - [`ThreadTag`] - Small sequential id assigned by the thread registry

#![no_std]

use core::fmt;

// ============================================================================
// Limits
// ============================================================================

/// Default maximum number of frames captured per stack walk
///
/// Walks stop here and the record is marked [`CaptureOutcome::Truncated`].
pub const MAX_STACK_DEPTH: usize = 512;

/// Default capacity of each per-thread capture queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024 * 10;

/// Default upper bound on threads interrupted per sampling tick
pub const MAX_THREADS_PER_TICK: usize = 8;

/// Line number the host reports for frames executing native code
pub const NATIVE_FRAME_LINE: i32 = -3;

// ============================================================================
// Identifiers
// ============================================================================

/// Opaque method identifier assigned by the host runtime
///
/// The value `0` is reserved as "no method" and never names a real method.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(pub u64);

impl MethodId {
    /// Placeholder used to fill unused frame slots
    pub const NONE: MethodId = MethodId(0);

    /// Returns true if this id refers to a real method
    #[must_use]
    pub fn is_some(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "method@0x{:x}", self.0)
    }
}

/// Opaque thread identity owned by the host
///
/// This is the handle the host uses to deliver interruptions. It is NOT the
/// same as [`ThreadTag`], which is assigned by the profiler.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadHandle(pub u64);

impl fmt::Display for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TH:{}", self.0)
    }
}

/// Small sequential thread id (0, 1, 2, ...) assigned at registration
///
/// Tags are never reused within a session, so a tag still names the right
/// thread after that thread has ended.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadTag(pub u32);

impl fmt::Display for ThreadTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T#{}", self.0)
    }
}

// ============================================================================
// Frames and Records
// ============================================================================

/// One activation record in a thread's call stack
///
/// Immutable once captured and copied by value wherever it goes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame {
    /// Method executing in this frame
    pub method: MethodId,

    /// Line number (or byte offset) inside the method
    ///
    /// [`NATIVE_FRAME_LINE`] marks a native frame; other negative values mean
    /// the position is unknown.
    pub line: i32,
}

impl Frame {
    /// Filler for pre-allocated frame buffers
    pub const EMPTY: Frame = Frame { method: MethodId::NONE, line: 0 };

    /// Create a frame for `method` at `line`
    #[must_use]
    pub const fn new(method: MethodId, line: i32) -> Self {
        Self { method, line }
    }

    /// Create a native frame for `method`
    #[must_use]
    pub const fn native(method: MethodId) -> Self {
        Self { method, line: NATIVE_FRAME_LINE }
    }

    /// Returns true if this frame executes native code
    #[must_use]
    pub fn is_native(&self) -> bool {
        self.line == NATIVE_FRAME_LINE
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Record written into a capture queue slot from interrupt context
///
/// **Size**: 24 bytes. Small on purpose: queues hold thousands of these per
/// thread and the full walk is deferred to the checkpoint.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopFrameRecord {
    /// Thread that was interrupted
    pub thread: ThreadTag,

    /// Where the thread was executing when the interrupt arrived
    pub top: Frame,
}

impl Default for TopFrameRecord {
    fn default() -> Self {
        Self { thread: ThreadTag(u32::MAX), top: Frame::EMPTY }
    }
}

/// Outcome code attached to a capture record
///
/// **Values**:
/// - `Success`: full stack captured
/// - `Truncated`: walk stopped at the maximum depth (not an error)
/// - `Unsafe`: the thread could not be inspected at all
/// - `NoTopFrame`: the stored top frame was gone by the time of the walk
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureOutcome {
    Success = 0,
    Truncated = 1,
    Unsafe = 2,
    NoTopFrame = 3,
}

impl CaptureOutcome {
    /// Returns true if a record with this outcome carries a usable stack
    #[must_use]
    pub fn has_frames(self) -> bool {
        matches!(self, CaptureOutcome::Success | CaptureOutcome::Truncated)
    }
}
