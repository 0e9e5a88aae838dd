//! Capabilities consumed from the host runtime
//!
//! The profiler core never enumerates threads, delivers signals, reads stack
//! memory or names methods by itself. The host implements these traits and
//! calls back into [`ProfilerSession`](super::ProfilerSession) on thread
//! start/end, on interruption and at safe checkpoints.
//!
//! ## Interrupt-context contract
//!
//! [`StackWalker::capture_top_frame`] is invoked from inside the interrupt
//! handler. Implementations must not allocate, block, take locks that the
//! interrupted code could hold, or call non-reentrant functions.

use smallprof_common::{Frame, ThreadHandle};

use crate::domain::WalkError;

/// Thread enumeration and interruption
pub trait ThreadControl: Send + Sync {
    /// Threads currently alive in the host
    fn enumerate_live_threads(&self) -> Vec<ThreadHandle>;

    /// Deliver an asynchronous interruption to `thread`
    ///
    /// Returns false if the interruption could not be delivered (thread gone).
    fn interrupt(&self, thread: ThreadHandle) -> bool;

    /// Whether `thread` is currently executing (vs. blocked or sleeping)
    ///
    /// Only consulted in active-only sampling mode.
    fn is_running(&self, thread: ThreadHandle) -> bool {
        let _ = thread;
        true
    }
}

/// Result of a successful stack walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkOutcome {
    /// Number of frames written, innermost first
    pub depth: usize,
    /// True if the stack continued past the buffer
    pub truncated: bool,
}

/// Stack inspection primitives
pub trait StackWalker: Send + Sync {
    /// Execution context handed to the handlers by the host
    type Context: ?Sized;

    /// Read the innermost frame of the interrupted thread
    ///
    /// Returns `None` when the thread is in a state where its stack cannot
    /// be determined. Interrupt-safe.
    fn capture_top_frame(&self, ctx: &Self::Context) -> Option<Frame>;

    /// Re-validate a top frame captured at interrupt time
    ///
    /// Called at the checkpoint, before walking. Returns `None` if the frame
    /// no longer exists on the thread's stack.
    fn recompute_top_frame(&self, ctx: &Self::Context, stored: Frame) -> Option<Frame> {
        let _ = ctx;
        Some(stored)
    }

    /// Walk the stack starting at `top`, writing frames innermost first
    ///
    /// The walk stops when `frames` is full; that is reported through
    /// [`WalkOutcome::truncated`], not as an error.
    ///
    /// # Errors
    /// Returns a [`WalkError`] if the stack cannot be walked.
    fn walk_stack_from(
        &self,
        ctx: &Self::Context,
        top: Frame,
        frames: &mut [Frame],
    ) -> Result<WalkOutcome, WalkError>;
}

/// Method name resolution
pub trait FrameResolver: Send + Sync {
    /// Human-readable label for `frame` (`class.method(signature)`)
    fn resolve_frame(&self, frame: &Frame) -> Option<String>;
}

/// Everything the profiler needs from a host
pub trait Host: ThreadControl + StackWalker + FrameResolver + 'static {}

impl<T> Host for T where T: ThreadControl + StackWalker + FrameResolver + 'static {}
