//! Frame kind classification for distinguishing managed code from native code.
//!
//! The host marks frames executing native code with the sentinel line number
//! [`NATIVE_FRAME_LINE`](smallprof_common::NATIVE_FRAME_LINE). Native frames
//! stay in traces and in the call tree, but they are usually not what a user
//! wants to see as "the method that was running": the hot methods summary
//! attributes a sample to the first meaningful frame instead.
//!
//! # Policy
//!
//! - [`NativeFramePolicy::Keep`] - the innermost frame is always meaningful
//! - [`NativeFramePolicy::Skip`] - walk outward past native frames; fall back
//!   to the innermost frame if the whole stack is native

use serde::Serialize;
use smallprof_common::Frame;

/// Kind of code a frame is executing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrameKind {
    /// Interpreted or compiled managed code
    #[default]
    Managed,
    /// Native (foreign) code called from the runtime
    Native,
}

impl FrameKind {
    #[must_use]
    pub fn is_native(self) -> bool {
        matches!(self, FrameKind::Native)
    }
}

/// Classify a raw frame by its line marker
#[must_use]
pub fn classify_frame(frame: &Frame) -> FrameKind {
    if frame.is_native() {
        FrameKind::Native
    } else {
        FrameKind::Managed
    }
}

/// How native frames are treated when locating the first meaningful frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NativeFramePolicy {
    /// Native frames count like any other frame
    Keep,
    /// Native frames are skipped
    #[default]
    Skip,
}

/// Index of the first meaningful frame, scanning innermost to outermost
///
/// `kinds` is ordered innermost first. Returns `None` only for an empty slice.
#[must_use]
pub fn first_meaningful_frame<I>(kinds: I, policy: NativeFramePolicy) -> Option<usize>
where
    I: IntoIterator<Item = FrameKind>,
{
    let mut first = None;
    for (index, kind) in kinds.into_iter().enumerate() {
        if first.is_none() {
            first = Some(index);
        }
        match policy {
            NativeFramePolicy::Keep => return Some(index),
            NativeFramePolicy::Skip if !kind.is_native() => return Some(index),
            NativeFramePolicy::Skip => {}
        }
    }
    // Entirely native: the innermost frame is the best we have
    first
}
