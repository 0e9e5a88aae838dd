//! Trace data models flowing from the checkpoint handler to the call tree
//!
//! ```text
//! checkpoint ──RawCaptureRecord──▶ collector ──Trace──▶ call tree / hotspots
//!             (method ids,                   (labels,
//!              innermost first)               outermost first)
//! ```

use std::collections::HashMap;

use crate::classification::{classify_frame, FrameKind};
use crate::domain::{CaptureOutcome, Frame, MethodId, MethodLabel, ThreadTag};

/// Result of one deferred stack walk
///
/// Frames are innermost first, as the walker produced them. Never longer than
/// the configured maximum stack depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCaptureRecord {
    pub thread: ThreadTag,
    pub outcome: CaptureOutcome,
    pub frames: Vec<Frame>,
}

impl RawCaptureRecord {
    /// Returns true if `other` would produce the same trace
    ///
    /// Used for back-to-back compression; the outcome code is ignored since a
    /// truncated and a complete walk of the same frames render identically.
    #[must_use]
    pub fn same_stack(&self, other: &RawCaptureRecord) -> bool {
        self.thread == other.thread && self.frames == other.frames
    }
}

/// A frame with its method name resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFrame {
    pub label: MethodLabel,
    pub line: i32,
    pub kind: FrameKind,
}

/// Resolved, possibly compressed stack snapshot
///
/// Frames are ordered outermost to innermost, which is the order the call
/// tree consumes them in. `count` is at least 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace {
    pub thread: ThreadTag,
    pub frames: Vec<ResolvedFrame>,
    pub count: u64,
}

impl Trace {
    /// Labels outermost first
    pub fn labels(&self) -> impl Iterator<Item = &MethodLabel> + '_ {
        self.frames.iter().map(|f| &f.label)
    }

    /// Frame kinds innermost first, for [`first_meaningful_frame`](crate::classification::first_meaningful_frame)
    pub fn kinds_innermost_first(&self) -> impl Iterator<Item = FrameKind> + '_ {
        self.frames.iter().rev().map(|f| f.kind)
    }
}

/// Per-method label cache
///
/// The host resolver may be slow (it walks runtime metadata), and the same
/// methods show up in almost every trace. Failed resolutions are cached too.
#[derive(Debug, Default)]
pub struct LabelCache {
    labels: HashMap<MethodId, Option<MethodLabel>>,
    hits: u64,
    misses: u64,
}

impl LabelCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Label for `frame`, calling `resolve` on first sight of its method
    pub fn label_for<F>(&mut self, frame: &Frame, resolve: F) -> Option<MethodLabel>
    where
        F: FnOnce(&Frame) -> Option<String>,
    {
        if let Some(cached) = self.labels.get(&frame.method) {
            self.hits += 1;
            return cached.clone();
        }
        self.misses += 1;
        let label = resolve(frame).and_then(MethodLabel::try_new);
        self.labels.insert(frame.method, label.clone());
        label
    }

    /// Resolve an innermost-first frame slice into an outermost-first trace
    ///
    /// Returns the resolved frames and how many frames could not be named.
    pub fn resolve_frames<F>(&mut self, frames: &[Frame], mut resolve: F) -> (Vec<ResolvedFrame>, u64)
    where
        F: FnMut(&Frame) -> Option<String>,
    {
        let mut resolved = Vec::with_capacity(frames.len());
        let mut failed = 0;
        for frame in frames.iter().rev() {
            match self.label_for(frame, &mut resolve) {
                Some(label) => resolved.push(ResolvedFrame {
                    label,
                    line: frame.line,
                    kind: classify_frame(frame),
                }),
                None => failed += 1,
            }
        }
        (resolved, failed)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// (hits, misses)
    #[must_use]
    pub fn hit_stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}
