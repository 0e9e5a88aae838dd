//! Lock-free sampling counters and the shutdown report
//!
//! Counters are plain relaxed atomics so the interrupt handler can bump them
//! without locks. `snapshot()` copies them into a [`StatsSnapshot`] for
//! display and serialization.

// Ratios intentionally convert u64 to f64
#![allow(clippy::cast_precision_loss)]

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::capture::FailureKind;
use crate::domain::CaptureOutcome;

/// Per-session sampling counters
#[derive(Debug, Default)]
pub struct SamplerStats {
    /// Interruptions delivered by the scheduler
    signals_sent: AtomicU64,
    /// Interruptions the host could not deliver
    signals_failed: AtomicU64,
    /// Interrupt handler invocations (sampling attempts)
    attempts: AtomicU64,
    /// No top frame: thread was in an unsafe state
    unsafe_state: AtomicU64,
    /// Top frame record rejected by a full queue
    queue_full: AtomicU64,
    /// Records drained at a checkpoint
    tried_at_checkpoint: AtomicU64,
    /// Stored top frame gone by the time of the checkpoint
    top_frame_lost: AtomicU64,
    /// Deferred walk failed (includes `top_frame_lost`)
    walk_failed: AtomicU64,
    /// Deferred walks that produced a stack
    walked: AtomicU64,
    /// Walks that hit the depth limit
    truncated: AtomicU64,
    /// Records discarded because their thread was tearing down
    abandoned: AtomicU64,
    /// Individual frames that could not be named
    resolve_failed: AtomicU64,
    /// Records with no resolvable frame at all
    empty_traces: AtomicU64,
    /// Records folded into the previous trace
    compressed: AtomicU64,
    /// Traces merged into the call tree
    traces_merged: AtomicU64,
    /// Sum of merged trace weights
    samples_merged: AtomicU64,
    /// Completed scheduler ticks
    ticks: AtomicU64,
    /// Ticks that gave up waiting for handlers to report
    tick_timeouts: AtomicU64,
}

macro_rules! counter {
    ($($name:ident => $field:ident),* $(,)?) => {
        $(
            #[inline]
            pub fn $name(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl SamplerStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    counter! {
        record_signal_sent => signals_sent,
        record_signal_failed => signals_failed,
        record_attempt => attempts,
        record_tried_at_checkpoint => tried_at_checkpoint,
        record_empty_trace => empty_traces,
        record_tick => ticks,
        record_tick_timeout => tick_timeouts,
    }

    /// Count a failing terminal capture state
    pub fn record_failure(&self, kind: FailureKind) {
        let counter = match kind {
            FailureKind::UnsafeState => &self.unsafe_state,
            FailureKind::QueueFull => &self.queue_full,
            FailureKind::WalkFailed => &self.walk_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Count the outcome of one deferred walk
    ///
    /// `NoTopFrame` is the top-frame-lost sub-category of walk failures.
    pub fn record_outcome(&self, outcome: CaptureOutcome) {
        match outcome {
            CaptureOutcome::Success => {
                self.walked.fetch_add(1, Ordering::Relaxed);
            }
            CaptureOutcome::Truncated => {
                self.walked.fetch_add(1, Ordering::Relaxed);
                self.truncated.fetch_add(1, Ordering::Relaxed);
            }
            CaptureOutcome::Unsafe => self.record_failure(FailureKind::WalkFailed),
            CaptureOutcome::NoTopFrame => {
                self.top_frame_lost.fetch_add(1, Ordering::Relaxed);
                self.record_failure(FailureKind::WalkFailed);
            }
        }
    }

    pub fn record_abandoned(&self, n: u64) {
        self.abandoned.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_resolve_failed(&self, n: u64) {
        self.resolve_failed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_compressed(&self) {
        self.compressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_merged(&self, weight: u64) {
        self.traces_merged.fetch_add(1, Ordering::Relaxed);
        self.samples_merged.fetch_add(weight, Ordering::Relaxed);
    }

    /// Copy all counters
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            signals_sent: load(&self.signals_sent),
            signals_failed: load(&self.signals_failed),
            attempts: load(&self.attempts),
            unsafe_state: load(&self.unsafe_state),
            queue_full: load(&self.queue_full),
            tried_at_checkpoint: load(&self.tried_at_checkpoint),
            top_frame_lost: load(&self.top_frame_lost),
            walk_failed: load(&self.walk_failed),
            walked: load(&self.walked),
            truncated: load(&self.truncated),
            abandoned: load(&self.abandoned),
            resolve_failed: load(&self.resolve_failed),
            empty_traces: load(&self.empty_traces),
            compressed: load(&self.compressed),
            traces_merged: load(&self.traces_merged),
            samples_merged: load(&self.samples_merged),
            ticks: load(&self.ticks),
            tick_timeouts: load(&self.tick_timeouts),
        }
    }
}

/// Point-in-time copy of [`SamplerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub signals_sent: u64,
    pub signals_failed: u64,
    pub attempts: u64,
    pub unsafe_state: u64,
    pub queue_full: u64,
    pub tried_at_checkpoint: u64,
    pub top_frame_lost: u64,
    pub walk_failed: u64,
    pub walked: u64,
    pub truncated: u64,
    pub abandoned: u64,
    pub resolve_failed: u64,
    pub empty_traces: u64,
    pub compressed: u64,
    pub traces_merged: u64,
    pub samples_merged: u64,
    pub ticks: u64,
    pub tick_timeouts: u64,
}

impl StatsSnapshot {
    /// Attempts that did not end up in the call tree
    ///
    /// Resolve failures are per frame and do not fail a trace by themselves.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.unsafe_state + self.queue_full + self.walk_failed + self.empty_traces + self.abandoned
    }

    /// Failed attempts as a percentage of all attempts
    #[must_use]
    pub fn failure_ratio(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.failed() as f64 / self.attempts as f64 * 100.0
        }
    }

    /// Share of attempts lost to a given category, in percent
    #[must_use]
    pub fn ratio_of(&self, kind: FailureKind) -> f64 {
        let n = match kind {
            FailureKind::UnsafeState => self.unsafe_state,
            FailureKind::QueueFull => self.queue_full,
            FailureKind::WalkFailed => self.walk_failed,
        };
        if self.attempts == 0 {
            0.0
        } else {
            n as f64 / self.attempts as f64 * 100.0
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows: [(&str, u64); 13] = [
            ("Total traces:", self.attempts),
            ("Failed traces:", self.failed()),
            ("Signals sent:", self.signals_sent),
            ("Signals not delivered:", self.signals_failed),
            ("Top frame in handler failed:", self.unsafe_state),
            ("Queue full:", self.queue_full),
            ("Tried at checkpoint:", self.tried_at_checkpoint),
            ("Top frame lost at checkpoint:", self.top_frame_lost),
            ("Walk stack failed:", self.walk_failed),
            ("Truncated stacks:", self.truncated),
            ("Abandoned (thread ended):", self.abandoned),
            ("Frames not resolved:", self.resolve_failed),
            ("Empty traces:", self.empty_traces),
        ];
        for (label, value) in rows {
            writeln!(f, "{label:<32}{value:<10}")?;
        }
        writeln!(f, "{:<32}{:.2}%", "Failed ratio:", self.failure_ratio())?;
        writeln!(
            f,
            "{:<32}unsafe {:.2}% / queue {:.2}% / walk {:.2}%",
            "Failure breakdown:",
            self.ratio_of(FailureKind::UnsafeState),
            self.ratio_of(FailureKind::QueueFull),
            self.ratio_of(FailureKind::WalkFailed),
        )?;
        write!(
            f,
            "{:<32}{} traces / {} samples ({} compressed)",
            "Merged:", self.traces_merged, self.samples_merged, self.compressed
        )
    }
}
