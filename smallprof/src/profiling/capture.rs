//! # Two-Phase Capture State Machine
//!
//! A single sampling attempt on a single thread moves through these states:
//!
//! ```text
//! Idle ──signal──▶ SignalSent ──┬─top frame──▶ TopFrameCaptured ──┬─push ok──▶ Queued
//!                               │                                 │
//!                               └─unsafe────▶ TopFrameUnavailable └─full────▶ QueueFull
//!
//! Queued ──walk ok──▶ Walked ──forward──▶ Done
//!    │
//!    └─walk failed─▶ WalkFailed
//! ```
//!
//! The first half (up to `Queued`) runs inside the interrupt handler on the
//! target thread and must stay allocation-free; every type here is `Copy`.
//! The second half runs at the thread's next safe checkpoint, where walking
//! the full stack is allowed.
//!
//! Terminal states are `TopFrameUnavailable`, `QueueFull`, `WalkFailed` and
//! `Done`. Each failing terminal state maps to exactly one [`FailureKind`].

use std::fmt;

use thiserror::Error;

/// Where a sampling attempt currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureState {
    Idle,
    SignalSent,
    TopFrameCaptured,
    TopFrameUnavailable,
    Queued,
    QueueFull,
    Walked,
    WalkFailed,
    Done,
}

/// Input driving a [`CaptureState`] transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureEvent {
    /// Scheduler delivered the interruption
    SignalDelivered,
    /// Interrupt handler read the top frame
    TopFrameFound,
    /// Thread was in an unsafe state; no top frame
    TopFrameMissing,
    /// Top frame record accepted by the queue
    Enqueued,
    /// Queue was full
    QueueRejected,
    /// Deferred walk produced a stack
    WalkSucceeded,
    /// Deferred walk failed (or the stored top frame was gone)
    WalkFailed,
    /// Walked record handed to the collector
    Forwarded,
}

/// Failure category of a terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    UnsafeState,
    QueueFull,
    WalkFailed,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::UnsafeState => "unsafe-state",
            FailureKind::QueueFull => "queue-full",
            FailureKind::WalkFailed => "walk-failed",
        };
        f.write_str(s)
    }
}

/// Rejected transition
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid capture transition: {from:?} on {event:?}")]
pub struct InvalidTransition {
    pub from: CaptureState,
    pub event: CaptureEvent,
}

impl CaptureState {
    /// Checked transition
    ///
    /// # Errors
    /// Returns [`InvalidTransition`] if `event` is not valid in this state.
    /// Terminal states accept no events.
    pub fn advance(self, event: CaptureEvent) -> Result<CaptureState, InvalidTransition> {
        use CaptureEvent as E;
        use CaptureState as S;

        let next = match (self, event) {
            (S::Idle, E::SignalDelivered) => S::SignalSent,
            (S::SignalSent, E::TopFrameFound) => S::TopFrameCaptured,
            (S::SignalSent, E::TopFrameMissing) => S::TopFrameUnavailable,
            (S::TopFrameCaptured, E::Enqueued) => S::Queued,
            (S::TopFrameCaptured, E::QueueRejected) => S::QueueFull,
            (S::Queued, E::WalkSucceeded) => S::Walked,
            (S::Queued, E::WalkFailed) => S::WalkFailed,
            (S::Walked, E::Forwarded) => S::Done,
            (from, event) => return Err(InvalidTransition { from, event }),
        };
        Ok(next)
    }

    /// Transition that leaves the state unchanged on an invalid event
    ///
    /// Used on the interrupt path, where there is nothing useful to do with
    /// an error value.
    #[must_use]
    pub fn after(self, event: CaptureEvent) -> CaptureState {
        self.advance(event).unwrap_or(self)
    }

    /// Returns true if no further events are accepted
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CaptureState::TopFrameUnavailable
                | CaptureState::QueueFull
                | CaptureState::WalkFailed
                | CaptureState::Done
        )
    }

    /// Failure category for failing terminal states
    #[must_use]
    pub fn failure(self) -> Option<FailureKind> {
        match self {
            CaptureState::TopFrameUnavailable => Some(FailureKind::UnsafeState),
            CaptureState::QueueFull => Some(FailureKind::QueueFull),
            CaptureState::WalkFailed => Some(FailureKind::WalkFailed),
            _ => None,
        }
    }

    /// Returns true if the attempt is waiting for the thread's next checkpoint
    #[must_use]
    pub fn awaits_checkpoint(self) -> bool {
        self == CaptureState::Queued
    }
}
