//! Profiler session: the host-facing side of the profiler
//!
//! A [`ProfilerSession`] owns everything one profiling run needs (config,
//! thread registry, counters and the channel carrying walked records to the
//! sampler thread). Hosts call its `on_*` methods from their lifecycle hooks:
//!
//! ```text
//! host thread start ──► on_thread_start ──► Arc<ThreadCapture> (kept by host)
//! interrupt arrives ──► on_interrupt     ──► top frame pushed to capture queue
//! safe checkpoint   ──► on_checkpoint    ──► queue drained, stacks walked,
//!                                            RawCaptureRecords sent to sampler
//! host thread end   ──► on_thread_end
//! ```
//!
//! Several sessions may coexist; nothing here is process-global.

use std::sync::Arc;

use crossbeam_channel::Sender;
use log::{debug, trace};
use smallprof_common::TopFrameRecord;

use super::capture::{CaptureEvent, CaptureState};
use super::host::Host;
use super::registry::{ThreadCapture, ThreadRegistry};
use super::stats::SamplerStats;
use crate::config::SamplerConfig;
use crate::domain::{CaptureOutcome, Frame, ThreadHandle, ThreadName};
use crate::trace_data::RawCaptureRecord;

/// State shared by the host callbacks and the sampler thread
pub struct ProfilerSession<H: Host> {
    host: Arc<H>,
    config: SamplerConfig,
    registry: ThreadRegistry,
    stats: Arc<SamplerStats>,
    walked_tx: Sender<RawCaptureRecord>,
}

impl<H: Host> ProfilerSession<H> {
    /// Create a session sending walked records to `walked_tx`
    ///
    /// `config` is expected to be validated already.
    pub fn new(host: Arc<H>, config: SamplerConfig, walked_tx: Sender<RawCaptureRecord>) -> Self {
        let registry = ThreadRegistry::new(config.queue_capacity);
        Self { host, config, registry, stats: Arc::new(SamplerStats::new()), walked_tx }
    }

    #[must_use]
    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    #[must_use]
    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &ThreadRegistry {
        &self.registry
    }

    #[must_use]
    pub fn stats(&self) -> &Arc<SamplerStats> {
        &self.stats
    }

    /// Register a thread that just started
    ///
    /// The returned capture must be passed back to `on_interrupt` and
    /// `on_checkpoint` for this thread.
    pub fn on_thread_start(&self, handle: ThreadHandle, name: &str) -> Arc<ThreadCapture> {
        self.registry.register(handle, ThreadName::new(name))
    }

    /// Unregister a thread that is ending
    ///
    /// Must be called on the ending thread itself (or after it can no longer
    /// be interrupted): records still queued are discarded here and counted
    /// as abandoned.
    pub fn on_thread_end(&self, handle: ThreadHandle) {
        if let Some(capture) = self.registry.unregister(handle) {
            self.abandon_pending(&capture);
        }
    }

    /// Interrupt handler: record the top frame of the interrupted thread
    ///
    /// Runs in interrupt context on the target thread. Allocation-free,
    /// lock-free and non-blocking; never logs.
    pub fn on_interrupt(&self, capture: &ThreadCapture, ctx: &H::Context) -> CaptureState {
        self.stats.record_attempt();

        let state = match self.host.capture_top_frame(ctx) {
            None => CaptureState::SignalSent.after(CaptureEvent::TopFrameMissing),
            Some(top) => {
                let state = CaptureState::SignalSent.after(CaptureEvent::TopFrameFound);
                let record = TopFrameRecord { thread: capture.tag(), top };
                if capture.queue().push(record) {
                    state.after(CaptureEvent::Enqueued)
                } else {
                    state.after(CaptureEvent::QueueRejected)
                }
            }
        };

        if let Some(kind) = state.failure() {
            self.stats.record_failure(kind);
        }
        capture.mark_interrupt_seen();
        state
    }

    /// Checkpoint handler: walk every queued top frame into a full stack
    ///
    /// Runs on the target thread at a point where its stack is walkable.
    /// Returns the number of records forwarded to the sampler.
    pub fn on_checkpoint(&self, capture: &ThreadCapture, ctx: &H::Context) -> usize {
        if capture.is_retired() {
            self.abandon_pending(capture);
            return 0;
        }
        if capture.queue().is_empty() {
            return 0;
        }

        let mut buffer = vec![Frame::EMPTY; self.config.max_stack_depth];
        let mut forwarded = 0;
        while let Some(record) = capture.queue().pop() {
            self.stats.record_tried_at_checkpoint();
            match self.walk_record(ctx, record, &mut buffer) {
                Ok(raw) => {
                    self.stats.record_outcome(raw.outcome);
                    if self.forward(raw) == CaptureState::Done {
                        forwarded += 1;
                    }
                }
                Err(outcome) => self.stats.record_outcome(outcome),
            }
        }
        forwarded
    }

    /// Walk one queued record from its stored top frame
    ///
    /// On failure returns the outcome code classifying it: `NoTopFrame` when
    /// the stored frame is no longer on the stack, `Unsafe` when the walk
    /// errored or produced nothing.
    fn walk_record(
        &self,
        ctx: &H::Context,
        record: TopFrameRecord,
        buffer: &mut [Frame],
    ) -> Result<RawCaptureRecord, CaptureOutcome> {
        let Some(top) = self.host.recompute_top_frame(ctx, record.top) else {
            trace!("Top frame of {} no longer on stack", record.thread);
            return Err(CaptureOutcome::NoTopFrame);
        };

        let outcome = match self.host.walk_stack_from(ctx, top, buffer) {
            Ok(outcome) if outcome.depth > 0 => outcome,
            Ok(_) => {
                trace!("Empty stack walk on {}", record.thread);
                return Err(CaptureOutcome::Unsafe);
            }
            Err(err) => {
                trace!("Stack walk failed on {}: {err}", record.thread);
                return Err(CaptureOutcome::Unsafe);
            }
        };

        let code = if outcome.truncated { CaptureOutcome::Truncated } else { CaptureOutcome::Success };
        let depth = outcome.depth.min(buffer.len());
        Ok(RawCaptureRecord { thread: record.thread, outcome: code, frames: buffer[..depth].to_vec() })
    }

    /// Hand a walked record to the sampler thread
    ///
    /// Returns `Done` once sent; stays `Walked` (and counts the record as
    /// abandoned) if the sampler is already gone.
    fn forward(&self, raw: RawCaptureRecord) -> CaptureState {
        let walked = CaptureState::Queued.after(CaptureEvent::WalkSucceeded);
        if self.walked_tx.send(raw).is_ok() {
            walked.after(CaptureEvent::Forwarded)
        } else {
            self.stats.record_abandoned(1);
            walked
        }
    }

    fn abandon_pending(&self, capture: &ThreadCapture) {
        let dropped = capture.queue().clear();
        if dropped > 0 {
            debug!("Discarded {dropped} pending records of ended thread {}", capture.tag());
            self.stats.record_abandoned(dropped as u64);
        }
    }
}

impl<H: Host> std::fmt::Debug for ProfilerSession<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfilerSession")
            .field("config", &self.config)
            .field("threads", &self.registry.len())
            .finish_non_exhaustive()
    }
}
