//! Trace collector: resolution and back-to-back compression
//!
//! When a thread sits in the same place for several samples, its consecutive
//! records are identical. The collector keeps one pending trace per thread
//! and folds repeats into its count instead of resolving and merging each of
//! them. Records of other threads in between do not break a run.
//!
//! ```text
//! submit(t0: A) -> None          t0 = A x1
//! submit(t1: A) -> None          t0 = A x1, t1 = A x1
//! submit(t0: A) -> None          t0 = A x2, t1 = A x1
//! submit(t0: B) -> Some(A x2)    t0 = B x1, t1 = A x1
//! retire(t1)    -> Some(A x1)    t0 = B x1
//! flush()       -> [B x1]
//! ```
//!
//! Only each thread's immediately preceding record is compared (O(1)
//! lookback per thread).

use std::collections::HashMap;
use std::sync::Arc;

use log::trace;

use super::host::FrameResolver;
use super::stats::SamplerStats;
use crate::domain::ThreadTag;
use crate::trace_data::{LabelCache, RawCaptureRecord, Trace};

#[derive(Debug)]
struct Pending {
    record: RawCaptureRecord,
    trace: Trace,
}

/// Turns walked records into weighted, labelled traces
#[derive(Debug)]
pub struct TraceCollector {
    labels: LabelCache,
    pending: HashMap<ThreadTag, Pending>,
    stats: Arc<SamplerStats>,
}

impl TraceCollector {
    #[must_use]
    pub fn new(stats: Arc<SamplerStats>) -> Self {
        Self { labels: LabelCache::new(), pending: HashMap::new(), stats }
    }

    /// Accept one walked record
    ///
    /// Returns the thread's previously pending trace when `record` starts a
    /// new one. Records without frames and records whose frames all fail to
    /// resolve are dropped.
    pub fn submit<R>(&mut self, record: RawCaptureRecord, resolver: &R) -> Option<Trace>
    where
        R: FrameResolver + ?Sized,
    {
        if !record.outcome.has_frames() || record.frames.is_empty() {
            self.stats.record_empty_trace();
            return None;
        }

        let thread = record.thread;
        if let Some(pending) = self.pending.get_mut(&thread) {
            if pending.record.same_stack(&record) {
                pending.trace.count += 1;
                self.stats.record_compressed();
                return None;
            }
        }

        let previous = self.pending.remove(&thread).map(|p| p.trace);
        if let Some(next) = self.resolve(record, resolver) {
            self.pending.insert(thread, next);
        }
        previous
    }

    /// Emit the pending trace of an ended thread
    pub fn retire(&mut self, thread: ThreadTag) -> Option<Trace> {
        self.pending.remove(&thread).map(|p| p.trace)
    }

    /// Emit every pending trace, ordered by thread tag
    pub fn flush(&mut self) -> Vec<Trace> {
        let mut traces: Vec<Trace> = self.pending.drain().map(|(_, p)| p.trace).collect();
        traces.sort_by_key(|t| t.thread);
        traces
    }

    fn resolve<R>(&mut self, record: RawCaptureRecord, resolver: &R) -> Option<Pending>
    where
        R: FrameResolver + ?Sized,
    {
        let (frames, failed) =
            self.labels.resolve_frames(&record.frames, |frame| resolver.resolve_frame(frame));
        if failed > 0 {
            self.stats.record_resolve_failed(failed);
        }
        if frames.is_empty() {
            trace!("No frame of a {}-frame trace on {} resolved", record.frames.len(), record.thread);
            self.stats.record_empty_trace();
            return None;
        }

        let trace = Trace { thread: record.thread, frames, count: 1 };
        Some(Pending { record, trace })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CaptureOutcome, Frame, MethodId, ThreadTag};

    struct Names;

    impl FrameResolver for Names {
        fn resolve_frame(&self, frame: &Frame) -> Option<String> {
            (frame.method.0 < 100).then(|| format!("m{}", frame.method.0))
        }
    }

    fn record(thread: u32, ids: &[u64]) -> RawCaptureRecord {
        RawCaptureRecord {
            thread: ThreadTag(thread),
            outcome: CaptureOutcome::Success,
            frames: ids.iter().map(|&id| Frame::new(MethodId(id), 0)).collect(),
        }
    }

    fn labels(trace: &Trace) -> Vec<&str> {
        trace.labels().map(|l| l.as_str()).collect()
    }

    #[test]
    fn test_identical_records_compress() {
        let stats = Arc::new(SamplerStats::new());
        let mut collector = TraceCollector::new(Arc::clone(&stats));

        for _ in 0..5 {
            assert!(collector.submit(record(0, &[3, 2, 1]), &Names).is_none());
        }
        let traces = collector.flush();
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].count, 5);
        assert_eq!(labels(&traces[0]), ["m1", "m2", "m3"]);
        assert!(collector.flush().is_empty());
        assert_eq!(stats.snapshot().compressed, 4);
    }

    #[test]
    fn test_new_stack_emits_previous() {
        let mut collector = TraceCollector::new(Arc::new(SamplerStats::new()));
        collector.submit(record(0, &[2, 1]), &Names);
        collector.submit(record(0, &[2, 1]), &Names);

        let emitted = collector.submit(record(0, &[3, 1]), &Names).unwrap();
        assert_eq!(emitted.count, 2);
        assert_eq!(labels(&emitted), ["m1", "m2"]);

        let last = collector.flush();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].count, 1);
        assert_eq!(labels(&last[0]), ["m1", "m3"]);
    }

    #[test]
    fn test_same_stack_on_other_thread_is_not_compressed() {
        let stats = Arc::new(SamplerStats::new());
        let mut collector = TraceCollector::new(Arc::clone(&stats));
        assert!(collector.submit(record(0, &[1]), &Names).is_none());
        assert!(collector.submit(record(1, &[1]), &Names).is_none());

        let traces = collector.flush();
        assert_eq!(traces.len(), 2);
        assert_eq!(traces[0].thread, ThreadTag(0));
        assert_eq!(traces[1].thread, ThreadTag(1));
        assert!(traces.iter().all(|t| t.count == 1));
        assert_eq!(stats.snapshot().compressed, 0);
    }

    #[test]
    fn test_interleaved_threads_compress_independently() {
        let stats = Arc::new(SamplerStats::new());
        let mut collector = TraceCollector::new(Arc::clone(&stats));
        for _ in 0..3 {
            assert!(collector.submit(record(0, &[2, 1]), &Names).is_none());
            assert!(collector.submit(record(1, &[2, 1]), &Names).is_none());
        }

        let traces = collector.flush();
        assert_eq!(traces.len(), 2);
        assert!(traces.iter().all(|t| t.count == 3));
        assert_eq!(stats.snapshot().compressed, 4);
    }

    #[test]
    fn test_other_thread_does_not_emit_pending_trace() {
        let mut collector = TraceCollector::new(Arc::new(SamplerStats::new()));
        collector.submit(record(0, &[1]), &Names);
        collector.submit(record(1, &[2]), &Names);
        collector.submit(record(0, &[1]), &Names);

        let emitted = collector.submit(record(0, &[3]), &Names).unwrap();
        assert_eq!(emitted.thread, ThreadTag(0));
        assert_eq!(emitted.count, 2);
    }

    #[test]
    fn test_retire_emits_only_that_thread() {
        let mut collector = TraceCollector::new(Arc::new(SamplerStats::new()));
        collector.submit(record(0, &[1]), &Names);
        collector.submit(record(1, &[1]), &Names);
        collector.submit(record(1, &[1]), &Names);

        let retired = collector.retire(ThreadTag(1)).unwrap();
        assert_eq!(retired.count, 2);
        assert!(collector.retire(ThreadTag(1)).is_none());

        let rest = collector.flush();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].thread, ThreadTag(0));
    }

    #[test]
    fn test_only_immediate_predecessor_is_compared() {
        let mut collector = TraceCollector::new(Arc::new(SamplerStats::new()));
        collector.submit(record(0, &[1]), &Names);
        collector.submit(record(0, &[2]), &Names);
        let emitted = collector.submit(record(0, &[1]), &Names).unwrap();
        assert_eq!(labels(&emitted), ["m2"]);
    }

    #[test]
    fn test_unresolvable_trace_is_dropped() {
        let stats = Arc::new(SamplerStats::new());
        let mut collector = TraceCollector::new(Arc::clone(&stats));

        assert!(collector.submit(record(0, &[500, 501]), &Names).is_none());
        assert!(collector.flush().is_empty());

        let snap = stats.snapshot();
        assert_eq!(snap.empty_traces, 1);
        assert_eq!(snap.resolve_failed, 2);
    }

    #[test]
    fn test_partial_resolution_keeps_named_frames() {
        let stats = Arc::new(SamplerStats::new());
        let mut collector = TraceCollector::new(Arc::clone(&stats));
        collector.submit(record(0, &[2, 500, 1]), &Names);
        let traces = collector.flush();
        assert_eq!(labels(&traces[0]), ["m1", "m2"]);
        assert_eq!(stats.snapshot().resolve_failed, 1);
    }

    #[test]
    fn test_failed_outcomes_are_not_traces() {
        let stats = Arc::new(SamplerStats::new());
        let mut collector = TraceCollector::new(Arc::clone(&stats));
        let mut raw = record(0, &[1]);
        raw.outcome = CaptureOutcome::NoTopFrame;
        assert!(collector.submit(raw, &Names).is_none());
        assert!(collector.flush().is_empty());
        assert_eq!(stats.snapshot().empty_traces, 1);
    }
}
