//! End-to-end sampling ticks against a scripted host
//!
//! `ScriptedHost` runs the interrupt and checkpoint handlers synchronously
//! inside `interrupt()`, so a single `Sampler::tick` covers the whole
//! pipeline: selection, capture, walk, compression, labeling and merge.
//!
//! Runs of identical stacks stay pending in the collector until the stack
//! changes, the thread ends or the sampler finishes, so most tests call
//! `finish()` before inspecting the tree.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, Weak};

use crossbeam_channel::unbounded;
use smallprof::analysis::CallTree;
use smallprof::config::{SamplerConfig, SamplingMode};
use smallprof::domain::{Frame, MethodId, ThreadHandle, WalkError};
use smallprof::profiling::{
    FailureKind, FrameResolver, ProfilerSession, Sampler, StackWalker, ThreadControl, WalkOutcome,
};

const MAIN: MethodId = MethodId(1);
const FOO: MethodId = MethodId(2);
const BAR: MethodId = MethodId(3);
const LABELS: [&str; 3] = ["Main.main", "Main.foo", "Main.bar"];

#[derive(Debug, Clone)]
struct ScriptedThread {
    /// Innermost first; empty means the top frame is unavailable
    stack: Vec<Frame>,
    running: bool,
    reachable: bool,
}

#[derive(Default)]
struct ScriptedHost {
    threads: Mutex<HashMap<ThreadHandle, ScriptedThread>>,
    session: OnceLock<Weak<ProfilerSession<ScriptedHost>>>,
}

impl ThreadControl for ScriptedHost {
    fn enumerate_live_threads(&self) -> Vec<ThreadHandle> {
        let mut live: Vec<_> = self.threads.lock().unwrap().keys().copied().collect();
        live.sort();
        live
    }

    fn interrupt(&self, handle: ThreadHandle) -> bool {
        let Some(thread) = self.threads.lock().unwrap().get(&handle).cloned() else {
            return false;
        };
        if !thread.reachable {
            return false;
        }
        let session = self.session.get().and_then(Weak::upgrade).unwrap();
        let capture = session.registry().capture(handle).unwrap();
        session.on_interrupt(&capture, &thread.stack[..]);
        session.on_checkpoint(&capture, &thread.stack[..]);
        true
    }

    fn is_running(&self, handle: ThreadHandle) -> bool {
        self.threads.lock().unwrap().get(&handle).is_some_and(|t| t.running)
    }
}

impl StackWalker for ScriptedHost {
    type Context = [Frame];

    fn capture_top_frame(&self, ctx: &[Frame]) -> Option<Frame> {
        ctx.first().copied()
    }

    fn walk_stack_from(
        &self,
        ctx: &[Frame],
        _top: Frame,
        frames: &mut [Frame],
    ) -> Result<WalkOutcome, WalkError> {
        let depth = ctx.len().min(frames.len());
        frames[..depth].copy_from_slice(&ctx[..depth]);
        Ok(WalkOutcome { depth, truncated: ctx.len() > frames.len() })
    }
}

impl FrameResolver for ScriptedHost {
    fn resolve_frame(&self, frame: &Frame) -> Option<String> {
        let index = usize::try_from(frame.method.0).ok()?.checked_sub(1)?;
        LABELS.get(index).map(ToString::to_string)
    }
}

fn main_foo_bar() -> Vec<Frame> {
    vec![Frame::new(BAR, 30), Frame::new(FOO, 20), Frame::new(MAIN, 10)]
}

fn thread(stack: Vec<Frame>) -> ScriptedThread {
    ScriptedThread { stack, running: true, reachable: true }
}

struct Harness {
    host: Arc<ScriptedHost>,
    session: Arc<ProfilerSession<ScriptedHost>>,
    tree: Arc<CallTree>,
    sampler: Sampler<ScriptedHost>,
}

fn harness(config: SamplerConfig, threads: Vec<ScriptedThread>) -> Harness {
    let host = Arc::new(ScriptedHost::default());
    let (tx, rx) = unbounded();
    let session = Arc::new(ProfilerSession::new(Arc::clone(&host), config, tx));
    host.session.set(Arc::downgrade(&session)).unwrap();

    for (i, t) in threads.into_iter().enumerate() {
        let handle = ThreadHandle(i as u64 + 1);
        host.threads.lock().unwrap().insert(handle, t);
        session.on_thread_start(handle, &format!("worker-{i}"));
    }

    let tree = Arc::new(CallTree::new());
    let sampler = Sampler::new(Arc::clone(&session), rx, Arc::clone(&tree)).with_seed(7);
    Harness { host, session, tree, sampler }
}

#[test]
fn test_single_tick_three_identical_stacks_one_unavailable() {
    let threads = vec![
        thread(main_foo_bar()),
        thread(main_foo_bar()),
        thread(main_foo_bar()),
        thread(Vec::new()),
    ];
    let mut h = harness(SamplerConfig::default(), threads);

    let report = h.sampler.tick();
    assert_eq!(report.selected, 4);
    assert_eq!(report.interrupted, 4);
    assert_eq!(report.reported, 4);
    // Each thread's trace is still pending
    assert_eq!(report.merged, 0);
    assert_eq!(h.tree.total_samples(), 0);

    let summary = h.sampler.finish();
    assert_eq!(summary.stats.traces_merged, 3);
    let root = h.tree.serialize(100);
    assert_eq!(root.name, "main");
    assert_eq!(root.value, 3);
    let leaf = root.path(["Main.main", "Main.foo", "Main.bar"]).unwrap();
    assert_eq!(leaf.value, 3);
    assert!(leaf.children.is_empty());

    let stats = h.session.stats().snapshot();
    assert_eq!(stats.attempts, 4);
    assert_eq!(stats.unsafe_state, 1);
    assert_eq!(stats.walked, 3);
    assert_eq!(stats.failed(), 1);
    assert!((stats.ratio_of(FailureKind::UnsafeState) - 25.0).abs() < f64::EPSILON);
}

#[test]
fn test_repeated_ticks_accumulate() {
    let mut h = harness(SamplerConfig::default(), vec![thread(main_foo_bar())]);
    for _ in 0..5 {
        h.sampler.tick();
    }
    let summary = h.sampler.finish();

    assert_eq!(summary.total_samples, 5);
    assert_eq!(summary.stats.ticks, 5);
    assert_eq!(summary.tree_depth, 4);
    assert_eq!(summary.hot_methods.len(), 1);
    assert_eq!(summary.hot_methods[0].name, "Main.bar");
    assert_eq!(summary.hot_methods[0].count, 5);
    assert_eq!(summary.hot_methods[0].top_caller.as_deref(), Some("Main.foo"));
}

#[test]
fn test_max_threads_per_tick_bounds_selection() {
    let config = SamplerConfig { max_threads_per_tick: 2, ..SamplerConfig::default() };
    let threads = (0..5).map(|_| thread(main_foo_bar())).collect();
    let mut h = harness(config, threads);

    let report = h.sampler.tick();
    assert_eq!(report.selected, 2);
    h.sampler.finish();
    assert_eq!(h.tree.total_samples(), 2);
}

#[test]
fn test_cpu_mode_skips_idle_threads() {
    let config = SamplerConfig { mode: SamplingMode::Cpu, ..SamplerConfig::default() };
    let mut idle = thread(vec![Frame::new(FOO, 1), Frame::new(MAIN, 1)]);
    idle.running = false;
    let mut h = harness(config, vec![thread(main_foo_bar()), idle]);

    let report = h.sampler.tick();
    assert_eq!(report.selected, 1);
    h.sampler.finish();
    let root = h.tree.serialize(100);
    assert!(root.path(["Main.main", "Main.foo", "Main.bar"]).is_some());
    assert_eq!(root.path(["Main.main", "Main.foo"]).unwrap().value, 1);
}

#[test]
fn test_wall_mode_includes_idle_threads() {
    let mut idle = thread(vec![Frame::new(FOO, 1), Frame::new(MAIN, 1)]);
    idle.running = false;
    let mut h = harness(SamplerConfig::default(), vec![thread(main_foo_bar()), idle]);

    assert_eq!(h.sampler.tick().selected, 2);
    h.sampler.finish();
    assert_eq!(h.tree.serialize(100).path(["Main.main", "Main.foo"]).unwrap().value, 2);
}

#[test]
fn test_undeliverable_interrupt_counts_signal_failure() {
    let mut gone = thread(main_foo_bar());
    gone.reachable = false;
    let mut h = harness(SamplerConfig::default(), vec![gone]);

    let report = h.sampler.tick();
    assert_eq!(report.selected, 1);
    assert_eq!(report.interrupted, 0);
    let stats = h.session.stats().snapshot();
    assert_eq!(stats.signals_failed, 1);
    assert_eq!(stats.attempts, 0);
    assert_eq!(h.tree.total_samples(), 0);
}

#[test]
fn test_ended_thread_is_not_selected() {
    let mut h = harness(SamplerConfig::default(), vec![thread(main_foo_bar()), thread(main_foo_bar())]);
    h.session.on_thread_end(ThreadHandle(2));

    // Still reported alive by the host, but no longer registered
    assert_eq!(h.host.enumerate_live_threads().len(), 2);
    assert_eq!(h.sampler.tick().selected, 1);
    assert_eq!(h.session.registry().total_registered(), 2);
}

#[test]
fn test_truncated_walk_still_merged() {
    let config = SamplerConfig { max_stack_depth: 2, ..SamplerConfig::default() };
    let mut h = harness(config, vec![thread(main_foo_bar())]);
    h.sampler.tick();
    h.sampler.finish();

    let stats = h.session.stats().snapshot();
    assert_eq!(stats.truncated, 1);
    // Outermost frame was cut off
    let root = h.tree.serialize(100);
    assert_eq!(root.path(["Main.foo", "Main.bar"]).unwrap().value, 1);
    assert!(root.child("Main.main").is_none());
}

#[test]
fn test_render_depth_limits_export() {
    let mut h = harness(SamplerConfig::default(), vec![thread(main_foo_bar())]);
    h.sampler.tick();
    h.sampler.finish();

    let root = h.tree.serialize(2);
    assert_eq!(root.depth(), 2);
    assert_eq!(root.child("Main.main").unwrap().value, 1);
}

#[test]
fn test_same_stack_across_ticks_is_one_trace() {
    let mut h = harness(SamplerConfig::default(), vec![thread(main_foo_bar())]);
    let merged_by_ticks: u64 = (0..5).map(|_| h.sampler.tick().merged).sum();
    assert_eq!(merged_by_ticks, 0);

    let summary = h.sampler.finish();
    assert_eq!(summary.stats.traces_merged, 1);
    assert_eq!(summary.stats.compressed, 4);
    assert_eq!(summary.stats.samples_merged, 5);
    let root = h.tree.serialize(100);
    assert_eq!(root.path(["Main.main", "Main.foo", "Main.bar"]).unwrap().value, 5);
}

#[test]
fn test_interleaved_threads_compress_per_thread() {
    let mut h = harness(SamplerConfig::default(), vec![thread(main_foo_bar()), thread(main_foo_bar())]);
    for _ in 0..3 {
        assert_eq!(h.sampler.tick().interrupted, 2);
    }

    let summary = h.sampler.finish();
    assert_eq!(summary.stats.traces_merged, 2);
    assert_eq!(summary.stats.compressed, 4);
    assert_eq!(summary.total_samples, 6);
    let root = h.tree.serialize(100);
    assert_eq!(root.path(["Main.main", "Main.foo", "Main.bar"]).unwrap().value, 6);
}

#[test]
fn test_stack_change_emits_compressed_run() {
    let mut h = harness(SamplerConfig::default(), vec![thread(main_foo_bar())]);
    h.sampler.tick();
    h.sampler.tick();

    let handle = ThreadHandle(1);
    h.host.threads.lock().unwrap().get_mut(&handle).unwrap().stack =
        vec![Frame::new(FOO, 20), Frame::new(MAIN, 10)];
    assert_eq!(h.sampler.tick().merged, 2);
    assert_eq!(h.tree.serialize(100).path(["Main.main", "Main.foo", "Main.bar"]).unwrap().value, 2);

    let summary = h.sampler.finish();
    assert_eq!(summary.stats.traces_merged, 2);
    assert_eq!(summary.stats.compressed, 1);
    assert_eq!(h.tree.serialize(100).path(["Main.main", "Main.foo"]).unwrap().value, 3);
}

#[test]
fn test_ended_thread_run_is_merged_on_next_drain() {
    let mut h = harness(SamplerConfig::default(), vec![thread(main_foo_bar()), thread(main_foo_bar())]);
    h.sampler.tick();
    h.sampler.tick();
    h.session.on_thread_end(ThreadHandle(2));

    // Thread 2's run of two is merged; thread 1's run is still open
    assert_eq!(h.sampler.tick().merged, 2);
    assert_eq!(h.tree.total_samples(), 2);

    let summary = h.sampler.finish();
    assert_eq!(summary.total_samples, 5);
    assert_eq!(summary.stats.traces_merged, 2);
}
