//! Simulated host runtime
//!
//! Worker threads run scripted programs against a [`SimContext`], which keeps
//! an explicit call stack of [`Frame`]s. Interrupts are delivered by setting
//! a per-thread flag that the worker polls at instruction boundaries, the way
//! a signal arrives between two instructions. Checkpoints run at the next
//! method entry, method exit or loop back-edge outside an unsafe section.
//!
//! ```text
//! sampler ──interrupt()──► pending flag ──poll──► session.on_interrupt(stack)
//!                                                    │ queued
//!                                         next safe point
//!                                                    ▼
//!                                          session.on_checkpoint(stack)
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::debug;
use parking_lot::RwLock;

use crate::domain::{Frame, MethodId, ThreadHandle, WalkError};
use crate::profiling::{
    FrameResolver, ProfilerSession, StackWalker, ThreadCapture, ThreadControl, WalkOutcome,
};

/// Back-edges between safe points in [`SimContext::work`]
const SAFEPOINT_STRIDE: usize = 64;

/// Granularity of interruptible sleeps
const SLEEP_SLICE: Duration = Duration::from_millis(1);

/// Call stack of a simulated thread, innermost frame last
#[derive(Debug, Default)]
pub struct SimStack {
    frames: Vec<Frame>,
    unsafe_depth: u32,
}

impl SimStack {
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Returns true inside an unsafe section
    #[must_use]
    pub fn in_unsafe_section(&self) -> bool {
        self.unsafe_depth > 0
    }

    fn innermost_first(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter().rev()
    }
}

#[derive(Debug)]
struct SimThread {
    name: String,
    pending_interrupt: AtomicBool,
    running: AtomicBool,
}

/// Host runtime with scripted worker threads
#[derive(Debug, Default)]
pub struct SimulatedRuntime {
    methods: RwLock<Vec<String>>,
    threads: RwLock<HashMap<ThreadHandle, Arc<SimThread>>>,
    next_handle: AtomicU64,
    stop: AtomicBool,
}

impl SimulatedRuntime {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Declare a method and get its id
    ///
    /// Declaring the same label twice returns the same id.
    pub fn define_method(&self, label: &str) -> MethodId {
        let mut methods = self.methods.write();
        let index = match methods.iter().position(|m| m == label) {
            Some(index) => index,
            None => {
                methods.push(label.to_string());
                methods.len() - 1
            }
        };
        MethodId(index as u64 + 1)
    }

    /// Ask every worker program to wind down
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Number of worker threads currently alive
    #[must_use]
    pub fn live_threads(&self) -> usize {
        self.threads.read().len()
    }

    /// Start a worker thread running `program`
    ///
    /// The thread is announced to `session` before `program` runs and
    /// unregistered after it returns.
    ///
    /// # Errors
    /// Returns the I/O error if the OS thread cannot be spawned.
    pub fn spawn<F>(
        self: &Arc<Self>,
        session: &Arc<ProfilerSession<SimulatedRuntime>>,
        name: &str,
        program: F,
    ) -> std::io::Result<JoinHandle<()>>
    where
        F: FnOnce(&mut SimContext) + Send + 'static,
    {
        let handle = ThreadHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let thread = Arc::new(SimThread {
            name: name.to_string(),
            pending_interrupt: AtomicBool::new(false),
            running: AtomicBool::new(true),
        });
        let runtime = Arc::clone(self);
        let session = Arc::clone(session);

        thread::Builder::new().name(name.to_string()).spawn(move || {
            runtime.threads.write().insert(handle, Arc::clone(&thread));
            let capture = session.on_thread_start(handle, &thread.name);
            debug!("Simulated thread {handle} ({}) started", thread.name);

            let mut ctx = SimContext {
                runtime: Arc::clone(&runtime),
                session: Arc::clone(&session),
                capture,
                thread: Arc::clone(&thread),
                stack: SimStack::default(),
                checkpoint_due: false,
            };
            program(&mut ctx);

            runtime.threads.write().remove(&handle);
            session.on_thread_end(handle);
            debug!("Simulated thread {handle} ({}) ended", thread.name);
        })
    }
}

impl ThreadControl for SimulatedRuntime {
    fn enumerate_live_threads(&self) -> Vec<ThreadHandle> {
        self.threads.read().keys().copied().collect()
    }

    fn interrupt(&self, thread: ThreadHandle) -> bool {
        match self.threads.read().get(&thread) {
            Some(t) => {
                t.pending_interrupt.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    fn is_running(&self, thread: ThreadHandle) -> bool {
        self.threads.read().get(&thread).is_some_and(|t| t.running.load(Ordering::Acquire))
    }
}

impl StackWalker for SimulatedRuntime {
    type Context = SimStack;

    fn capture_top_frame(&self, ctx: &SimStack) -> Option<Frame> {
        if ctx.in_unsafe_section() {
            return None;
        }
        ctx.frames.last().copied()
    }

    fn recompute_top_frame(&self, ctx: &SimStack, stored: Frame) -> Option<Frame> {
        ctx.frames.contains(&stored).then_some(stored)
    }

    fn walk_stack_from(
        &self,
        ctx: &SimStack,
        top: Frame,
        frames: &mut [Frame],
    ) -> Result<WalkOutcome, WalkError> {
        if ctx.in_unsafe_section() {
            return Err(WalkError::NotWalkable);
        }
        let mut stack = ctx.innermost_first().skip_while(|f| **f != top).peekable();
        if stack.peek().is_none() {
            return Err(WalkError::Empty);
        }

        let mut depth = 0;
        for (slot, frame) in frames.iter_mut().zip(&mut stack) {
            *slot = *frame;
            depth += 1;
        }
        Ok(WalkOutcome { depth, truncated: stack.next().is_some() })
    }
}

impl FrameResolver for SimulatedRuntime {
    fn resolve_frame(&self, frame: &Frame) -> Option<String> {
        let index = usize::try_from(frame.method.0.checked_sub(1)?).ok()?;
        self.methods.read().get(index).cloned()
    }
}

/// Execution context of one simulated worker thread
pub struct SimContext {
    runtime: Arc<SimulatedRuntime>,
    session: Arc<ProfilerSession<SimulatedRuntime>>,
    capture: Arc<ThreadCapture>,
    thread: Arc<SimThread>,
    stack: SimStack,
    checkpoint_due: bool,
}

impl SimContext {
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.runtime.stop_requested()
    }

    #[must_use]
    pub fn stack(&self) -> &SimStack {
        &self.stack
    }

    /// Call `method` at `line`, running `body` inside the new frame
    pub fn call<R>(&mut self, method: MethodId, line: i32, body: impl FnOnce(&mut Self) -> R) -> R {
        self.enter(Frame::new(method, line), body)
    }

    /// Call a native method
    pub fn call_native<R>(&mut self, method: MethodId, body: impl FnOnce(&mut Self) -> R) -> R {
        self.enter(Frame::native(method), body)
    }

    fn enter<R>(&mut self, frame: Frame, body: impl FnOnce(&mut Self) -> R) -> R {
        self.stack.frames.push(frame);
        self.safepoint();
        let result = body(self);
        // A signal may land right before the return
        self.poll_interrupt();
        self.stack.frames.pop();
        self.safepoint();
        result
    }

    /// Run `body` where the stack cannot be inspected (VM-internal transition)
    pub fn unsafe_section<R>(&mut self, body: impl FnOnce(&mut Self) -> R) -> R {
        self.stack.unsafe_depth += 1;
        let result = body(self);
        self.stack.unsafe_depth -= 1;
        self.safepoint();
        result
    }

    /// Busy loop of `iterations` steps, calling `step` for each one
    ///
    /// Interrupts are polled every step; checkpoints run on back-edges.
    pub fn work(&mut self, iterations: usize, mut step: impl FnMut(usize)) {
        for i in 0..iterations {
            step(i);
            self.poll_interrupt();
            if i % SAFEPOINT_STRIDE == SAFEPOINT_STRIDE - 1 {
                self.safepoint();
            }
        }
    }

    /// Block for `duration`, reporting the thread as not running
    pub fn sleep(&mut self, duration: Duration) {
        self.thread.running.store(false, Ordering::Release);
        let deadline = Instant::now() + duration;
        loop {
            self.safepoint();
            let now = Instant::now();
            if now >= deadline || self.should_stop() {
                break;
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
        self.thread.running.store(true, Ordering::Release);
    }

    /// Deliver a pending interrupt, if any
    pub fn poll_interrupt(&mut self) {
        if self.thread.pending_interrupt.swap(false, Ordering::AcqRel)
            && self.session.on_interrupt(&self.capture, &self.stack).awaits_checkpoint()
        {
            self.checkpoint_due = true;
        }
    }

    /// Safe point: deliver interrupts, then run a due checkpoint
    pub fn safepoint(&mut self) {
        self.poll_interrupt();
        if self.checkpoint_due && !self.stack.in_unsafe_section() {
            self.checkpoint_due = false;
            self.session.on_checkpoint(&self.capture, &self.stack);
        }
    }
}
