//! Thread registry
//!
//! Maps host thread handles to profiler-side state. Each registered thread
//! gets a small sequential [`ThreadTag`] and a [`ThreadCapture`] holding its
//! capture queue. The capture is handed to the host at thread start, so the
//! interrupt handler reaches its queue without touching the registry.
//!
//! Writes (thread start/end) are rare; the sampler reads on every tick. A
//! `parking_lot::RwLock` covers both. No code path acquires it re-entrantly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use rand::Rng;
use smallprof_common::TopFrameRecord;

use super::frame_queue::FrameQueue;
use crate::config::SamplingMode;
use crate::domain::{ThreadHandle, ThreadName, ThreadTag};

/// Per-thread capture state shared between the host and the profiler
#[derive(Debug)]
pub struct ThreadCapture {
    tag: ThreadTag,
    handle: ThreadHandle,
    queue: FrameQueue<TopFrameRecord>,
    /// Set once the thread has been unregistered
    retired: AtomicBool,
    /// Interrupt handler invocations on this thread
    interrupts_seen: AtomicU64,
}

impl ThreadCapture {
    fn new(tag: ThreadTag, handle: ThreadHandle, queue_capacity: usize) -> Self {
        Self {
            tag,
            handle,
            queue: FrameQueue::new(queue_capacity),
            retired: AtomicBool::new(false),
            interrupts_seen: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn tag(&self) -> ThreadTag {
        self.tag
    }

    #[must_use]
    pub fn handle(&self) -> ThreadHandle {
        self.handle
    }

    #[must_use]
    pub fn queue(&self) -> &FrameQueue<TopFrameRecord> {
        &self.queue
    }

    /// Returns true once the thread has ended
    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }

    /// Number of times the interrupt handler has run on this thread
    #[must_use]
    pub fn interrupts_seen(&self) -> u64 {
        self.interrupts_seen.load(Ordering::Acquire)
    }

    pub(crate) fn mark_interrupt_seen(&self) {
        self.interrupts_seen.fetch_add(1, Ordering::Release);
    }
}

#[derive(Debug)]
struct ThreadEntry {
    name: ThreadName,
    capture: Arc<ThreadCapture>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    live: HashMap<ThreadHandle, ThreadEntry>,
    /// Names indexed by tag, kept after the thread ends
    names: Vec<ThreadName>,
    /// Tags retired since the sampler last asked
    retired: Vec<ThreadTag>,
}

/// Registered threads of one profiling session
#[derive(Debug)]
pub struct ThreadRegistry {
    inner: RwLock<RegistryInner>,
    queue_capacity: usize,
}

impl ThreadRegistry {
    #[must_use]
    pub fn new(queue_capacity: usize) -> Self {
        Self { inner: RwLock::new(RegistryInner::default()), queue_capacity }
    }

    /// Register a started thread and allocate its capture queue
    ///
    /// A handle that is already registered is replaced: the old capture is
    /// retired so its late checkpoints discard their records.
    pub fn register(&self, handle: ThreadHandle, name: ThreadName) -> Arc<ThreadCapture> {
        let mut inner = self.inner.write();
        let tag = ThreadTag(u32::try_from(inner.names.len()).unwrap_or(u32::MAX));
        let capture = Arc::new(ThreadCapture::new(tag, handle, self.queue_capacity));

        debug!("Registered thread {tag} ({name}) as {handle}");
        inner.names.push(name.clone());
        let previous =
            inner.live.insert(handle, ThreadEntry { name, capture: Arc::clone(&capture) });
        if let Some(previous) = previous {
            warn!(
                "Thread handle {handle} registered twice; retiring {} ({})",
                previous.capture.tag, previous.name
            );
            previous.capture.retire();
            inner.retired.push(previous.capture.tag);
        }
        capture
    }

    /// Remove an ended thread, retiring its capture
    pub fn unregister(&self, handle: ThreadHandle) -> Option<Arc<ThreadCapture>> {
        let mut inner = self.inner.write();
        let entry = inner.live.remove(&handle)?;
        entry.capture.retire();
        inner.retired.push(entry.capture.tag);
        debug!("Unregistered thread {} ({})", entry.capture.tag, entry.name);
        Some(entry.capture)
    }

    /// Tags of threads retired since the previous call
    pub fn take_retired(&self) -> Vec<ThreadTag> {
        std::mem::take(&mut self.inner.write().retired)
    }

    /// Capture for a registered thread
    #[must_use]
    pub fn capture(&self, handle: ThreadHandle) -> Option<Arc<ThreadCapture>> {
        self.inner.read().live.get(&handle).map(|e| Arc::clone(&e.capture))
    }

    /// Name of a thread by tag, including threads that have ended
    #[must_use]
    pub fn thread_name(&self, tag: ThreadTag) -> Option<ThreadName> {
        let index = usize::try_from(tag.0).ok()?;
        self.inner.read().names.get(index).cloned()
    }

    /// Number of currently registered threads
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().live.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Threads ever registered in this session
    #[must_use]
    pub fn total_registered(&self) -> usize {
        self.inner.read().names.len()
    }

    /// Pick the threads to interrupt this tick
    ///
    /// Candidates are registered threads the host reports alive (and, in
    /// [`SamplingMode::Cpu`], running). The candidates are shuffled and at
    /// most `max` are returned, so over many ticks every thread gets sampled
    /// even when there are more threads than `max`.
    pub fn select<R, F>(
        &self,
        live: &[ThreadHandle],
        mode: SamplingMode,
        max: usize,
        mut is_running: F,
        rng: &mut R,
    ) -> Vec<Arc<ThreadCapture>>
    where
        R: Rng + ?Sized,
        F: FnMut(ThreadHandle) -> bool,
    {
        let mut candidates: Vec<Arc<ThreadCapture>> = {
            let inner = self.inner.read();
            live.iter()
                .filter_map(|handle| inner.live.get(handle))
                .map(|entry| Arc::clone(&entry.capture))
                .collect()
        };

        // Host calls happen outside the registry lock
        if mode == SamplingMode::Cpu {
            candidates.retain(|capture| is_running(capture.handle));
        }

        candidates.shuffle(rng);
        candidates.truncate(max);
        candidates
    }
}
