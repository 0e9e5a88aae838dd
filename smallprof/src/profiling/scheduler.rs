//! Sampling scheduler
//!
//! The [`Sampler`] runs on a dedicated `smallprof-sampler` thread. Each tick:
//!
//! 1. Ask the host for live threads and pick a bounded, shuffled subset
//! 2. Interrupt each picked thread
//! 3. Wait until every interrupted thread's handler has run, or the wait cap
//!    expires
//! 4. Drain walked records through the collector into the call tree. A
//!    thread's run of identical stacks is merged when its stack changes, when
//!    the thread ends or at shutdown
//! 5. Sleep for whatever is left of the interval
//!
//! [`Profiler`] owns the thread: `start` spawns it, `stop` raises the stop
//! flag, joins, prints the report and writes the flame graph.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::collector::TraceCollector;
use super::display::{display_report, display_trace};
use super::host::Host;
use super::registry::ThreadCapture;
use super::session::ProfilerSession;
use super::stats::StatsSnapshot;
use crate::analysis::{CallTree, HotspotStats, MethodHotspot};
use crate::config::SamplerConfig;
use crate::domain::ProfilerError;
use crate::export::FlameGraphExporter;
use crate::trace_data::{RawCaptureRecord, Trace};

const SAMPLER_THREAD_NAME: &str = "smallprof-sampler";

/// Poll period while waiting for interrupt handlers to report
const REPORT_POLL: Duration = Duration::from_micros(50);

/// What one tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Threads picked this tick
    pub selected: usize,
    /// Interruptions delivered
    pub interrupted: usize,
    /// Interrupted threads whose handler ran before the wait cap
    pub reported: usize,
    /// Samples merged into the call tree; compressed runs are counted when
    /// they end, not on the tick that sampled them
    pub merged: u64,
}

/// Result of a finished profiling run
#[derive(Debug, Clone)]
pub struct ProfileSummary {
    pub stats: StatsSnapshot,
    pub hot_methods: Vec<MethodHotspot>,
    pub total_samples: u64,
    pub node_count: usize,
    pub tree_depth: usize,
    pub threads_seen: usize,
    pub duration: Duration,
}

/// Per-tick sampling logic, owned by the sampler thread
pub struct Sampler<H: Host> {
    session: Arc<ProfilerSession<H>>,
    walked_rx: Receiver<RawCaptureRecord>,
    collector: TraceCollector,
    tree: Arc<CallTree>,
    hotspots: HotspotStats,
    rng: StdRng,
    started: Instant,
}

impl<H: Host> Sampler<H> {
    pub fn new(
        session: Arc<ProfilerSession<H>>,
        walked_rx: Receiver<RawCaptureRecord>,
        tree: Arc<CallTree>,
    ) -> Self {
        let collector = TraceCollector::new(Arc::clone(session.stats()));
        let hotspots = HotspotStats::new(session.config().native_policy);
        Self {
            session,
            walked_rx,
            collector,
            tree,
            hotspots,
            rng: StdRng::from_rng(&mut rand::rng()),
            started: Instant::now(),
        }
    }

    /// Use a fixed seed for thread selection
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Run one sampling tick
    pub fn tick(&mut self) -> TickReport {
        let session = Arc::clone(&self.session);
        let config = session.config();
        let host = session.host();
        let stats = session.stats();

        let live = host.enumerate_live_threads();
        let selected = session.registry().select(
            &live,
            config.mode,
            config.max_threads_per_tick,
            |handle| host.is_running(handle),
            &mut self.rng,
        );

        let mut pending = Vec::with_capacity(selected.len());
        for capture in &selected {
            let seen = capture.interrupts_seen();
            if host.interrupt(capture.handle()) {
                stats.record_signal_sent();
                pending.push((Arc::clone(capture), seen));
            } else {
                stats.record_signal_failed();
            }
        }

        let reported = wait_for_reports(&pending, config.report_wait_cap);
        if reported < pending.len() {
            stats.record_tick_timeout();
            debug!("{} of {} interrupted threads did not report", pending.len() - reported, pending.len());
        }

        let merged = self.drain();
        stats.record_tick();
        TickReport { selected: selected.len(), interrupted: pending.len(), reported, merged }
    }

    /// Feed every walked record received so far through the collector
    ///
    /// Pending traces of threads that ended before this drain are merged too.
    /// Returns the number of samples merged.
    pub fn drain(&mut self) -> u64 {
        // Taken first: an ended thread's records are already in the channel
        let retired = self.session.registry().take_retired();

        let mut merged = 0;
        while let Ok(record) = self.walked_rx.try_recv() {
            if let Some(trace) = self.collector.submit(record, self.session.host().as_ref()) {
                merged += self.merge(&trace);
            }
        }
        for tag in retired {
            if let Some(trace) = self.collector.retire(tag) {
                merged += self.merge(&trace);
            }
        }
        merged
    }

    fn merge(&mut self, trace: &Trace) -> u64 {
        if self.session.config().verbose {
            let name = self.session.registry().thread_name(trace.thread);
            display_trace(trace, name.as_ref());
        }
        self.tree.add_trace(trace.labels(), trace.count);
        self.hotspots.record_trace(trace);
        self.session.stats().record_merged(trace.count);
        trace.count
    }

    /// Tick until `stop` is raised, then drain and summarize
    pub fn run(mut self, stop: &AtomicBool) -> ProfileSummary {
        let interval = self.session.config().interval;
        info!(
            "Sampler started: interval={interval:?} mode={:?} max_threads={}",
            self.session.config().mode,
            self.session.config().max_threads_per_tick
        );

        while !stop.load(Ordering::Acquire) {
            let tick_start = Instant::now();
            self.tick();
            if let Some(rest) = interval.checked_sub(tick_start.elapsed()) {
                // Profiler::stop unparks us
                thread::park_timeout(rest);
            }
        }
        self.finish()
    }

    /// Final drain, flush of every pending trace, and summary
    pub fn finish(mut self) -> ProfileSummary {
        self.drain();
        for trace in self.collector.flush() {
            self.merge(&trace);
        }
        let config = self.session.config();
        ProfileSummary {
            stats: self.session.stats().snapshot(),
            hot_methods: self.hotspots.top(config.hot_methods),
            total_samples: self.tree.total_samples(),
            node_count: self.tree.node_count(),
            tree_depth: self.tree.max_depth(),
            threads_seen: self.session.registry().total_registered(),
            duration: self.started.elapsed(),
        }
    }
}

/// Wait until each interrupted thread's handler has run once more
///
/// Threads that ended meanwhile count as reported. Returns how many reported
/// before `cap` elapsed.
fn wait_for_reports(pending: &[(Arc<ThreadCapture>, u64)], cap: Duration) -> usize {
    let has_reported = |(capture, seen): &(Arc<ThreadCapture>, u64)| {
        capture.interrupts_seen() > *seen || capture.is_retired()
    };

    let deadline = Instant::now() + cap;
    loop {
        let reported = pending.iter().filter(|p| has_reported(*p)).count();
        if reported == pending.len() || Instant::now() >= deadline {
            return reported;
        }
        thread::sleep(REPORT_POLL);
    }
}

/// Running profiler: a session plus its sampler thread
pub struct Profiler<H: Host> {
    session: Arc<ProfilerSession<H>>,
    tree: Arc<CallTree>,
    stop: Arc<AtomicBool>,
    sampler: JoinHandle<ProfileSummary>,
}

impl<H: Host> Profiler<H> {
    /// Validate `config`, create the session and spawn the sampler thread
    ///
    /// # Errors
    /// Returns [`ProfilerError::Config`] for invalid settings and
    /// [`ProfilerError::SamplerSpawnFailed`] if the thread cannot be created.
    pub fn start(host: Arc<H>, config: SamplerConfig) -> Result<Self, ProfilerError> {
        config.validate()?;

        let (walked_tx, walked_rx) = unbounded();
        let session = Arc::new(ProfilerSession::new(host, config, walked_tx));
        let tree = Arc::new(CallTree::new());
        let stop = Arc::new(AtomicBool::new(false));

        let sampler = Sampler::new(Arc::clone(&session), walked_rx, Arc::clone(&tree));
        let thread_stop = Arc::clone(&stop);
        let sampler = thread::Builder::new()
            .name(SAMPLER_THREAD_NAME.to_string())
            .spawn(move || sampler.run(&thread_stop))
            .map_err(ProfilerError::SamplerSpawnFailed)?;

        Ok(Self { session, tree, stop, sampler })
    }

    /// Session to hand to the host's lifecycle hooks
    #[must_use]
    pub fn session(&self) -> &Arc<ProfilerSession<H>> {
        &self.session
    }

    /// Live view of the call tree
    #[must_use]
    pub fn tree(&self) -> &Arc<CallTree> {
        &self.tree
    }

    /// Stop sampling, print the report and write the flame graph
    ///
    /// # Errors
    /// Returns [`ProfilerError::SamplerPanicked`] if the sampler thread died,
    /// or [`ProfilerError::Export`] if the output cannot be written.
    pub fn stop(self) -> Result<ProfileSummary, ProfilerError> {
        self.stop.store(true, Ordering::Release);
        self.sampler.thread().unpark();
        let summary = self.sampler.join().map_err(|_| ProfilerError::SamplerPanicked)?;

        display_report(&summary);

        let config = self.session.config();
        if let Some(path) = &config.output {
            let root = self.tree.serialize_filtered(config.render.max_depth, config.render.min_value);
            FlameGraphExporter::new(&root).write_to_path(path)?;
        } else {
            warn!("No output configured; flame graph not written");
        }
        Ok(summary)
    }
}
