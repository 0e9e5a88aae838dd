//! Hot method analysis for the shutdown report.
//!
//! The call tree answers "where was time spent, by call path". This module
//! answers the flat question: which methods were on top of the stack most
//! often (self samples). Each trace is attributed to its first meaningful
//! frame, so with the default policy a sample taken inside a native helper
//! counts against the managed method that called it.
//!
//! # Performance
//!
//! - `record_trace()`: O(1) amortized (HashMap insert/update)
//! - `to_hotspots()`: O(n log n) where n = distinct methods (sorting)

// Percentage calculations intentionally convert u64 to f64
#![allow(clippy::cast_precision_loss)]

use std::cmp::Reverse;
use std::collections::HashMap;

use serde::Serialize;

use crate::classification::{first_meaningful_frame, NativeFramePolicy};
use crate::domain::{MethodLabel, ThreadTag};
use crate::trace_data::Trace;

/// A hot method with aggregated statistics
#[derive(Debug, Clone, Serialize)]
pub struct MethodHotspot {
    /// Method label (`class.method(signature)`)
    pub name: String,

    /// Self samples for this method
    pub count: u64,

    /// Percentage of all attributed samples (0.0 - 100.0)
    pub percentage: f64,

    /// Distinct threads the method was sampled on
    pub threads: usize,

    /// Caller seen most often, if the method was ever sampled below another frame
    pub top_caller: Option<String>,

    /// Line of the first sample
    pub line: i32,
}

#[derive(Debug, Clone)]
struct MethodStats {
    count: u64,
    threads: HashMap<ThreadTag, u64>,
    callers: HashMap<MethodLabel, u64>,
    line: i32,
}

/// Self-sample aggregator, updated as traces are merged
#[derive(Debug)]
pub struct HotspotStats {
    methods: HashMap<MethodLabel, MethodStats>,
    total_samples: u64,
    policy: NativeFramePolicy,
}

impl HotspotStats {
    #[must_use]
    pub fn new(policy: NativeFramePolicy) -> Self {
        Self { methods: HashMap::new(), total_samples: 0, policy }
    }

    /// Attribute a trace's weight to its first meaningful frame
    pub fn record_trace(&mut self, trace: &Trace) {
        let Some(from_leaf) = first_meaningful_frame(trace.kinds_innermost_first(), self.policy)
        else {
            return;
        };
        let index = trace.frames.len() - 1 - from_leaf;
        let frame = &trace.frames[index];

        self.total_samples += trace.count;
        let stats = self.methods.entry(frame.label.clone()).or_insert_with(|| MethodStats {
            count: 0,
            threads: HashMap::new(),
            callers: HashMap::new(),
            line: frame.line,
        });
        stats.count += trace.count;
        *stats.threads.entry(trace.thread).or_insert(0) += trace.count;
        if let Some(caller) = index.checked_sub(1).map(|i| &trace.frames[i]) {
            *stats.callers.entry(caller.label.clone()).or_insert(0) += trace.count;
        }
    }

    /// Samples attributed so far
    #[must_use]
    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    /// All methods, most sampled first (ties by name)
    #[must_use]
    pub fn to_hotspots(&self) -> Vec<MethodHotspot> {
        let mut hotspots: Vec<MethodHotspot> = self
            .methods
            .iter()
            .map(|(label, stats)| {
                let percentage = if self.total_samples > 0 {
                    (stats.count as f64 / self.total_samples as f64) * 100.0
                } else {
                    0.0
                };
                let top_caller = stats
                    .callers
                    .iter()
                    .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                    .map(|(caller, _)| caller.to_string());

                MethodHotspot {
                    name: label.to_string(),
                    count: stats.count,
                    percentage,
                    threads: stats.threads.len(),
                    top_caller,
                    line: stats.line,
                }
            })
            .collect();

        hotspots.sort_unstable_by(|a, b| {
            Reverse(a.count).cmp(&Reverse(b.count)).then_with(|| a.name.cmp(&b.name))
        });
        hotspots
    }

    /// The `n` most sampled methods
    #[must_use]
    pub fn top(&self, n: usize) -> Vec<MethodHotspot> {
        let mut hotspots = self.to_hotspots();
        hotspots.truncate(n);
        hotspots
    }
}
