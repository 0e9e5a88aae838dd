// Percentages are display-only
#![allow(clippy::cast_precision_loss)]

use std::io::Write;

use super::scheduler::ProfileSummary;
use crate::domain::ThreadName;
use crate::trace_data::Trace;

/// Print a merged trace in verbose mode, innermost frame first
pub fn display_trace(trace: &Trace, thread: Option<&ThreadName>) {
    let name = thread.map_or(ThreadName::UNNAMED, ThreadName::as_str);
    println!("\n[TRACE] {} ({name}) x{}", trace.thread, trace.count);
    for frame in trace.frames.iter().rev() {
        let native = if frame.kind.is_native() { " [native]" } else { "" };
        if frame.line >= 0 {
            println!("  at {}:{}{native}", frame.label, frame.line);
        } else {
            println!("  at {}{native}", frame.label);
        }
    }
}

/// Print the shutdown report
pub fn display_report(summary: &ProfileSummary) {
    println!();
    println!("{}", summary.stats);
    println!(
        "{:<32}{} threads, {} ticks in {:.2}s",
        "Sampled:",
        summary.threads_seen,
        summary.stats.ticks,
        summary.duration.as_secs_f64()
    );
    println!(
        "{:<32}{} nodes, depth {}",
        "Call tree:", summary.node_count, summary.tree_depth
    );

    if summary.hot_methods.is_empty() {
        return;
    }
    println!("\nHOT METHODS (self samples)");
    for hot in &summary.hot_methods {
        let caller = hot.top_caller.as_deref().map(|c| format!("  <- {c}")).unwrap_or_default();
        println!("  {:>6.2}%  {:>8}  {}{caller}", hot.percentage, hot.count, hot.name);
    }
}

/// Display progress while profiling for a fixed duration
pub fn display_progress(elapsed_secs: u64, duration: u64, samples: u64) {
    print!("\r   Progress: {elapsed_secs}s / {duration}s ({samples} samples)   ");
    std::io::stdout().flush().ok();
}
