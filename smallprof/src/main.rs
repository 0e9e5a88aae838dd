//! # smallprof - Main Entry Point
//!
//! Starts the simulated runtime, attaches a profiler to it, runs the selected
//! workload until the duration limit, Ctrl+C or workload completion, then
//! prints the report and writes the flame graph.

// Time conversions lose precision for display
#![allow(clippy::cast_precision_loss)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use smallprof::cli::Args;
use smallprof::demo::{spawn_workers, SimulatedRuntime};
use smallprof::domain::{ConfigError, ProfilerError};
use smallprof::profiling::{display_progress, Profiler};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

/// How often the main loop checks duration, workers and progress
const POLL_PERIOD: Duration = Duration::from_millis(200);

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let is_config = err.chain().any(|cause| {
        cause.is::<ConfigError>()
            || matches!(cause.downcast_ref::<ProfilerError>(), Some(ProfilerError::Config(_)))
    });
    if is_config {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;

    let config = args.to_config().context("Invalid configuration")?;
    let plan = args.workload_plan();

    if !quiet {
        println!("smallprof v{}", env!("CARGO_PKG_VERSION"));
        println!("interval: {:?} ({:?} mode)", config.interval, config.mode);
        println!("workload: {:?} x{} threads", plan.workload, plan.threads);
        if let Some(output) = &config.output {
            println!("output: {}", output.display());
        }
    }

    let runtime = SimulatedRuntime::new();
    let profiler = Profiler::start(Arc::clone(&runtime), config).context("Failed to start profiler")?;
    let workers = spawn_workers(&runtime, profiler.session(), &plan)
        .context("Failed to spawn worker threads")?;
    info!("Spawned {} worker threads", workers.len());

    // Setup Ctrl+C handler
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let profiling_start = Instant::now();
    let duration_limit =
        if args.duration > 0 { Some(Duration::from_secs(args.duration)) } else { None };

    // Track why we exited the loop
    let exit_reason = loop {
        if let Some(limit) = duration_limit {
            if profiling_start.elapsed() >= limit {
                break "duration limit reached";
            }
            if !quiet {
                display_progress(
                    profiling_start.elapsed().as_secs(),
                    args.duration,
                    profiler.tree().total_samples(),
                );
            }
        }

        if workers.iter().all(std::thread::JoinHandle::is_finished) {
            break "workload finished";
        }

        tokio::select! {
            () = tokio::time::sleep(POLL_PERIOD) => {}
            _ = &mut ctrl_c => break "interrupted",
        }
    };

    runtime.request_stop();
    for worker in workers {
        if worker.join().is_err() {
            warn!("Worker thread panicked");
        }
    }

    let summary = profiler.stop().context("Failed to finish profiling")?;

    if !quiet {
        eprintln!(
            "\n{exit_reason}: {:.1}s, {} samples ({} traces merged, {:.2}% failed)",
            summary.duration.as_secs_f64(),
            summary.total_samples,
            summary.stats.traces_merged,
            summary.stats.failure_ratio(),
        );
    }

    Ok(())
}
