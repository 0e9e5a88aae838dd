//! # smallprof - Statistical Sampling Profiler Core
//!
//! smallprof periodically interrupts threads of a host runtime, records the
//! interrupted thread's top frame, walks the full stack later at a point where
//! the thread can be inspected safely, and aggregates the walked stacks into a
//! call tree that is rendered as a flame graph.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   Host Runtime (Host trait)                     │
//! │   thread start/end hooks · interrupt delivery · stack walking   │
//! └──────┬──────────────────────┬──────────────────────┬────────────┘
//!        │ on_interrupt         │ on_checkpoint        │ resolve
//!        ▼                      ▼                      │
//! ┌──────────────┐  top   ┌──────────────┐  walked     │
//! │ FrameQueue   │──────▶│  Stack walk  │──records──┐ │
//! │ (per thread) │ frames │ (checkpoint) │  channel  │ │
//! └──────────────┘        └──────────────┘           ▼ ▼
//!        ▲                                  ┌────────────────────┐
//!        │ interrupt                        │  Sampler thread    │
//! ┌──────┴───────┐                          │  TraceCollector    │
//! │  Scheduler   │─────────────────────────▶│  (compress+label)  │
//! │ (tick loop)  │                          └─────────┬──────────┘
//! └──────────────┘                                    ▼
//!                                   ┌──────────────┐   ┌──────────────┐
//!                                   │   CallTree   │──▶│  Flame graph │
//!                                   │  + Hotspots  │   │ (JSON/HTML)  │
//!                                   └──────────────┘   └──────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`profiling`]: host capability traits, per-thread capture queues, the
//!   capture state machine, the profiler session (host callbacks), trace
//!   collection and the sampling scheduler
//! - [`analysis`]: call tree aggregation and hot method statistics
//! - [`export`]: d3-flame-graph JSON and standalone HTML output
//! - [`config`]: sampler configuration, agent option strings, interval parsing
//! - [`cli`]: command-line argument parsing
//! - [`demo`]: a simulated host runtime with scripted workloads
//! - [`classification`]: managed vs native frame classification
//! - [`trace_data`]: walked records, resolved traces and the label cache
//! - [`domain`]: core types (frames, thread handles, labels) and errors
//!
//! ## Sampling Modes
//!
//! - **Wall** (default): every live thread is a candidate each tick
//! - **Cpu**: only threads the host reports as running are candidates
//!
//! ## Typical Usage
//!
//! ```bash
//! # Profile the math workload for 5 seconds, write flames.html
//! ./smallprof --duration 5
//!
//! # Active threads only, raw JSON tree
//! ./smallprof --mode cpu --workload mixed -o flames.json
//! ```
//!
//! ## Key Concepts
//!
//! - **Top frame**: the innermost frame of an interrupted thread, the only
//!   thing captured in interrupt context
//! - **Checkpoint**: a point where the host can walk the thread's stack
//! - **Lookback compression**: consecutive identical stacks from the same
//!   thread are merged before labels are resolved

pub mod analysis;
pub mod classification;
pub mod cli;
pub mod config;
pub mod demo;
pub mod domain;
pub mod export;
pub mod profiling;
pub mod trace_data;
