//! Simulated host runtime and demo workloads
//!
//! Lets the profiler run end to end without a real managed runtime: worker
//! threads execute scripted programs over an explicit frame stack and honor
//! interrupts and checkpoints the way a VM would.

pub mod runtime;
pub mod workload;

pub use runtime::{SimContext, SimStack, SimulatedRuntime};
pub use workload::{spawn_workers, Workload, WorkloadPlan};
