//! Analysis logic for profiling data
//!
//! This module contains pure aggregation logic over resolved traces,
//! separated from capture and from output formatting.

pub mod call_tree;
pub mod hotspots;

pub use call_tree::{CallTree, FlameNode, ROOT_LABEL};
pub use hotspots::{HotspotStats, MethodHotspot};
