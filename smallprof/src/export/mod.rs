//! Flame graph export
//!
//! Writes the serialized call tree as d3-flame-graph JSON or as a standalone
//! HTML page.

pub mod flamegraph;

pub use flamegraph::{FlameGraphExporter, OutputFormat};
