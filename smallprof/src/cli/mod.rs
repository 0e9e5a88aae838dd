//! Command-line interface for smallprof
//!
//! This module contains CLI argument parsing and its conversion into a
//! sampler configuration

pub mod args;

pub use args::Args;
