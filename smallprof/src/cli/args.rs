//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::classification::NativeFramePolicy;
use crate::config::{
    parse_interval, RenderOptions, SamplerConfig, SamplingMode, DEFAULT_OUTPUT, DEFAULT_RENDER_DEPTH,
};
use crate::demo::{Workload, WorkloadPlan};
use crate::domain::ConfigError;
use smallprof_common::{DEFAULT_QUEUE_CAPACITY, MAX_STACK_DEPTH, MAX_THREADS_PER_TICK};

#[derive(Parser, Debug)]
#[command(
    name = "smallprof",
    about = "Statistical sampling profiler demo over a simulated runtime",
    after_help = "\
EXAMPLES:
    smallprof --duration 5                         Profile the math workload for 5s
    smallprof --mode cpu --workload mixed          Only sample running threads
    smallprof --interval 500us -o flames.json      Faster sampling, raw JSON output
    smallprof --agent-options interval=2ms,cpu     Agent-style option string"
)]
pub struct Args {
    /// Sampling interval with unit suffix (ns, us, ms, s)
    #[arg(short, long, default_value = "1ms", value_parser = parse_interval)]
    pub interval: Duration,

    /// Sample every live thread (wall) or only running threads (cpu)
    #[arg(short, long, value_enum, default_value_t = SamplingMode::Wall)]
    pub mode: SamplingMode,

    /// Maximum threads interrupted per tick
    #[arg(long, default_value_t = MAX_THREADS_PER_TICK)]
    pub max_threads: usize,

    /// Capacity of each per-thread capture queue
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Frames captured per stack walk
    #[arg(long, default_value_t = MAX_STACK_DEPTH)]
    pub max_stack_depth: usize,

    /// Flame graph output (.json for raw JSON, anything else HTML)
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_OUTPUT)]
    pub output: PathBuf,

    /// Do not write a flame graph
    #[arg(long, conflicts_with = "output")]
    pub no_output: bool,

    /// Levels of the call tree rendered, root included
    #[arg(long, default_value_t = DEFAULT_RENDER_DEPTH)]
    pub render_depth: usize,

    /// Omit call tree nodes with fewer samples
    #[arg(long, default_value = "0")]
    pub min_value: u64,

    /// Attribute hot methods to native frames (keep) or their managed caller (skip)
    #[arg(long, value_enum, default_value_t = NativeFramePolicy::Skip)]
    pub native: NativeFramePolicy,

    /// Comma-separated agent options, applied after the flags above
    #[arg(long, value_name = "OPTIONS")]
    pub agent_options: Option<String>,

    /// Print every merged trace
    #[arg(short, long)]
    pub verbose: bool,

    /// Stop after N seconds (0 = until Ctrl+C or the workload ends)
    #[arg(long, default_value = "0")]
    pub duration: u64,

    /// Demo program run by the worker threads
    #[arg(short, long, value_enum, default_value_t = Workload::Math)]
    pub workload: Workload,

    /// Number of worker threads
    #[arg(short, long, default_value = "4")]
    pub threads: usize,

    /// Rounds per worker (omit to run until stopped)
    #[arg(long)]
    pub rounds: Option<u64>,

    /// Workload seed
    #[arg(long, default_value = "100")]
    pub seed: u64,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Build the sampler configuration
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the agent option string is malformed or a
    /// value fails validation.
    pub fn to_config(&self) -> Result<SamplerConfig, ConfigError> {
        let mut config = SamplerConfig {
            interval: self.interval,
            mode: self.mode,
            max_threads_per_tick: self.max_threads,
            queue_capacity: self.queue_capacity,
            max_stack_depth: self.max_stack_depth,
            output: (!self.no_output).then(|| self.output.clone()),
            verbose: self.verbose,
            render: RenderOptions { max_depth: self.render_depth, min_value: self.min_value },
            native_policy: self.native,
            ..SamplerConfig::default()
        };
        if let Some(options) = &self.agent_options {
            config.apply_agent_options(options)?;
        }
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn workload_plan(&self) -> WorkloadPlan {
        WorkloadPlan {
            workload: self.workload,
            threads: self.threads,
            seed: self.seed,
            rounds: self.rounds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("smallprof").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_match_config_defaults() {
        let config = parse(&[]).to_config().unwrap();
        assert_eq!(config, SamplerConfig::default());
    }

    #[test]
    fn test_flags_map_to_config() {
        let args = parse(&[
            "--interval", "250us", "--mode", "cpu", "--max-threads", "2", "-o", "out.json",
            "--render-depth", "20", "--min-value", "3", "--native", "keep",
        ]);
        let config = args.to_config().unwrap();
        assert_eq!(config.interval, Duration::from_micros(250));
        assert_eq!(config.mode, SamplingMode::Cpu);
        assert_eq!(config.max_threads_per_tick, 2);
        assert_eq!(config.output, Some(PathBuf::from("out.json")));
        assert_eq!(config.render, RenderOptions { max_depth: 20, min_value: 3 });
        assert_eq!(config.native_policy, NativeFramePolicy::Keep);
    }

    #[test]
    fn test_agent_options_override_flags() {
        let args = parse(&["--interval", "5ms", "--agent-options", "interval=2ms,cpu"]);
        let config = args.to_config().unwrap();
        assert_eq!(config.interval, Duration::from_millis(2));
        assert_eq!(config.mode, SamplingMode::Cpu);
    }

    #[test]
    fn test_bad_interval_rejected_by_parser() {
        let result = Args::try_parse_from(["smallprof", "--interval", "10xs"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_values_fail() {
        assert_eq!(parse(&["--interval", "0ms"]).to_config(), Err(ConfigError::ZeroInterval));
        assert_eq!(
            parse(&["--max-threads", "0"]).to_config(),
            Err(ConfigError::MustBePositive("max threads per tick"))
        );
        assert!(matches!(
            parse(&["--agent-options", "bogus"]).to_config(),
            Err(ConfigError::UnknownOption(_))
        ));
    }

    #[test]
    fn test_no_output() {
        assert_eq!(parse(&["--no-output"]).to_config().unwrap().output, None);
    }

    #[test]
    fn test_workload_plan() {
        let plan = parse(&["--workload", "mixed", "--threads", "6", "--rounds", "3"]).workload_plan();
        assert_eq!(plan.workload, Workload::Mixed);
        assert_eq!(plan.threads, 6);
        assert_eq!(plan.rounds, Some(3));
        assert_eq!(plan.seed, 100);
    }
}
