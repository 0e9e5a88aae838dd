//! Sampler configuration
//!
//! A [`SamplerConfig`] is built from CLI arguments (see [`crate::cli`]) or from
//! an agent option string such as `interval=500us,cpu,maxthreads=4`, and is
//! validated once before the profiler starts. Invalid values are fatal.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use smallprof_common::{DEFAULT_QUEUE_CAPACITY, MAX_STACK_DEPTH, MAX_THREADS_PER_TICK};

use crate::classification::NativeFramePolicy;
use crate::domain::ConfigError;

/// Default sampling interval: 1ms
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1);

/// Default flame graph output file
pub const DEFAULT_OUTPUT: &str = "flames.html";

/// Default depth limit when rendering the call tree
pub const DEFAULT_RENDER_DEPTH: usize = 100;

/// Default cap on how long a tick waits for interrupt handlers to report
pub const DEFAULT_REPORT_WAIT_CAP: Duration = Duration::from_millis(100);

/// Which threads are eligible for sampling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SamplingMode {
    /// Sample every live thread, whatever it is doing
    #[default]
    Wall,
    /// Only sample threads that are currently running
    Cpu,
}

/// How the call tree is rendered at shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RenderOptions {
    /// Levels emitted, root included
    pub max_depth: usize,
    /// Children below this sample count are omitted
    pub min_value: u64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { max_depth: DEFAULT_RENDER_DEPTH, min_value: 0 }
    }
}

/// Complete sampler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SamplerConfig {
    /// Time between sampling ticks
    pub interval: Duration,
    /// Wall-clock or active-only sampling
    pub mode: SamplingMode,
    /// Upper bound on threads interrupted per tick
    pub max_threads_per_tick: usize,
    /// Capacity of each per-thread capture queue
    pub queue_capacity: usize,
    /// Frames captured per walk before truncating
    pub max_stack_depth: usize,
    /// How long a tick waits for interrupted threads to report
    pub report_wait_cap: Duration,
    /// Flame graph destination (`.json` writes raw JSON, anything else HTML)
    pub output: Option<PathBuf>,
    /// Print every newly resolved trace
    pub verbose: bool,
    pub render: RenderOptions,
    pub native_policy: NativeFramePolicy,
    /// Hot methods listed in the shutdown report
    pub hot_methods: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            mode: SamplingMode::Wall,
            max_threads_per_tick: MAX_THREADS_PER_TICK,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_stack_depth: MAX_STACK_DEPTH,
            report_wait_cap: DEFAULT_REPORT_WAIT_CAP,
            output: Some(PathBuf::from(DEFAULT_OUTPUT)),
            verbose: false,
            render: RenderOptions::default(),
            native_policy: NativeFramePolicy::default(),
            hot_methods: 10,
        }
    }
}

impl SamplerConfig {
    /// Check every value; called before the profiler starts
    ///
    /// # Errors
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if self.max_threads_per_tick == 0 {
            return Err(ConfigError::MustBePositive("max threads per tick"));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::MustBePositive("queue capacity"));
        }
        if self.max_stack_depth == 0 {
            return Err(ConfigError::MustBePositive("max stack depth"));
        }
        if self.render.max_depth == 0 {
            return Err(ConfigError::MustBePositive("render depth"));
        }
        Ok(())
    }

    /// Apply a comma-separated agent option string
    ///
    /// Recognized options: `interval=<time>`, `cpu`, `wall`,
    /// `maxthreads=<n>`, `queue=<n>`, `depth=<n>`, `maxdepth=<n>`,
    /// `minvalue=<n>`, `native=keep|skip`, `output=<path>`, `verbose`.
    /// Empty tokens are ignored.
    ///
    /// # Errors
    /// Returns [`ConfigError`] on an unknown option or a malformed value.
    pub fn apply_agent_options(&mut self, options: &str) -> Result<(), ConfigError> {
        for token in options.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (key, value) = match token.split_once('=') {
                Some((k, v)) => (k.trim(), Some(v.trim())),
                None => (token, None),
            };

            match (key, value) {
                ("interval", Some(v)) => self.interval = parse_interval(v)?,
                ("cpu", None) => self.mode = SamplingMode::Cpu,
                ("wall", None) => self.mode = SamplingMode::Wall,
                ("verbose", None) => self.verbose = true,
                ("maxthreads", Some(v)) => self.max_threads_per_tick = parse_count(key, v)?,
                ("queue", Some(v)) => self.queue_capacity = parse_count(key, v)?,
                ("depth", Some(v)) => self.max_stack_depth = parse_count(key, v)?,
                ("maxdepth", Some(v)) => self.render.max_depth = parse_count(key, v)?,
                ("minvalue", Some(v)) => {
                    self.render.min_value = v.parse().map_err(|_| invalid(key, v))?;
                }
                ("native", Some("keep")) => self.native_policy = NativeFramePolicy::Keep,
                ("native", Some("skip")) => self.native_policy = NativeFramePolicy::Skip,
                ("native", Some(v)) => return Err(invalid(key, v)),
                ("output", Some(v)) if !v.is_empty() => self.output = Some(PathBuf::from(v)),
                ("output", Some(v)) => return Err(invalid(key, v)),
                _ => return Err(ConfigError::UnknownOption(token.to_string())),
            }
        }
        Ok(())
    }
}

fn invalid(option: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue { option: option.to_string(), value: value.to_string() }
}

fn parse_count(option: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse().map_err(|_| invalid(option, value))
}

/// Parse a time value with a unit suffix into a [`Duration`]
///
/// Accepted suffixes: `ns`, `us`, `ms`, `s`. The number may be fractional
/// (`0.5ms`) and is rounded to the nearest nanosecond.
///
/// # Errors
/// - [`ConfigError::InvalidTimeSuffix`] if the suffix is missing or unknown
/// - [`ConfigError::InvalidInterval`] if the number does not parse or is negative
#[allow(clippy::cast_precision_loss)]
pub fn parse_interval(input: &str) -> Result<Duration, ConfigError> {
    let input = input.trim();
    let (number, nanos_per_unit) = if let Some(n) = input.strip_suffix("ns") {
        (n, 1.0)
    } else if let Some(n) = input.strip_suffix("us") {
        (n, 1e3)
    } else if let Some(n) = input.strip_suffix("ms") {
        (n, 1e6)
    } else if let Some(n) = input.strip_suffix('s') {
        (n, 1e9)
    } else {
        return Err(ConfigError::InvalidTimeSuffix(input.to_string()));
    };

    // Leftover letters (the x in "10xs") mean an unknown suffix
    let number = number.trim();
    if number.ends_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(ConfigError::InvalidTimeSuffix(input.to_string()));
    }

    let value: f64 = number.parse().map_err(|_| ConfigError::InvalidInterval(input.to_string()))?;
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::InvalidInterval(input.to_string()));
    }

    let nanos = (value * nanos_per_unit).round();
    if nanos > u64::MAX as f64 {
        return Err(ConfigError::InvalidInterval(input.to_string()));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(Duration::from_nanos(nanos as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interval_units() {
        assert_eq!(parse_interval("1ms").unwrap(), Duration::from_millis(1));
        assert_eq!(parse_interval("250us").unwrap(), Duration::from_micros(250));
        assert_eq!(parse_interval("100ns").unwrap(), Duration::from_nanos(100));
        assert_eq!(parse_interval("2s").unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn test_parse_interval_fractional() {
        assert_eq!(parse_interval("0.5ms").unwrap(), Duration::from_micros(500));
        assert_eq!(parse_interval("1.5s").unwrap(), Duration::from_millis(1500));
    }

    #[test]
    fn test_parse_interval_rejects_bad_suffix() {
        assert_eq!(parse_interval("10"), Err(ConfigError::InvalidTimeSuffix("10".to_string())));
        assert_eq!(parse_interval("10xs"), Err(ConfigError::InvalidTimeSuffix("10xs".to_string())));
        assert_eq!(parse_interval("5min"), Err(ConfigError::InvalidTimeSuffix("5min".to_string())));
    }

    #[test]
    fn test_parse_interval_rejects_bad_number() {
        assert!(matches!(parse_interval("ms"), Err(ConfigError::InvalidInterval(_))));
        assert!(matches!(parse_interval("-1ms"), Err(ConfigError::InvalidInterval(_))));
        assert!(matches!(parse_interval("1.2.3ms"), Err(ConfigError::InvalidInterval(_))));
    }

    #[test]
    fn test_zero_interval_fails_validation() {
        let config = SamplerConfig { interval: parse_interval("0ms").unwrap(), ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::ZeroInterval));
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = SamplerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.interval, Duration::from_millis(1));
        assert_eq!(config.max_threads_per_tick, 8);
        assert_eq!(config.mode, SamplingMode::Wall);
    }

    #[test]
    fn test_agent_options() {
        let mut config = SamplerConfig::default();
        config
            .apply_agent_options("interval=10us,cpu,maxthreads=2,depth=64,output=out.json,verbose")
            .unwrap();
        assert_eq!(config.interval, Duration::from_micros(10));
        assert_eq!(config.mode, SamplingMode::Cpu);
        assert_eq!(config.max_threads_per_tick, 2);
        assert_eq!(config.max_stack_depth, 64);
        assert_eq!(config.output, Some(PathBuf::from("out.json")));
        assert!(config.verbose);
    }

    #[test]
    fn test_agent_options_render_and_native() {
        let mut config = SamplerConfig::default();
        config.apply_agent_options("maxdepth=5, minvalue=3, native=keep,,").unwrap();
        assert_eq!(config.render, RenderOptions { max_depth: 5, min_value: 3 });
        assert_eq!(config.native_policy, NativeFramePolicy::Keep);
    }

    #[test]
    fn test_agent_options_errors() {
        let mut config = SamplerConfig::default();
        assert_eq!(
            config.apply_agent_options("frobnicate"),
            Err(ConfigError::UnknownOption("frobnicate".to_string()))
        );
        assert_eq!(
            config.apply_agent_options("maxthreads=many"),
            Err(ConfigError::InvalidValue {
                option: "maxthreads".to_string(),
                value: "many".to_string()
            })
        );
        assert_eq!(
            config.apply_agent_options("interval=3h"),
            Err(ConfigError::InvalidTimeSuffix("3h".to_string()))
        );
    }

    #[test]
    fn test_zero_counts_fail_validation() {
        let mut config = SamplerConfig::default();
        config.apply_agent_options("queue=0").unwrap();
        assert_eq!(config.validate(), Err(ConfigError::MustBePositive("queue capacity")));
    }
}
