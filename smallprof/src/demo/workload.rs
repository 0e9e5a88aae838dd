//! Demo workloads for the simulated runtime
//!
//! - `math`: generates random arithmetic token streams, then lexes, parses
//!   and evaluates them (deep, CPU-bound call chains)
//! - `sleep`: repeatedly sleeps 10ms inside a native sleep frame, mostly
//!   invisible in CPU mode
//! - `churn`: a busy loop that copies through a native frame and keeps
//!   entering unsafe sections, exercising the failure counters
//! - `mixed`: the three above round-robin across threads

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::debug;
use serde::Serialize;

use super::runtime::{SimContext, SimulatedRuntime};
use crate::domain::MethodId;
use crate::profiling::ProfilerSession;

/// Tokens generated per math round
const MATH_ROUND_SIZE: usize = 1000;

const SLEEP_SLICE: Duration = Duration::from_millis(10);
const SLEEPS_PER_ROUND: usize = 100;

/// Program run by the demo worker threads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Workload {
    /// Expression generator, parser and evaluator
    #[default]
    Math,
    /// Threads that mostly sleep
    Sleep,
    /// Busy loop with native frames and unsafe sections
    Churn,
    /// All of the above, one program per thread in turn
    Mixed,
}

impl Workload {
    fn for_thread(self, index: usize) -> Workload {
        match self {
            Workload::Mixed => [Workload::Math, Workload::Sleep, Workload::Churn][index % 3],
            single => single,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Workload::Math => "math",
            Workload::Sleep => "sleep",
            Workload::Churn => "churn",
            Workload::Mixed => "mixed",
        }
    }
}

/// How many workers run what, and for how long
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadPlan {
    pub workload: Workload,
    pub threads: usize,
    pub seed: u64,
    /// Rounds per worker; `None` runs until the runtime is stopped
    pub rounds: Option<u64>,
}

impl Default for WorkloadPlan {
    fn default() -> Self {
        Self { workload: Workload::Math, threads: 4, seed: 100, rounds: None }
    }
}

/// Spawn the worker threads of `plan` on `runtime`
///
/// # Errors
/// Returns the I/O error of the first thread that fails to spawn.
pub fn spawn_workers(
    runtime: &Arc<SimulatedRuntime>,
    session: &Arc<ProfilerSession<SimulatedRuntime>>,
    plan: &WorkloadPlan,
) -> std::io::Result<Vec<JoinHandle<()>>> {
    let methods = Arc::new(Methods::define(runtime));
    let rounds = plan.rounds.unwrap_or(u64::MAX);

    (0..plan.threads)
        .map(|index| {
            let workload = plan.workload.for_thread(index);
            let methods = Arc::clone(&methods);
            let seed = plan.seed.wrapping_add(index as u64);
            let name = format!("{}-worker-{index}", workload.name());
            runtime.spawn(session, &name, move |ctx| {
                let checksum = match workload {
                    Workload::Sleep => run_sleeper(ctx, &methods, rounds),
                    Workload::Churn => run_churn(ctx, &methods, rounds),
                    _ => run_math(ctx, &methods, seed, rounds),
                };
                debug!("{workload:?} worker {index} finished (checksum {checksum})");
            })
        })
        .collect()
}

/// Method ids used by the workloads
#[derive(Debug)]
struct Methods {
    thread_run: MethodId,
    math_run: MethodId,
    generate: MethodId,
    next_random: MethodId,
    parse: MethodId,
    lex: MethodId,
    eval: MethodId,
    pow: MethodId,
    factorial: MethodId,
    wait_forever: MethodId,
    thread_sleep: MethodId,
    churn: MethodId,
    checksum: MethodId,
    array_copy: MethodId,
}

impl Methods {
    fn define(runtime: &SimulatedRuntime) -> Self {
        Self {
            thread_run: runtime.define_method("java.lang.Thread.run"),
            math_run: runtime.define_method("math.MathParser.run"),
            generate: runtime.define_method("math.MathGenerator.generate"),
            next_random: runtime.define_method("math.LehmerRandom.nextRange"),
            parse: runtime.define_method("math.Parser.parse"),
            lex: runtime.define_method("math.Lexer.next"),
            eval: runtime.define_method("math.ASTNode.eval"),
            pow: runtime.define_method("math.Math.pow"),
            factorial: runtime.define_method("math.Math.factorial"),
            wait_forever: runtime.define_method("BasicSample.waitForever"),
            thread_sleep: runtime.define_method("java.lang.Thread.sleep"),
            churn: runtime.define_method("demo.Churn.loop"),
            checksum: runtime.define_method("demo.Churn.checksum"),
            array_copy: runtime.define_method("java.lang.System.arraycopy"),
        }
    }
}

/// Lehmer (Park-Miller) generator using Schrage's method
#[derive(Debug, Clone)]
struct LehmerRandom {
    seed: i64,
}

impl LehmerRandom {
    const M: i64 = 2_147_483_647;
    const A: i64 = 16_807;
    const Q: i64 = 127_773;
    const R: i64 = 2_836;

    fn new(seed: u64) -> Self {
        // Seed must be in 1..M
        let seed = i64::try_from(seed % 2_147_483_646).unwrap_or(0) + 1;
        Self { seed }
    }

    fn next(&mut self) -> i64 {
        let hi = self.seed / Self::Q;
        let lo = self.seed % Self::Q;
        let mut test = Self::A * lo - Self::R * hi;
        if test <= 0 {
            test += Self::M;
        }
        self.seed = test;
        test
    }

    fn next_range(&mut self, min: i64, max: i64) -> i64 {
        self.next() % (max - min) + min
    }
}

fn run_math(ctx: &mut SimContext, m: &Methods, seed: u64, rounds: u64) -> i64 {
    let mut rng = LehmerRandom::new(seed);
    let mut checksum: i64 = 0;

    ctx.call(m.thread_run, 1, |ctx| {
        for _ in 0..rounds {
            if ctx.should_stop() {
                break;
            }
            checksum = checksum.wrapping_add(ctx.call(m.math_run, 24, |ctx| math_round(ctx, m, &mut rng)));
        }
    });
    checksum
}

fn math_round(ctx: &mut SimContext, m: &Methods, rng: &mut LehmerRandom) -> i64 {
    let tokens = ctx.call(m.generate, 20, |ctx| {
        let mut tokens = Vec::with_capacity(MATH_ROUND_SIZE);
        ctx.work(MATH_ROUND_SIZE, |_| tokens.push(rng.next_range(0, 10)));
        ctx.call(m.next_random, 74, |_| tokens.push(rng.next_range(1, 10)));
        tokens
    });

    let mut sum: i64 = 0;
    for i in 0..4 {
        let len = tokens.len() - i * (MATH_ROUND_SIZE / 10);
        sum = sum.wrapping_add(ctx.call(m.parse, 25, |ctx| parse(ctx, m, &tokens[..len])));
    }
    sum
}

fn parse(ctx: &mut SimContext, m: &Methods, tokens: &[i64]) -> i64 {
    let lexed = ctx.call(m.lex, 40, |ctx| {
        let mut lexed = Vec::with_capacity(tokens.len());
        ctx.work(tokens.len(), |i| lexed.push(tokens[i] % 10));
        lexed
    });
    ctx.call(m.eval, 60, |ctx| eval(ctx, m, &lexed))
}

fn eval(ctx: &mut SimContext, m: &Methods, values: &[i64]) -> i64 {
    let mut acc: i64 = 0;
    for pair in values.chunks_exact(2) {
        let (base, exp) = (pair[0], pair[1] % 6);
        acc = acc.wrapping_add(ctx.call(m.pow, 120, |_| pow(base, exp)));
        if base % 3 == 0 {
            acc = acc.wrapping_add(ctx.call(m.factorial, 140, |_| factorial(base)));
        }
    }
    acc
}

fn pow(mut v: i64, mut exp: i64) -> i64 {
    let mut ret: i64 = 1;
    while exp > 0 {
        if exp % 2 == 0 {
            v = v.wrapping_mul(v);
            exp /= 2;
        } else {
            ret = ret.wrapping_mul(v);
            exp -= 1;
        }
    }
    ret
}

fn factorial(mut v: i64) -> i64 {
    let mut ret: i64 = 1;
    while v > 0 {
        ret = ret.wrapping_mul(v);
        v -= 1;
    }
    ret
}

fn run_sleeper(ctx: &mut SimContext, m: &Methods, rounds: u64) -> i64 {
    let mut slept: i64 = 0;
    ctx.call(m.thread_run, 1, |ctx| {
        ctx.call(m.wait_forever, 5, |ctx| {
            for _ in 0..rounds {
                for _ in 0..SLEEPS_PER_ROUND {
                    if ctx.should_stop() {
                        return;
                    }
                    ctx.call_native(m.thread_sleep, |ctx| ctx.sleep(SLEEP_SLICE));
                    slept += 1;
                }
            }
        });
    });
    slept
}

fn run_churn(ctx: &mut SimContext, m: &Methods, rounds: u64) -> i64 {
    let mut buffer = vec![0_i64; 4096];
    let mut checksum: i64 = 0;

    ctx.call(m.thread_run, 1, |ctx| {
        ctx.call(m.churn, 12, |ctx| {
            for round in 0..rounds {
                if ctx.should_stop() {
                    break;
                }
                let shift = usize::try_from(round % 64).unwrap_or(0);
                ctx.call_native(m.array_copy, |ctx| {
                    ctx.work(buffer.len(), |i| buffer[i] = buffer[i].wrapping_add((i + shift) as i64));
                });
                // Transition the stack walker cannot follow
                ctx.unsafe_section(|ctx| ctx.work(256, |i| buffer[i] ^= 0x5a));
                checksum = checksum.wrapping_add(ctx.call(m.checksum, 30, |ctx| {
                    let mut sum: i64 = 0;
                    ctx.work(buffer.len(), |i| sum = sum.wrapping_add(buffer[i]));
                    sum
                }));
            }
        });
    });
    checksum
}
