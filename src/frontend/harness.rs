//! Synthetic workload driver
//!
//! Stands in for a real interpreter and compiler so the policy can be watched
//! under load: compiles sleep for a configurable latency and selected units
//! always fail, callers hammer a skewed mix of units from their own threads.

use crate::core::{OptimizationLevel, UnitId};
use crate::errors::{self, CompileError};
use crate::external::{Compiler, Executor};
use crate::infrastructure::config::TieringConfig;
use crate::infrastructure::metrics::MetricsSummary;
use crate::tiering::runtime::TieringRuntime;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticArtifact {
    pub unit: UnitId,
    pub level: OptimizationLevel,
}

/// What one call ran on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionResult {
    pub unit: UnitId,
    pub level: OptimizationLevel,
}

pub struct SyntheticCompiler {
    latency: Duration,
    /// Fraction of units that never compile.
    fail_rate: f64,
    seed: u64,
    compiles: AtomicU64,
}

impl SyntheticCompiler {
    pub fn new(latency: Duration, fail_rate: f64, seed: u64) -> Self {
        Self {
            latency,
            fail_rate: fail_rate.clamp(0.0, 1.0),
            seed,
            compiles: AtomicU64::new(0),
        }
    }

    /// Whether `unit` is one of the units that never compile. Fixed per
    /// `(seed, unit)` so every attempt for a unit agrees.
    pub fn fails(&self, unit: UnitId) -> bool {
        let mut rng = SmallRng::seed_from_u64(self.seed ^ unit.raw());
        rng.gen::<f64>() < self.fail_rate
    }

    pub fn compiles(&self) -> u64 {
        self.compiles.load(Ordering::Relaxed)
    }
}

impl Compiler for SyntheticCompiler {
    type Artifact = SyntheticArtifact;

    fn compile(
        &self,
        unit: UnitId,
        level: OptimizationLevel,
    ) -> Result<SyntheticArtifact, CompileError> {
        self.compiles.fetch_add(1, Ordering::Relaxed);
        // L2 is the expensive tier.
        let latency = match level {
            OptimizationLevel::L2 => self.latency * 4,
            _ => self.latency,
        };
        thread::sleep(latency);

        if self.fails(unit) {
            return Err(CompileError::rejected(unit, level, "synthetic failure"));
        }
        Ok(SyntheticArtifact { unit, level })
    }
}

#[derive(Debug, Default)]
pub struct SyntheticExecutor;

impl Executor for SyntheticExecutor {
    type Artifact = SyntheticArtifact;
    type Output = ExecutionResult;

    fn execute(&self, artifact: &SyntheticArtifact) -> ExecutionResult {
        ExecutionResult {
            unit: artifact.unit,
            level: artifact.level,
        }
    }

    fn interpret(&self, unit: UnitId) -> ExecutionResult {
        ExecutionResult {
            unit,
            level: OptimizationLevel::Interpreted,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Simulation {
    pub callers: usize,
    pub calls_per_caller: u64,
    pub units: u64,
    pub compile_latency: Duration,
    pub fail_rate: f64,
    pub seed: u64,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            callers: 4,
            calls_per_caller: 50_000,
            units: 64,
            compile_latency: Duration::from_micros(500),
            fail_rate: 0.0,
            seed: 0x5eed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub elapsed: Duration,
    pub calls: u64,
    pub interpreted: u64,
    pub compiled: u64,
    pub degraded: u64,
    pub compiles: u64,
    pub workers: usize,
    pub peak_active: usize,
    pub levels: Vec<(UnitId, OptimizationLevel)>,
    pub metrics: MetricsSummary,
}

#[derive(Default)]
struct CallerTally {
    interpreted: u64,
    compiled: u64,
    degraded: u64,
}

pub fn run(config: TieringConfig, sim: &Simulation) -> errors::Result<SimulationReport> {
    let compiler = SyntheticCompiler::new(sim.compile_latency, sim.fail_rate, sim.seed);
    let runtime = Arc::new(TieringRuntime::with_config(
        config,
        compiler,
        SyntheticExecutor,
    )?);

    info!(
        callers = sim.callers,
        calls = sim.calls_per_caller,
        units = sim.units,
        "simulation starting"
    );
    let started = Instant::now();

    let tallies: Vec<CallerTally> = thread::scope(|scope| {
        let handles: Vec<_> = (0..sim.callers)
            .map(|caller| {
                let runtime = Arc::clone(&runtime);
                scope.spawn(move || {
                    let _span = info_span!("caller", caller).entered();
                    let mut dispatcher = runtime.dispatcher();
                    let mut rng = caller_rng(sim.seed, caller);
                    let mut tally = CallerTally::default();

                    for _ in 0..sim.calls_per_caller {
                        let unit = UnitId::new(skewed(&mut rng, sim.units.max(1)));
                        let report = dispatcher.dispatch_with_report(unit);
                        if report.output.level.is_compiled() {
                            tally.compiled += 1;
                        } else {
                            tally.interpreted += 1;
                        }
                        if report.degraded() {
                            tally.degraded += 1;
                        }
                    }
                    debug!(caller, tracked = dispatcher.counter().tracked(), "caller finished");
                    tally
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_default())
            .collect()
    });

    let elapsed = started.elapsed();
    let (workers, peak_active) = runtime
        .started_scheduler()
        .map(|s| (s.workers(), s.peak_active_jobs()))
        .unwrap_or((0, 0));

    let report = SimulationReport {
        elapsed,
        calls: sim.calls_per_caller * sim.callers as u64,
        interpreted: tallies.iter().map(|t| t.interpreted).sum(),
        compiled: tallies.iter().map(|t| t.compiled).sum(),
        degraded: tallies.iter().map(|t| t.degraded).sum(),
        compiles: runtime.compiler().compiles(),
        workers,
        peak_active,
        levels: runtime.cache().levels(),
        metrics: runtime.metrics().summary(),
    };
    info!(
        elapsed_ms = elapsed.as_millis() as u64,
        compiles = report.compiles,
        "simulation finished"
    );
    Ok(report)
}

fn caller_rng(seed: u64, caller: usize) -> SmallRng {
    SmallRng::seed_from_u64(seed.wrapping_add(caller as u64))
}

/// Index in `0..n`, low indices far more likely than high ones.
fn skewed(rng: &mut impl Rng, n: u64) -> u64 {
    let r = rng.gen::<f64>();
    ((r * r * r * n as f64) as u64).min(n - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiering::policy::Thresholds;

    #[test]
    fn test_failure_selection_is_deterministic() {
        let never = SyntheticCompiler::new(Duration::ZERO, 0.0, 3);
        let always = SyntheticCompiler::new(Duration::ZERO, 1.0, 3);
        let half = SyntheticCompiler::new(Duration::ZERO, 0.5, 3);
        let again = SyntheticCompiler::new(Duration::ZERO, 0.5, 3);

        let mut failing = 0;
        for raw in 0..1_000 {
            let unit = UnitId::new(raw);
            assert!(!never.fails(unit));
            assert!(always.fails(unit));
            assert_eq!(half.fails(unit), again.fails(unit));
            if half.fails(unit) {
                failing += 1;
            }
        }
        assert!((300..700).contains(&failing));
    }

    #[test]
    fn test_callers_replay_the_same_workload() {
        let mut first = caller_rng(9, 2);
        let mut second = caller_rng(9, 2);
        let a: Vec<u64> = (0..64).map(|_| skewed(&mut first, 32)).collect();
        let b: Vec<u64> = (0..64).map(|_| skewed(&mut second, 32)).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_skewed_stays_in_range() {
        let mut rng = SmallRng::seed_from_u64(7);
        let mut low = 0;
        for _ in 0..10_000 {
            let v = skewed(&mut rng, 10);
            assert!(v < 10);
            if v < 3 {
                low += 1;
            }
        }
        assert!(low > 5_000);
    }

    #[test]
    fn test_small_simulation() {
        let mut config = TieringConfig::default();
        config.thresholds = Thresholds::new(5, 50, 20, 200);
        config.scheduler.workers = 2;

        let sim = Simulation {
            callers: 3,
            calls_per_caller: 2_000,
            units: 8,
            compile_latency: Duration::from_micros(100),
            fail_rate: 0.0,
            seed: 1,
        };

        let report = run(config, &sim).unwrap();
        assert_eq!(report.calls, 6_000);
        assert_eq!(report.interpreted + report.compiled, report.calls);
        assert_eq!(report.degraded, 0);
        assert_eq!(report.workers, 2);
        assert!(report.peak_active <= 2);
        assert!(report.levels.iter().any(|(_, level)| *level == OptimizationLevel::L2));
    }
}
