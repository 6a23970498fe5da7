#![allow(dead_code)]

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tierup::{
    CompileError, Compiler, Executor, OptimizationLevel, Thresholds, TieringConfig, UnitId,
};

/// Blocks compiles until opened
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    pub fn closed() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open(&self) {
        *self.open.lock() = true;
        self.cv.notify_all();
    }

    pub fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.cv.wait(&mut open);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Artifact {
    pub unit: UnitId,
    pub level: OptimizationLevel,
}

/// Test compiler with optional gate, latency and failure, which also tracks
/// how many compiles overlap.
pub struct TestCompiler {
    gate: Option<Arc<Gate>>,
    latency: Duration,
    fail: bool,
    pub calls: AtomicU64,
    running: AtomicUsize,
    pub peak_running: AtomicUsize,
}

impl TestCompiler {
    pub fn instant() -> Self {
        Self::build(None, Duration::ZERO, false)
    }

    pub fn slow(latency: Duration) -> Self {
        Self::build(None, latency, false)
    }

    pub fn gated(gate: Arc<Gate>) -> Self {
        Self::build(Some(gate), Duration::ZERO, false)
    }

    pub fn failing() -> Self {
        Self::build(None, Duration::ZERO, true)
    }

    fn build(gate: Option<Arc<Gate>>, latency: Duration, fail: bool) -> Self {
        Self {
            gate,
            latency,
            fail,
            calls: AtomicU64::new(0),
            running: AtomicUsize::new(0),
            peak_running: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak_running.load(Ordering::SeqCst)
    }
}

impl Compiler for TestCompiler {
    type Artifact = Artifact;

    fn compile(&self, unit: UnitId, level: OptimizationLevel) -> Result<Artifact, CompileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_running.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.wait();
        }
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }

        self.running.fetch_sub(1, Ordering::SeqCst);
        if self.fail {
            Err(CompileError::rejected(unit, level, "always fails"))
        } else {
            Ok(Artifact { unit, level })
        }
    }
}

/// Reports which tier ran
#[derive(Default)]
pub struct TestExecutor;

impl Executor for TestExecutor {
    type Artifact = Artifact;
    type Output = OptimizationLevel;

    fn execute(&self, artifact: &Artifact) -> OptimizationLevel {
        artifact.level
    }

    fn interpret(&self, _unit: UnitId) -> OptimizationLevel {
        OptimizationLevel::Interpreted
    }
}

pub fn config(thresholds: Thresholds, workers: usize) -> TieringConfig {
    let mut config = TieringConfig::default();
    config.thresholds = thresholds;
    config.scheduler.workers = workers;
    config
}

/// Poll `cond` for up to five seconds.
pub fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..1_000 {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}
