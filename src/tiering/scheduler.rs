//! Background compilation
//!
//! A fixed-size worker pool runs compile jobs. Submissions beyond the pool's
//! capacity queue inside the pool. Jobs for the same `(unit, level)` are
//! coalesced while one is queued or running: later submitters attach to the
//! existing job instead of enqueuing another compile.

use crate::core::{OptimizationLevel, UnitId};
use crate::errors::{CompileError, SchedulerError};
use crate::external::Compiler;
use crate::infrastructure::cancellation::{CancellationToken, Waited};
use crate::infrastructure::metrics::{names, TieringMetrics, Timer};
use crate::tiering::cache::TierCache;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use flume::{bounded, Sender};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// A request to compile `unit` at `level`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompileJob {
    pub unit: UnitId,
    pub level: OptimizationLevel,
}

impl CompileJob {
    pub fn new(unit: UnitId, level: OptimizationLevel) -> Self {
        Self { unit, level }
    }
}

impl fmt::Display for CompileJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.unit, self.level)
    }
}

/// What a finished job did to the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// This job's artifact was installed.
    Installed(OptimizationLevel),
    /// An equal or better tier was already cached; carries that tier.
    Superseded(OptimizationLevel),
    Failed(CompileError),
}

/// Result of waiting for a synchronous upgrade
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeOutcome {
    /// The unit is now cached at this level (at least the requested one).
    Installed(OptimizationLevel),
    Failed(CompileError),
    /// The caller was interrupted while waiting. The job keeps running.
    Interrupted,
}

impl UpgradeOutcome {
    pub fn is_installed(&self) -> bool {
        matches!(self, Self::Installed(_))
    }
}

impl From<JobOutcome> for UpgradeOutcome {
    fn from(outcome: JobOutcome) -> Self {
        match outcome {
            JobOutcome::Installed(level) | JobOutcome::Superseded(level) => Self::Installed(level),
            JobOutcome::Failed(err) => Self::Failed(err),
        }
    }
}

struct WorkerState<C: Compiler> {
    compiler: Arc<C>,
    cache: Arc<TierCache<C::Artifact>>,
    metrics: Arc<TieringMetrics>,
    in_flight: DashMap<CompileJob, Vec<Sender<JobOutcome>>>,
    active: AtomicUsize,
    peak_active: AtomicUsize,
}

impl<C: Compiler> WorkerState<C> {
    fn run(&self, job: CompileJob) {
        let outcome = self.execute(job);

        let waiters = self
            .in_flight
            .remove(&job)
            .map(|(_, waiters)| waiters)
            .unwrap_or_default();
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }

    fn execute(&self, job: CompileJob) -> JobOutcome {
        let current = self.cache.best_level(job.unit);
        if !job.level.is_better_than(current) {
            self.metrics.increment(names::JOB_SKIPPED);
            debug!(%job, %current, "compile skipped, tier already present");
            return JobOutcome::Superseded(current);
        }

        let compiled = {
            let _active = ActiveJob::enter(&self.active, &self.peak_active);
            let _timer = Timer::new(&self.metrics, names::COMPILE_TIME);
            panic::catch_unwind(AssertUnwindSafe(|| self.compiler.compile(job.unit, job.level)))
        };

        let artifact = match compiled {
            Ok(Ok(artifact)) => artifact,
            Ok(Err(err)) => {
                self.metrics.increment(names::COMPILE_FAILED);
                warn!(%job, error = %err, "compilation failed");
                return JobOutcome::Failed(err);
            }
            Err(payload) => {
                let err = CompileError::Panicked {
                    unit: job.unit,
                    level: job.level,
                    message: panic_message(payload.as_ref()),
                };
                self.metrics.increment(names::COMPILE_FAILED);
                warn!(%job, error = %err, "compiler panicked");
                return JobOutcome::Failed(err);
            }
        };
        self.metrics.increment(names::COMPILE_OK);

        if self.cache.install_if_better(job.unit, artifact, job.level) {
            self.metrics.increment(names::INSTALL_ACCEPTED);
            JobOutcome::Installed(job.level)
        } else {
            self.metrics.increment(names::INSTALL_REJECTED);
            JobOutcome::Superseded(self.cache.best_level(job.unit))
        }
    }
}

/// Tracks how many compiles run right now
struct ActiveJob<'a> {
    active: &'a AtomicUsize,
}

impl<'a> ActiveJob<'a> {
    fn enter(active: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self { active }
    }
}

impl<'a> Drop for ActiveJob<'a> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub struct CompilationScheduler<C: Compiler> {
    pool: rayon::ThreadPool,
    workers: usize,
    state: Arc<WorkerState<C>>,
}

impl<C: Compiler> CompilationScheduler<C> {
    pub fn new(
        workers: usize,
        thread_prefix: &str,
        compiler: Arc<C>,
        cache: Arc<TierCache<C::Artifact>>,
        metrics: Arc<TieringMetrics>,
    ) -> Result<Self, SchedulerError> {
        if workers == 0 {
            return Err(SchedulerError::ZeroWorkers);
        }

        let prefix = thread_prefix.to_string();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(move |index| format!("{}-{}", prefix, index))
            .panic_handler(|payload| {
                error!(message = %panic_message(payload.as_ref()), "compile worker panicked");
            })
            .build()
            .map_err(|e| SchedulerError::PoolBuild(e.to_string()))?;

        debug!(workers, "compile worker pool started");

        Ok(Self {
            pool,
            workers,
            state: Arc::new(WorkerState {
                compiler,
                cache,
                metrics,
                in_flight: DashMap::new(),
                active: AtomicUsize::new(0),
                peak_active: AtomicUsize::new(0),
            }),
        })
    }

    /// Queue a job and return immediately.
    pub fn submit_async(&self, job: CompileJob) {
        self.enqueue(job, None);
    }

    /// Queue a job and wait for its outcome, or for `token` to be cancelled.
    pub fn submit_sync(&self, job: CompileJob, token: &CancellationToken) -> UpgradeOutcome {
        let (tx, rx) = bounded(1);
        self.enqueue(job, Some(tx));

        let waited = {
            let _timer = Timer::new(&self.state.metrics, names::WAIT_TIME);
            token.wait_on(&rx)
        };

        match waited {
            Waited::Ready(outcome) => outcome.into(),
            Waited::Disconnected => UpgradeOutcome::Failed(CompileError::Abandoned {
                unit: job.unit,
                level: job.level,
            }),
            Waited::Cancelled => {
                self.state.metrics.increment(names::WAIT_INTERRUPTED);
                warn!(%job, "interrupted while waiting for compilation");
                UpgradeOutcome::Interrupted
            }
        }
    }

    fn enqueue(&self, job: CompileJob, waiter: Option<Sender<JobOutcome>>) {
        match self.state.in_flight.entry(job) {
            Entry::Occupied(mut pending) => {
                if let Some(waiter) = waiter {
                    pending.get_mut().push(waiter);
                }
                self.state.metrics.increment(names::JOB_COALESCED);
                return;
            }
            Entry::Vacant(slot) => {
                slot.insert(waiter.into_iter().collect());
            }
        }

        self.state.metrics.increment(names::JOB_SUBMITTED);
        debug!(%job, "compile job queued");

        let state = Arc::clone(&self.state);
        self.pool.spawn(move || state.run(job));
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Jobs queued or running.
    pub fn in_flight(&self) -> usize {
        self.state.in_flight.len()
    }

    /// Compiles running right now.
    pub fn active_jobs(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    /// Highest number of compiles ever running at once.
    pub fn peak_active_jobs(&self) -> usize {
        self.state.peak_active.load(Ordering::SeqCst)
    }
}

impl<C: Compiler> fmt::Debug for CompilationScheduler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilationScheduler")
            .field("workers", &self.workers)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use std::thread;
    use std::time::{Duration, Instant};

    struct SlowCompiler {
        delay: Duration,
        calls: AtomicU64,
        fail: bool,
    }

    impl SlowCompiler {
        fn new(delay_ms: u64, fail: bool) -> Self {
            Self {
                delay: Duration::from_millis(delay_ms),
                calls: AtomicU64::new(0),
                fail,
            }
        }
    }

    impl Compiler for SlowCompiler {
        type Artifact = (UnitId, OptimizationLevel);

        fn compile(
            &self,
            unit: UnitId,
            level: OptimizationLevel,
        ) -> Result<Self::Artifact, CompileError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            if self.fail {
                Err(CompileError::rejected(unit, level, "unsupported"))
            } else {
                Ok((unit, level))
            }
        }
    }

    struct PanickingCompiler;

    impl Compiler for PanickingCompiler {
        type Artifact = ();

        fn compile(&self, _unit: UnitId, _level: OptimizationLevel) -> Result<(), CompileError> {
            panic!("backend exploded");
        }
    }

    fn scheduler<C: Compiler>(
        compiler: C,
        workers: usize,
    ) -> (CompilationScheduler<C>, Arc<TierCache<C::Artifact>>) {
        let cache = Arc::new(TierCache::new());
        let scheduler = CompilationScheduler::new(
            workers,
            "test-compiler",
            Arc::new(compiler),
            Arc::clone(&cache),
            Arc::new(TieringMetrics::new()),
        )
        .unwrap();
        (scheduler, cache)
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result = CompilationScheduler::new(
            0,
            "x",
            Arc::new(SlowCompiler::new(0, false)),
            Arc::new(TierCache::new()),
            Arc::new(TieringMetrics::new()),
        );
        assert!(matches!(result, Err(SchedulerError::ZeroWorkers)));
    }

    #[test]
    fn test_sync_installs_before_returning() {
        let (scheduler, cache) = scheduler(SlowCompiler::new(5, false), 2);
        let unit = UnitId::new(1);

        let job = CompileJob::new(unit, OptimizationLevel::L1);
        let outcome = scheduler.submit_sync(job, &CancellationToken::new());

        assert_eq!(outcome, UpgradeOutcome::Installed(OptimizationLevel::L1));
        assert_eq!(cache.best_level(unit), OptimizationLevel::L1);
    }

    #[test]
    fn test_sync_reports_failure_and_leaves_cache() {
        let (scheduler, cache) = scheduler(SlowCompiler::new(0, true), 1);
        let unit = UnitId::new(2);

        let job = CompileJob::new(unit, OptimizationLevel::L2);
        let outcome = scheduler.submit_sync(job, &CancellationToken::new());

        assert!(matches!(outcome, UpgradeOutcome::Failed(CompileError::Rejected { .. })));
        assert_eq!(cache.best_level(unit), OptimizationLevel::Interpreted);
    }

    #[test]
    fn test_panicking_compiler_is_a_failure() {
        let (scheduler, cache) = scheduler(PanickingCompiler, 1);
        let unit = UnitId::new(3);

        let job = CompileJob::new(unit, OptimizationLevel::L1);
        let outcome = scheduler.submit_sync(job, &CancellationToken::new());

        match outcome {
            UpgradeOutcome::Failed(CompileError::Panicked { message, .. }) => {
                assert!(message.contains("backend exploded"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn test_stale_job_is_skipped() {
        let (scheduler, cache) = scheduler(SlowCompiler::new(0, false), 1);
        let unit = UnitId::new(4);
        cache.install_if_better(unit, (unit, OptimizationLevel::L2), OptimizationLevel::L2);

        let job = CompileJob::new(unit, OptimizationLevel::L1);
        let outcome = scheduler.submit_sync(job, &CancellationToken::new());

        assert_eq!(outcome, UpgradeOutcome::Installed(OptimizationLevel::L2));
        assert_eq!(scheduler.state.compiler.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_duplicate_submissions_coalesce() {
        let (scheduler, cache) = scheduler(SlowCompiler::new(50, false), 1);
        let unit = UnitId::new(5);
        let job = CompileJob::new(unit, OptimizationLevel::L1);

        for _ in 0..10 {
            scheduler.submit_async(job);
        }
        let outcome = scheduler.submit_sync(job, &CancellationToken::new());

        assert_eq!(outcome, UpgradeOutcome::Installed(OptimizationLevel::L1));
        assert_eq!(cache.best_level(unit), OptimizationLevel::L1);
        assert_eq!(scheduler.state.compiler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.state.metrics.get_counter(names::JOB_COALESCED), 10);
    }

    #[test]
    fn test_interrupted_wait_returns_promptly() {
        let (scheduler, cache) = scheduler(SlowCompiler::new(300, false), 1);
        let unit = UnitId::new(6);
        let token = CancellationToken::new();
        let remote = token.clone();

        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });

        let started = Instant::now();
        let outcome = scheduler.submit_sync(CompileJob::new(unit, OptimizationLevel::L1), &token);
        canceller.join().unwrap();

        assert_eq!(outcome, UpgradeOutcome::Interrupted);
        assert!(started.elapsed() < Duration::from_millis(300));
        assert!(token.is_cancelled());
        // Nothing was installed on the interrupted caller's behalf.
        assert_eq!(cache.best_level(unit), OptimizationLevel::Interpreted);
    }

    #[test]
    fn test_pool_bound_respected() {
        let (scheduler, cache) = scheduler(SlowCompiler::new(10, false), 3);

        for raw in 0..24 {
            scheduler.submit_async(CompileJob::new(UnitId::new(raw), OptimizationLevel::L1));
        }

        let deadline = Instant::now() + Duration::from_secs(10);
        while cache.len() < 24 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(cache.len(), 24);
        assert!(scheduler.peak_active_jobs() <= 3);
        assert!(scheduler.peak_active_jobs() >= 1);
    }
}
