//! Per-call entry point
//!
//! A `Dispatcher` belongs to one caller thread. For every call it bumps the
//! caller's own count, asks the policy what to do, maybe hands a job to the
//! compile pool, and then runs the best tier installed at that moment.

use crate::core::{OptimizationLevel, UnitId};
use crate::errors::CompileError;
use crate::external::{Compiler, Executor};
use crate::infrastructure::cancellation::CancellationToken;
use crate::infrastructure::metrics::names;
use crate::tiering::counter::InvocationCounter;
use crate::tiering::policy::{decide, PromotionAction};
use crate::tiering::runtime::TieringRuntime;
use crate::tiering::scheduler::{CompileJob, UpgradeOutcome};
use std::sync::Arc;
use tracing::{error, trace, warn};

/// Everything that happened during one dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch<T> {
    pub output: T,
    /// This caller's count for the unit, including this call.
    pub count: u64,
    pub action: PromotionAction,
    /// Tier that actually ran.
    pub tier: OptimizationLevel,
    /// Set only when the call blocked on an upgrade.
    pub upgrade: Option<UpgradeOutcome>,
}

impl<T> Dispatch<T> {
    /// True when the call had to block for an upgrade and did not get one.
    pub fn degraded(&self) -> bool {
        matches!(
            self.upgrade,
            Some(UpgradeOutcome::Failed(_)) | Some(UpgradeOutcome::Interrupted)
        )
    }
}

pub struct Dispatcher<C: Compiler, E> {
    runtime: Arc<TieringRuntime<C, E>>,
    counter: InvocationCounter,
    interrupt: CancellationToken,
    worker_bound: usize,
    pool_error_reported: bool,
}

impl<C, E> Dispatcher<C, E>
where
    C: Compiler,
    E: Executor<Artifact = C::Artifact>,
{
    pub fn new(runtime: Arc<TieringRuntime<C, E>>) -> Self {
        let workers = runtime.config().scheduler.workers;
        Self::with_worker_bound(runtime, workers)
    }

    pub fn with_worker_bound(runtime: Arc<TieringRuntime<C, E>>, workers: usize) -> Self {
        Self {
            runtime,
            counter: InvocationCounter::new(),
            interrupt: CancellationToken::new(),
            worker_bound: workers,
            pool_error_reported: false,
        }
    }

    /// Run `unit` on the best available tier. Never fails: compilation
    /// problems fall back to the installed tier or the interpreter.
    pub fn dispatch(&mut self, unit: UnitId) -> E::Output {
        self.dispatch_with_report(unit).output
    }

    pub fn dispatch_with_report(&mut self, unit: UnitId) -> Dispatch<E::Output> {
        let runtime = Arc::clone(&self.runtime);
        let metrics = runtime.metrics();
        metrics.increment(names::DISPATCH_TOTAL);

        let count = self.counter.increment(unit);
        let installed = runtime.cache().best_level(unit);
        let action = decide(&runtime.config().thresholds, count, installed);
        trace!(%unit, count, %installed, %action, "dispatch");

        let upgrade = match action {
            PromotionAction::None => None,
            PromotionAction::Async(level) => {
                metrics.increment(names::POLICY_ASYNC);
                self.request_async(&runtime, CompileJob::new(unit, level));
                None
            }
            PromotionAction::Sync(level) => {
                metrics.increment(names::POLICY_SYNC);
                Some(self.request_sync(&runtime, CompileJob::new(unit, level)))
            }
        };

        let (output, tier) = match runtime.cache().best(unit) {
            Some(best) => {
                metrics.increment(names::DISPATCH_EXECUTED);
                (runtime.executor().execute(&best.artifact), best.level)
            }
            None => {
                metrics.increment(names::DISPATCH_INTERPRETED);
                (runtime.executor().interpret(unit), OptimizationLevel::Interpreted)
            }
        };

        let dispatch = Dispatch {
            output,
            count,
            action,
            tier,
            upgrade,
        };
        if dispatch.degraded() {
            metrics.increment(names::DISPATCH_DEGRADED);
            warn!(%unit, count, %tier, "running below the required tier");
        }
        dispatch
    }

    fn request_async(&mut self, runtime: &TieringRuntime<C, E>, job: CompileJob) {
        match runtime.scheduler(self.worker_bound) {
            Ok(scheduler) => scheduler.submit_async(job),
            Err(err) => self.report_pool_error(&err),
        }
    }

    fn request_sync(&mut self, runtime: &TieringRuntime<C, E>, job: CompileJob) -> UpgradeOutcome {
        match runtime.scheduler(self.worker_bound) {
            Ok(scheduler) => scheduler.submit_sync(job, &self.interrupt),
            Err(err) => {
                self.report_pool_error(&err);
                UpgradeOutcome::Failed(CompileError::Unscheduled {
                    unit: job.unit,
                    level: job.level,
                })
            }
        }
    }

    fn report_pool_error(&mut self, err: &dyn std::error::Error) {
        self.runtime.metrics().increment(names::COMPILE_FAILED);
        if !self.pool_error_reported {
            self.pool_error_reported = true;
            error!(error = %err, "compile pool unavailable, continuing without compilation");
        }
    }

    /// This caller's invocation count for `unit`.
    pub fn count(&self, unit: UnitId) -> u64 {
        self.counter.count(unit)
    }

    pub fn counter(&self) -> &InvocationCounter {
        &self.counter
    }

    pub fn runtime(&self) -> &Arc<TieringRuntime<C, E>> {
        &self.runtime
    }

    pub fn worker_bound(&self) -> usize {
        self.worker_bound
    }

    /// Handle another thread can use to interrupt this caller's blocking waits.
    pub fn interrupt_handle(&self) -> CancellationToken {
        self.interrupt.clone()
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_cancelled()
    }

    /// Clear a recorded interruption, returning whether one was set.
    pub fn clear_interrupt(&self) -> bool {
        self.interrupt.reset()
    }
}
