//! Shared tiering state
//!
//! One `TieringRuntime` exists per process (or per test). It owns the tier
//! cache, the external capabilities and the lazily started compile pool, and
//! is handed to every `Dispatcher` by `Arc`.

use crate::errors::{ConfigError, SchedulerError};
use crate::external::{Compiler, Executor};
use crate::infrastructure::config::TieringConfig;
use crate::infrastructure::metrics::TieringMetrics;
use crate::tiering::cache::TierCache;
use crate::tiering::dispatcher::Dispatcher;
use crate::tiering::scheduler::CompilationScheduler;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

pub struct TieringRuntime<C: Compiler, E> {
    config: TieringConfig,
    cache: Arc<TierCache<C::Artifact>>,
    compiler: Arc<C>,
    executor: E,
    metrics: Arc<TieringMetrics>,
    scheduler: OnceCell<CompilationScheduler<C>>,
}

impl<C, E> TieringRuntime<C, E>
where
    C: Compiler,
    E: Executor<Artifact = C::Artifact>,
{
    pub fn new(compiler: C, executor: E) -> Self {
        Self::build(TieringConfig::default(), compiler, executor)
    }

    pub fn with_config(
        config: TieringConfig,
        compiler: C,
        executor: E,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config, compiler, executor))
    }

    fn build(config: TieringConfig, compiler: C, executor: E) -> Self {
        Self {
            config,
            cache: Arc::new(TierCache::new()),
            compiler: Arc::new(compiler),
            executor,
            metrics: Arc::new(TieringMetrics::new()),
            scheduler: OnceCell::new(),
        }
    }

    /// A new caller with its own invocation counts, using the configured
    /// worker bound.
    pub fn dispatcher(self: &Arc<Self>) -> Dispatcher<C, E> {
        Dispatcher::new(Arc::clone(self))
    }

    /// A new caller requesting `workers` compile threads. Only the first
    /// caller to start the pool decides its size.
    pub fn dispatcher_with_workers(self: &Arc<Self>, workers: usize) -> Dispatcher<C, E> {
        Dispatcher::with_worker_bound(Arc::clone(self), workers)
    }

    /// The compile pool, started on first use.
    pub fn scheduler(
        &self,
        requested_workers: usize,
    ) -> Result<&CompilationScheduler<C>, SchedulerError> {
        let scheduler = self.scheduler.get_or_try_init(|| {
            info!(workers = requested_workers, "starting compile worker pool");
            CompilationScheduler::new(
                requested_workers,
                &self.config.scheduler.thread_prefix,
                Arc::clone(&self.compiler),
                Arc::clone(&self.cache),
                Arc::clone(&self.metrics),
            )
        })?;

        if scheduler.workers() != requested_workers {
            debug!(
                requested = requested_workers,
                actual = scheduler.workers(),
                "worker bound already fixed by an earlier caller"
            );
        }
        Ok(scheduler)
    }
}

impl<C: Compiler, E> TieringRuntime<C, E> {
    pub fn config(&self) -> &TieringConfig {
        &self.config
    }

    pub fn cache(&self) -> &TierCache<C::Artifact> {
        &self.cache
    }

    pub fn metrics(&self) -> &TieringMetrics {
        &self.metrics
    }

    pub fn compiler(&self) -> &C {
        &self.compiler
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// The compile pool if some caller has already started it.
    pub fn started_scheduler(&self) -> Option<&CompilationScheduler<C>> {
        self.scheduler.get()
    }
}

impl<C: Compiler, E> fmt::Debug for TieringRuntime<C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TieringRuntime")
            .field("thresholds", &self.config.thresholds)
            .field("cache", &self.cache)
            .field("scheduler", &self.scheduler.get())
            .finish()
    }
}
