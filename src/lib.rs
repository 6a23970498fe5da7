//! tierup - adaptive tiered-compilation manager
//!
//! Decides, call by call, whether a unit keeps running in the interpreter,
//! gets a background upgrade, or blocks its caller until a better tier is
//! installed. Interpretation and compilation themselves are supplied by the
//! embedder through the `Compiler` and `Executor` traits.

pub mod core;
pub mod errors;
pub mod external;
pub mod frontend;
pub mod infrastructure;
pub mod tiering;

pub use crate::core::{OptimizationLevel, UnitId};
pub use errors::{CompileError, ConfigError, Result, SchedulerError, TierError};
pub use external::{Compiler, Executor};
pub use infrastructure::{
    init_logging, CancellationToken, LogConfig, LogFormat, LogOutput, TieringConfig,
    TieringMetrics,
};
pub use tiering::{
    decide, Dispatch, Dispatcher, PromotionAction, Thresholds, TierCache, TieringRuntime,
    UpgradeOutcome,
};
