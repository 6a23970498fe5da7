//! Tiering policy layer
//!
//! - `counter`: per-caller invocation counts
//! - `cache`: process-wide best-artifact-per-unit map with no-regression installs
//! - `policy`: trigger/deadline promotion decisions
//! - `scheduler`: bounded compile pool with coalescing and cancellable waits
//! - `runtime`: the shared state handed to every caller
//! - `dispatcher`: the per-call entry point

pub mod cache;
pub mod counter;
pub mod dispatcher;
pub mod policy;
pub mod runtime;
pub mod scheduler;

pub use cache::{Installed, TierCache};
pub use counter::InvocationCounter;
pub use dispatcher::{Dispatch, Dispatcher};
pub use policy::{decide, PromotionAction, Thresholds};
pub use runtime::TieringRuntime;
pub use scheduler::{CompilationScheduler, CompileJob, JobOutcome, UpgradeOutcome};
