// Ambient infrastructure: configuration, logging, metrics, cancellation
pub mod cancellation;
pub mod config;
pub mod logging;
pub mod metrics;

pub use cancellation::{CancellationToken, Waited};
pub use config::{LoggingConfig, SchedulerConfig, TieringConfig};
pub use logging::{init_logging, LogConfig, LogFormat, LogOutput, LOG_ENV};
pub use metrics::{MetricsSummary, TieringMetrics, TimingStats, Timer};
