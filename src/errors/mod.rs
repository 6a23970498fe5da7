//! Error types for the tiering layer
//!
//! None of these escape `Dispatcher::dispatch`; they surface through upgrade
//! reports, configuration loading and runtime construction.

use crate::core::{OptimizationLevel, UnitId};
use std::fmt;
use std::io;

/// Failure to produce an artifact for a unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The compiler declined or failed to compile the unit.
    Rejected {
        unit: UnitId,
        level: OptimizationLevel,
        reason: String,
    },
    /// The compiler panicked while compiling.
    Panicked {
        unit: UnitId,
        level: OptimizationLevel,
        message: String,
    },
    /// The job went away without reporting a result.
    Abandoned { unit: UnitId, level: OptimizationLevel },
    /// No worker pool was available to run the job.
    Unscheduled { unit: UnitId, level: OptimizationLevel },
}

impl CompileError {
    pub fn rejected(unit: UnitId, level: OptimizationLevel, reason: impl Into<String>) -> Self {
        Self::Rejected {
            unit,
            level,
            reason: reason.into(),
        }
    }

    pub fn unit(&self) -> UnitId {
        match self {
            Self::Rejected { unit, .. }
            | Self::Panicked { unit, .. }
            | Self::Abandoned { unit, .. }
            | Self::Unscheduled { unit, .. } => *unit,
        }
    }

    pub fn level(&self) -> OptimizationLevel {
        match self {
            Self::Rejected { level, .. }
            | Self::Panicked { level, .. }
            | Self::Abandoned { level, .. }
            | Self::Unscheduled { level, .. } => *level,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { unit, level, reason } => {
                write!(f, "compilation of {} at {} failed: {}", unit, level, reason)
            }
            Self::Panicked { unit, level, message } => {
                write!(f, "compiler panicked on {} at {}: {}", unit, level, message)
            }
            Self::Abandoned { unit, level } => {
                write!(f, "compile job for {} at {} was abandoned", unit, level)
            }
            Self::Unscheduled { unit, level } => {
                write!(f, "no compile workers available for {} at {}", unit, level)
            }
        }
    }
}

impl std::error::Error for CompileError {}

/// Worker pool construction failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    PoolBuild(String),
    ZeroWorkers,
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PoolBuild(msg) => write!(f, "failed to build compile worker pool: {}", msg),
            Self::ZeroWorkers => write!(f, "compile worker pool needs at least one worker"),
        }
    }
}

impl std::error::Error for SchedulerError {}

/// Configuration loading and validation failure
#[derive(Debug)]
pub enum ConfigError {
    Io { path: String, source: io::Error },
    Parse(String),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "failed to read config {}: {}", path, source),
            Self::Parse(msg) => write!(f, "failed to parse config: {}", msg),
            Self::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Crate-level error
#[derive(Debug)]
pub enum TierError {
    Compile(CompileError),
    Scheduler(SchedulerError),
    Config(ConfigError),
}

impl fmt::Display for TierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compile(e) => e.fmt(f),
            Self::Scheduler(e) => e.fmt(f),
            Self::Config(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for TierError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Compile(e) => Some(e),
            Self::Scheduler(e) => Some(e),
            Self::Config(e) => Some(e),
        }
    }
}

impl From<CompileError> for TierError {
    fn from(e: CompileError) -> Self {
        Self::Compile(e)
    }
}

impl From<SchedulerError> for TierError {
    fn from(e: SchedulerError) -> Self {
        Self::Scheduler(e)
    }
}

impl From<ConfigError> for TierError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

pub type Result<T> = std::result::Result<T, TierError>;
