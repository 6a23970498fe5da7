//! Promotion policy
//!
//! Each compiled tier has a trigger (background compilation becomes worth it)
//! and a deadline (the caller may no longer run un-upgraded and must block).
//! L2 supersedes L1, so it is considered first.

use crate::core::OptimizationLevel;
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Invocation-count thresholds for both compiled tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_l1_trigger")]
    pub l1_trigger: u64,

    #[serde(default = "default_l1_deadline")]
    pub l1_deadline: u64,

    #[serde(default = "default_l2_trigger")]
    pub l2_trigger: u64,

    #[serde(default = "default_l2_deadline")]
    pub l2_deadline: u64,
}

fn default_l1_trigger() -> u64 {
    100
}

fn default_l1_deadline() -> u64 {
    10_000
}

fn default_l2_trigger() -> u64 {
    1_000
}

fn default_l2_deadline() -> u64 {
    100_000
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            l1_trigger: default_l1_trigger(),
            l1_deadline: default_l1_deadline(),
            l2_trigger: default_l2_trigger(),
            l2_deadline: default_l2_deadline(),
        }
    }
}

impl Thresholds {
    pub fn new(l1_trigger: u64, l1_deadline: u64, l2_trigger: u64, l2_deadline: u64) -> Self {
        Self {
            l1_trigger,
            l1_deadline,
            l2_trigger,
            l2_deadline,
        }
    }

    pub fn trigger(&self, level: OptimizationLevel) -> Option<u64> {
        match level {
            OptimizationLevel::Interpreted => None,
            OptimizationLevel::L1 => Some(self.l1_trigger),
            OptimizationLevel::L2 => Some(self.l2_trigger),
        }
    }

    pub fn deadline(&self, level: OptimizationLevel) -> Option<u64> {
        match level {
            OptimizationLevel::Interpreted => None,
            OptimizationLevel::L1 => Some(self.l1_deadline),
            OptimizationLevel::L2 => Some(self.l2_deadline),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for level in OptimizationLevel::compiled_levels() {
            let (trigger, deadline) = match (self.trigger(level), self.deadline(level)) {
                (Some(t), Some(d)) => (t, d),
                _ => continue,
            };
            if trigger == 0 {
                return Err(ConfigError::Invalid(format!("{} trigger must be at least 1", level)));
            }
            if trigger > deadline {
                return Err(ConfigError::Invalid(format!(
                    "{} trigger ({}) exceeds its deadline ({})",
                    level, trigger, deadline
                )));
            }
        }
        Ok(())
    }
}

/// What the dispatcher should do before running a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromotionAction {
    /// Keep running whatever is installed.
    None,
    /// Schedule a background compile; the caller proceeds immediately.
    Async(OptimizationLevel),
    /// Compile and wait for the install before running.
    Sync(OptimizationLevel),
}

impl PromotionAction {
    pub fn target(self) -> Option<OptimizationLevel> {
        match self {
            Self::None => None,
            Self::Async(level) | Self::Sync(level) => Some(level),
        }
    }

    pub fn is_blocking(self) -> bool {
        matches!(self, Self::Sync(_))
    }
}

impl fmt::Display for PromotionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Async(level) => write!(f, "async({})", level),
            Self::Sync(level) => write!(f, "sync({})", level),
        }
    }
}

/// Decide the promotion action for a unit invoked `count` times with
/// `installed` currently cached.
pub fn decide(
    thresholds: &Thresholds,
    count: u64,
    installed: OptimizationLevel,
) -> PromotionAction {
    use crate::core::OptimizationLevel::{L1, L2};

    if count >= thresholds.l2_trigger && L2.is_better_than(installed) {
        let l2_overdue = count >= thresholds.l2_deadline;
        let l1_overdue = count >= thresholds.l1_deadline && L1.is_better_than(installed);
        return if l2_overdue || l1_overdue {
            PromotionAction::Sync(L2)
        } else {
            PromotionAction::Async(L2)
        };
    }

    if count >= thresholds.l1_trigger && L1.is_better_than(installed) {
        return if count >= thresholds.l1_deadline {
            PromotionAction::Sync(L1)
        } else {
            PromotionAction::Async(L1)
        };
    }

    PromotionAction::None
}
